//! Fire-and-forget deployment analytics (spec section 4.5 step 12; out
//! of scope per section 1 beyond this narrow sink interface).

use async_trait::async_trait;
use tracing::debug;

use crate::entity::EntityType;

#[async_trait]
pub trait Analytics: Send + Sync {
    async fn record_deployment(&self, entity_id: &str, entity_type: &EntityType, server_name: Option<&str>);
}

/// Logs the event and discards it. Production deployments of this
/// service would forward to a real aggregation pipeline; that pipeline
/// is out of scope here.
pub struct LoggingAnalytics;

#[async_trait]
impl Analytics for LoggingAnalytics {
    async fn record_deployment(&self, entity_id: &str, entity_type: &EntityType, server_name: Option<&str>) {
        debug!(entity_id, %entity_type, server_name, "deployment recorded");
    }
}
