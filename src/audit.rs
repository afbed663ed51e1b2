//! `AuditInfo` — per-deployment provenance record (spec section 3).
//! Stored in `Storage` under category `PROOFS`, keyed by entity id.

use serde::{Deserialize, Serialize};

use crate::auth::AuthLink;

/// Declares the legacy original protocol version an entity was migrated
/// from, for the `LEGACY_ENTITY` validator.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MigrationData {
    pub original_version: u32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AuditInfo {
    /// Server-assigned for local deploys, preserved verbatim for synced ones.
    pub deployed_timestamp: i64,
    pub auth_chain: Vec<AuthLink>,
    pub version: u32,
    #[serde(default)]
    pub migration_data: Option<MigrationData>,
}

impl AuditInfo {
    pub fn is_legacy(&self) -> bool {
        self.migration_data.is_some()
    }
}
