//! C7 — Failed-Deployment Registry.
//!
//! Records deployments that could not be applied and supports retry
//! (spec section 4.4). Retry is not automatic on a timer; an entry is
//! cleared only when the same `entityId` is later deployed successfully,
//! which in the Synchronizer's case happens on a subsequent sync tick.

use std::collections::HashMap;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::history::HistoryEvent;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureReason {
    /// The source server could not return the entity descriptor or audit info.
    NoEntityOrAudit,
    /// Content blobs referenced by the entity could not be fetched.
    FetchProblem,
    /// Local validation or storage failed while applying the deployment.
    DeploymentError,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FailedDeployment {
    pub event: HistoryEvent,
    pub reason: FailureReason,
    pub moment: i64,
}

#[derive(Default)]
pub struct FailedDeploymentRegistry {
    entries: RwLock<HashMap<String, FailedDeployment>>,
}

impl FailedDeploymentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, event: HistoryEvent, reason: FailureReason, moment: i64) {
        let entity_id = event.entity_id.clone();
        self.entries
            .write()
            .insert(entity_id, FailedDeployment { event, reason, moment });
    }

    pub fn clear(&self, entity_id: &str) {
        self.entries.write().remove(entity_id);
    }

    pub fn get_status(&self, entity_id: &str) -> Option<FailedDeployment> {
        self.entries.read().get(entity_id).cloned()
    }

    pub fn list(&self) -> Vec<FailedDeployment> {
        self.entries.read().values().cloned().collect()
    }
}
