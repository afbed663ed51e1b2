//! C4 — Validation.
//!
//! Pure, composable predicates over a prospective deployment (spec
//! section 4.1). Each predicate is a [`Validator`]; the deploy
//! orchestrator (C8) collects every error before deciding, rather than
//! short-circuiting on the first failure.

mod predicates;

use std::collections::HashMap;

use async_trait::async_trait;

use crate::audit::AuditInfo;
use crate::entity::{Entity, EntityType};

pub use predicates::{
    default_validators, Access, Content, IpfsHashing, LegacyEntity, Recent, RequestSizeV3,
    Signature,
};

/// The environment a deployment is validated against (spec section 4.1,
/// `ValidationArgs.env`).
#[derive(Clone, Debug)]
pub struct ValidationEnv {
    pub now_ms: i64,
    pub ttl_backwards_ms: i64,
    pub ttl_forward_ms: i64,
    pub max_upload_size_per_type_mb: HashMap<EntityType, u64>,
    pub allow_legacy_entities: bool,
    /// `true` when this deployment is being replayed by the Synchronizer
    /// (spec section 4.7 step 5, `checkFreshness=false`). The `CONTENT`
    /// predicate relaxes its presence check on this path: scenario S6
    /// requires a synced deployment's pointer state to update even when
    /// its content could not be fetched — that failure is recorded by the
    /// Synchronizer as `FETCH_PROBLEM`, not rejected here.
    pub is_sync_path: bool,
}

/// The prospective deployment under validation. Borrowed views only —
/// the orchestrator owns the actual entity/audit/upload data.
pub struct Deployment<'a> {
    pub entity: &'a Entity,
    pub audit: &'a AuditInfo,
    /// Content hash of the `entity.json` file itself — exempt from the
    /// orphan-upload half of `CONTENT` (spec section 4.1).
    pub entity_file_hash: &'a str,
    /// Every hash uploaded alongside this deployment, mapped to its byte
    /// size (needed by `REQUEST_SIZE_V3`).
    pub uploaded_hashes: &'a HashMap<String, u64>,
    /// The address the auth chain's root link claims, regardless of
    /// whether the chain verifies (see `crate::auth::claimed_root_address`).
    pub eth_address: &'a str,
}

/// Named async collaborators a validator may need (spec section 9:
/// "model as an explicit capabilities record with enumerated named
/// methods" rather than a dynamic `externalCalls` bag).
#[async_trait]
pub trait ExternalCalls: Send + Sync {
    async fn is_content_stored_already(&self, hash: &str) -> bool;

    /// Other deployed entities whose pointer set overlaps `pointers`,
    /// used by `LEGACY_ENTITY`.
    async fn fetch_overlapping_deployments(
        &self,
        entity_type: &EntityType,
        pointers: &[String],
    ) -> Vec<(Entity, AuditInfo)>;

    async fn check_access(&self, entity_type: &EntityType, pointer: &str, eth_address: &str)
        -> Vec<String>;
}

#[async_trait]
pub trait Validator: Send + Sync {
    fn name(&self) -> &'static str;
    async fn validate(
        &self,
        deployment: &Deployment<'_>,
        env: &ValidationEnv,
        calls: &dyn ExternalCalls,
    ) -> Vec<String>;
}

/// Runs every validator, collecting all errors (spec section 4.1: "the
/// deploy orchestrator collects all errors before deciding").
pub async fn validate_all(
    validators: &[Box<dyn Validator>],
    deployment: &Deployment<'_>,
    env: &ValidationEnv,
    calls: &dyn ExternalCalls,
) -> Vec<String> {
    let mut errors = Vec::new();
    for validator in validators {
        errors.extend(validator.validate(deployment, env, calls).await);
    }
    errors
}
