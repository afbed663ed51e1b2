//! The seven predicates enumerated in spec section 4.1, ordered cheapest
//! and most-local first so `validate_all` fails fast on the common cases
//! before dispatching to external collaborators.

use async_trait::async_trait;

use super::{Deployment, ExternalCalls, Validator};
use crate::auth::verify_auth_chain;
use crate::hash;
use crate::validation::ValidationEnv;

pub fn default_validators() -> Vec<Box<dyn Validator>> {
    vec![
        Box::new(Recent),
        Box::new(IpfsHashing),
        Box::new(Content),
        Box::new(RequestSizeV3),
        Box::new(Signature),
        Box::new(Access),
        Box::new(LegacyEntity),
    ]
}

/// Rejects entities whose `timestamp` is too far from `now` in either
/// direction (defaults: 10 min back, 5 min forward).
pub struct Recent;

#[async_trait]
impl Validator for Recent {
    fn name(&self) -> &'static str {
        "RECENT"
    }

    async fn validate(&self, dep: &Deployment<'_>, env: &ValidationEnv, _: &dyn ExternalCalls) -> Vec<String> {
        let delta = env.now_ms - dep.entity.timestamp;
        if delta > env.ttl_backwards_ms || -delta > env.ttl_forward_ms {
            vec![format!(
                "The request is not recent enough, timestamp {} is out of bounds (now={})",
                dep.entity.timestamp, env.now_ms
            )]
        } else {
            Vec::new()
        }
    }
}

/// `entity.id` and every content hash must be a valid CIDv1 string.
pub struct IpfsHashing;

#[async_trait]
impl Validator for IpfsHashing {
    fn name(&self) -> &'static str {
        "IPFS_HASHING"
    }

    async fn validate(&self, dep: &Deployment<'_>, _: &ValidationEnv, _: &dyn ExternalCalls) -> Vec<String> {
        let mut errors = Vec::new();
        if !hash::is_valid_cidv1(&dep.entity.id) {
            errors.push(format!("Entity id {} is not a valid CIDv1", dep.entity.id));
        }
        for content_hash in dep.entity.content.values() {
            if !hash::is_valid_cidv1(content_hash) {
                errors.push(format!("Content hash {content_hash} is not a valid CIDv1"));
            }
        }
        errors
    }
}

/// Every referenced hash must be uploaded or already stored; every
/// uploaded hash (other than the entity file itself) must be referenced.
pub struct Content;

#[async_trait]
impl Validator for Content {
    fn name(&self) -> &'static str {
        "CONTENT"
    }

    async fn validate(&self, dep: &Deployment<'_>, env: &ValidationEnv, calls: &dyn ExternalCalls) -> Vec<String> {
        let mut errors = Vec::new();
        if !env.is_sync_path {
            for content_hash in dep.entity.content.values() {
                if dep.uploaded_hashes.contains_key(content_hash) {
                    continue;
                }
                if !calls.is_content_stored_already(content_hash).await {
                    errors.push(format!(
                        "This hash is referenced in the entity but was not uploaded or previously available: {content_hash}"
                    ));
                }
            }
        }

        let referenced: std::collections::HashSet<&str> =
            dep.entity.content.values().map(String::as_str).collect();
        for uploaded_hash in dep.uploaded_hashes.keys() {
            if uploaded_hash == dep.entity_file_hash {
                continue;
            }
            if !referenced.contains(uploaded_hash.as_str()) {
                errors.push(format!(
                    "This hash was uploaded but is not referenced in the entity: {uploaded_hash}"
                ));
            }
        }
        errors
    }
}

/// Auth-chain verification over `entity.id` (spec section 4.1: "an empty
/// chain fails with \"The signature is invalid\"").
pub struct Signature;

#[async_trait]
impl Validator for Signature {
    fn name(&self) -> &'static str {
        "SIGNATURE"
    }

    async fn validate(&self, dep: &Deployment<'_>, _: &ValidationEnv, _: &dyn ExternalCalls) -> Vec<String> {
        match verify_auth_chain(&dep.audit.auth_chain, &dep.entity.id) {
            Ok(_) => Vec::new(),
            Err(_) => vec!["The signature is invalid".to_string()],
        }
    }
}

/// Delegates to the external access checker for every pointer.
pub struct Access;

#[async_trait]
impl Validator for Access {
    fn name(&self) -> &'static str {
        "ACCESS"
    }

    async fn validate(&self, dep: &Deployment<'_>, _: &ValidationEnv, calls: &dyn ExternalCalls) -> Vec<String> {
        let mut errors = Vec::new();
        for pointer in &dep.entity.pointers {
            errors.extend(
                calls
                    .check_access(&dep.entity.entity_type, pointer, dep.eth_address)
                    .await,
            );
        }
        errors
    }
}

/// Sum of uploaded bytes divided by pointer count must not exceed the
/// per-type megabyte cap.
pub struct RequestSizeV3;

#[async_trait]
impl Validator for RequestSizeV3 {
    fn name(&self) -> &'static str {
        "REQUEST_SIZE_V3"
    }

    async fn validate(&self, dep: &Deployment<'_>, env: &ValidationEnv, _: &dyn ExternalCalls) -> Vec<String> {
        let Some(&max_mb) = env.max_upload_size_per_type_mb.get(&dep.entity.entity_type) else {
            return Vec::new();
        };
        let total_bytes: u64 = dep.uploaded_hashes.values().sum();
        let pointer_count = dep.entity.pointers.len().max(1) as f64;
        let per_pointer_mb = (total_bytes as f64 / (1024.0 * 1024.0)) / pointer_count;
        if per_pointer_mb > max_mb as f64 {
            vec![format!(
                "The deployment is too big: {per_pointer_mb:.2}MB per pointer exceeds the {max_mb}MB limit for type {}",
                dep.entity.entity_type
            )]
        } else {
            Vec::new()
        }
    }
}

/// Only runs when the deployment carries `migrationData` (spec section
/// 4.1). Resolution of the spec's open question (recorded in
/// `DESIGN.md`): reject only when an overlapping entity is strictly
/// newer-protocol, or is itself non-legacy, or migrated from a strictly
/// greater original version than this deployment.
pub struct LegacyEntity;

#[async_trait]
impl Validator for LegacyEntity {
    fn name(&self) -> &'static str {
        "LEGACY_ENTITY"
    }

    async fn validate(&self, dep: &Deployment<'_>, env: &ValidationEnv, calls: &dyn ExternalCalls) -> Vec<String> {
        let Some(this_migration) = dep.audit.migration_data.as_ref() else {
            return Vec::new();
        };
        if !env.allow_legacy_entities {
            return vec!["Legacy entities are not allowed on this server".to_string()];
        }

        let overlapping = calls
            .fetch_overlapping_deployments(&dep.entity.entity_type, &dep.entity.pointers)
            .await;

        let mut errors = Vec::new();
        for (other_entity, other_audit) in overlapping {
            if other_entity.id == dep.entity.id {
                continue;
            }
            let conflicts = other_audit.version > dep.audit.version
                || match other_audit.migration_data.as_ref() {
                    None => true,
                    Some(other_migration) => {
                        other_migration.original_version > this_migration.original_version
                    }
                };
            if conflicts {
                errors.push(format!(
                    "Legacy deployment conflicts with existing entity {} (version {})",
                    other_entity.id, other_audit.version
                ));
            }
        }
        errors
    }
}
