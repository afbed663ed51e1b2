//! Access control (spec section 1: "the access-control checker that
//! consults an external blockchain" is an out-of-scope collaborator).
//! The core only needs a narrow async capability; this module defines
//! that capability and a permissive default so the crate is runnable
//! without a real chain client wired in.

use async_trait::async_trait;

use crate::entity::EntityType;

#[async_trait]
pub trait AccessChecker: Send + Sync {
    /// Returns domain-specific error strings (e.g. "address does not own
    /// parcel 10,20") if `eth_address` may not deploy onto `pointer` of
    /// `entity_type`. An empty vec means access is granted.
    async fn check_access(
        &self,
        entity_type: &EntityType,
        pointer: &str,
        eth_address: &str,
    ) -> Vec<String>;
}

/// Grants access unconditionally. Used as the default collaborator and
/// in tests; production deployments supply a real chain-backed checker.
pub struct AllowAllAccessChecker;

#[async_trait]
impl AccessChecker for AllowAllAccessChecker {
    async fn check_access(&self, _: &EntityType, _: &str, _: &str) -> Vec<String> {
        Vec::new()
    }
}

/// Denies access to a fixed set of `(type, pointer)` pairs — useful for
/// tests that exercise the `ACCESS` validator's failure path without a
/// real chain client.
pub struct DenyListAccessChecker {
    pub denied: Vec<(EntityType, String)>,
}

#[async_trait]
impl AccessChecker for DenyListAccessChecker {
    async fn check_access(
        &self,
        entity_type: &EntityType,
        pointer: &str,
        _eth_address: &str,
    ) -> Vec<String> {
        if self
            .denied
            .iter()
            .any(|(t, p)| t == entity_type && p == pointer)
        {
            vec![format!(
                "The provided address does not have access to pointer {pointer}"
            )]
        } else {
            Vec::new()
        }
    }
}
