//! Crate-wide error taxonomy.
//!
//! Each component leaf gets its own `thiserror` enum; the HTTP layer is the
//! only place that collapses these into the client-facing taxonomy from
//! spec section 7 (`VALIDATION` / `NOT_FOUND` / `BLACKLISTED` / `INTERNAL`).

use thiserror::Error;

/// Error returned while hashing or parsing a content identifier.
#[derive(Debug, Error)]
pub enum HashError {
    #[error("not a valid CIDv1 string: {0}")]
    InvalidCid(String),
}

/// Error returned by a [`crate::storage::Storage`] backend.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage backend I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Other(String),
}

/// Error returned while parsing an entity descriptor (C3).
#[derive(Debug, Error)]
pub enum EntityError {
    #[error("entity descriptor is not valid JSON: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("entity descriptor canonical encoding failed: {0}")]
    Canonicalization(String),
    #[error("entity must declare at least one pointer")]
    NoPointers,
}

/// Error surfaced by the auth-chain verifier (C-signature).
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("auth chain is empty")]
    EmptyChain,
    #[error("auth chain signature does not recover to the claimed address")]
    BadSignature,
    #[error("auth chain is not rooted at a signer")]
    NoSigner,
}

/// The taxonomy a client-facing transport maps onto HTTP status codes
/// (spec section 7).
#[derive(Debug, Error)]
pub enum DeployError {
    /// One or more validation predicates failed. The request was rejected
    /// before any mutation took place.
    #[error("{}", .0.join("; "))]
    Validation(Vec<String>),
    #[error("not found")]
    NotFound,
    #[error("blacklisted")]
    Blacklisted,
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// Error surfaced by the Cluster/DAO peer-client layer (C9).
#[derive(Debug, Error)]
pub enum ClusterError {
    #[error("peer request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("no reachable peer could satisfy the request")]
    AllPeersUnreachable,
    #[error("peer returned no such resource")]
    NotFound,
}

impl From<StorageError> for DeployError {
    fn from(e: StorageError) -> Self {
        DeployError::Internal(e.into())
    }
}

impl From<EntityError> for DeployError {
    fn from(e: EntityError) -> Self {
        DeployError::Validation(vec![e.to_string()])
    }
}
