//! C2 — Storage.
//!
//! Opaque category+key -> bytes store. Storage exclusively owns blob
//! bytes (spec section 3, Ownership); every other component treats it as
//! an async key/value service and never reaches around it.

mod fs;
mod memory;

pub use fs::FsStorage;
pub use memory::MemoryStorage;

use async_trait::async_trait;
use bytes::Bytes;

use crate::entity::EntityType;
use crate::error::StorageError;

/// A storage namespace (spec section 6, Persisted layout).
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Category {
    /// `contents/<hash>` — raw bytes, including entity descriptors
    /// themselves (entity files are content-addressed like any other
    /// blob).
    Content,
    /// `proofs/<entityId>` — UTF-8 JSON `AuditInfo`.
    Proof,
    /// `pointers-<type>/<pointer>` — UTF-8 entity id, or absent. Written
    /// on every committing deploy so pointer state survives a restart
    /// (spec section 6).
    Pointer(EntityType),
    /// `history/<entityId>` — UTF-8 JSON `HistoryEvent`, one file per
    /// ledger entry, replayed on boot to rebuild the in-memory ledger.
    History,
    /// `meta/entity-types` — UTF-8 JSON array of every entity type ever
    /// deployed, so boot-time recovery knows which `Pointer` namespaces
    /// to list without scanning the whole storage root.
    Meta,
}

impl Category {
    fn namespace(&self) -> String {
        match self {
            Category::Content => "contents".to_string(),
            Category::Proof => "proofs".to_string(),
            Category::Pointer(t) => format!("pointers-{}", t.0),
            Category::History => "history".to_string(),
            Category::Meta => "meta".to_string(),
        }
    }
}

#[async_trait]
pub trait Storage: Send + Sync {
    async fn exists(&self, category: &Category, key: &str) -> Result<bool, StorageError>;
    async fn get(&self, category: &Category, key: &str) -> Result<Option<Bytes>, StorageError>;
    async fn put(&self, category: &Category, key: &str, value: Bytes) -> Result<(), StorageError>;
    async fn delete(&self, category: &Category, key: &str) -> Result<(), StorageError>;
    /// Every key currently stored under `category`, for boot-time
    /// recovery (spec section 6). Order is unspecified.
    async fn list(&self, category: &Category) -> Result<Vec<String>, StorageError>;
}
