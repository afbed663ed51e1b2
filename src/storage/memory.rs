//! In-memory `Storage` backend.
//!
//! Grounded in the teacher's `MemoryDB`: a thread-safe `HashMap` wrapper
//! behind a single lock, used as the default/test backend.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;

use super::{Category, Storage};
use crate::error::StorageError;

#[derive(Clone, Default)]
pub struct MemoryStorage {
    db: Arc<RwLock<HashMap<String, Bytes>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn full_key(category: &Category, key: &str) -> String {
        format!("{}/{}", category.namespace(), key)
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn exists(&self, category: &Category, key: &str) -> Result<bool, StorageError> {
        Ok(self.db.read().contains_key(&Self::full_key(category, key)))
    }

    async fn get(&self, category: &Category, key: &str) -> Result<Option<Bytes>, StorageError> {
        Ok(self.db.read().get(&Self::full_key(category, key)).cloned())
    }

    async fn put(&self, category: &Category, key: &str, value: Bytes) -> Result<(), StorageError> {
        self.db.write().insert(Self::full_key(category, key), value);
        Ok(())
    }

    async fn delete(&self, category: &Category, key: &str) -> Result<(), StorageError> {
        self.db.write().remove(&Self::full_key(category, key));
        Ok(())
    }

    async fn list(&self, category: &Category) -> Result<Vec<String>, StorageError> {
        let prefix = format!("{}/", category.namespace());
        Ok(self
            .db
            .read()
            .keys()
            .filter_map(|k| k.strip_prefix(prefix.as_str()).map(str::to_string))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::EntityType;

    #[tokio::test]
    async fn put_then_get_round_trips() {
        let s = MemoryStorage::new();
        s.put(&Category::Content, "abc", Bytes::from_static(b"hi"))
            .await
            .unwrap();
        assert_eq!(
            s.get(&Category::Content, "abc").await.unwrap(),
            Some(Bytes::from_static(b"hi"))
        );
        assert!(s.exists(&Category::Content, "abc").await.unwrap());
    }

    #[tokio::test]
    async fn categories_are_isolated() {
        let s = MemoryStorage::new();
        s.put(&Category::Content, "k", Bytes::from_static(b"content"))
            .await
            .unwrap();
        s.put(
            &Category::Pointer(EntityType::from("scene")),
            "k",
            Bytes::from_static(b"pointer"),
        )
        .await
        .unwrap();
        assert_eq!(
            s.get(&Category::Content, "k").await.unwrap(),
            Some(Bytes::from_static(b"content"))
        );
        assert_eq!(
            s.get(&Category::Pointer(EntityType::from("scene")), "k")
                .await
                .unwrap(),
            Some(Bytes::from_static(b"pointer"))
        );
    }

    #[tokio::test]
    async fn list_returns_keys_within_a_category_only() {
        let s = MemoryStorage::new();
        s.put(&Category::Proof, "id1", Bytes::from_static(b"a")).await.unwrap();
        s.put(&Category::Proof, "id2", Bytes::from_static(b"b")).await.unwrap();
        s.put(&Category::Content, "id1", Bytes::from_static(b"c")).await.unwrap();
        let mut keys = s.list(&Category::Proof).await.unwrap();
        keys.sort();
        assert_eq!(keys, vec!["id1".to_string(), "id2".to_string()]);
    }

    #[tokio::test]
    async fn delete_removes_the_key() {
        let s = MemoryStorage::new();
        s.put(&Category::Proof, "id1", Bytes::from_static(b"audit"))
            .await
            .unwrap();
        s.delete(&Category::Proof, "id1").await.unwrap();
        assert!(!s.exists(&Category::Proof, "id1").await.unwrap());
    }
}
