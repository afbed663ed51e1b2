//! Blacklist overlay (spec section 4, design notes section 9: "a clean
//! translation is a middleware pattern: the service is a trait, and the
//! blacklist overlay implements the same trait, holding the inner
//! service by value"). Purely subtractive (spec section 7): it never
//! mutates storage, only filters reads and rejects writes that would
//! reference blacklisted content, pointers, or entities.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;

use crate::audit::AuditInfo;
use crate::entity::{Entity, EntityType};
use crate::error::DeployError;
use crate::history::HistoryEvent;
use crate::service::{ContentServerService, DeployRequest, EntityFilter, ServerStatus, ENTITY_FILE_NAME};

pub struct BlacklistOverlay {
    inner: Arc<dyn ContentServerService>,
    entities: RwLock<HashSet<String>>,
    content: RwLock<HashSet<String>>,
    pointers: RwLock<HashSet<(EntityType, String)>>,
}

impl BlacklistOverlay {
    pub fn new(inner: Arc<dyn ContentServerService>) -> Self {
        Self {
            inner,
            entities: RwLock::new(HashSet::new()),
            content: RwLock::new(HashSet::new()),
            pointers: RwLock::new(HashSet::new()),
        }
    }

    pub fn blacklist_entity(&self, entity_id: &str) {
        self.entities.write().insert(entity_id.to_string());
    }

    pub fn blacklist_content(&self, hash: &str) {
        self.content.write().insert(hash.to_string());
    }

    pub fn blacklist_pointer(&self, entity_type: &EntityType, pointer: &str) {
        self.pointers
            .write()
            .insert((entity_type.clone(), pointer.to_string()));
    }

    fn is_content_blacklisted(&self, hash: &str) -> bool {
        self.content.read().contains(hash)
    }

    fn is_entity_blacklisted(&self, entity: &Entity) -> bool {
        if self.entities.read().contains(&entity.id) {
            return true;
        }
        let pointers = self.pointers.read();
        entity
            .pointers
            .iter()
            .any(|p| pointers.contains(&(entity.entity_type.clone(), p.clone())))
    }
}

#[async_trait]
impl ContentServerService for BlacklistOverlay {
    async fn deploy(&self, request: DeployRequest) -> Result<i64, DeployError> {
        if let Some(bytes) = request.files.get(ENTITY_FILE_NAME) {
            if let Ok(entity) = Entity::parse(bytes) {
                if self.is_entity_blacklisted(&entity) {
                    return Err(DeployError::Blacklisted);
                }
                for hash in entity.content.values() {
                    if self.is_content_blacklisted(hash) {
                        return Err(DeployError::Blacklisted);
                    }
                }
            }
        }
        self.inner.deploy(request).await
    }

    async fn get_entities(
        &self,
        entity_type: &EntityType,
        filter: EntityFilter,
    ) -> Result<Vec<Entity>, DeployError> {
        let entities = self.inner.get_entities(entity_type, filter).await?;
        Ok(entities
            .into_iter()
            .filter(|e| !self.is_entity_blacklisted(e))
            .collect())
    }

    async fn get_active_pointers(&self, entity_type: &EntityType) -> Vec<String> {
        let pointers_blacklist = self.pointers.read();
        self.inner
            .get_active_pointers(entity_type)
            .await
            .into_iter()
            .filter(|p| !pointers_blacklist.contains(&(entity_type.clone(), p.clone())))
            .collect()
    }

    async fn get_content(&self, hash: &str) -> Result<Option<Bytes>, DeployError> {
        if self.is_content_blacklisted(hash) {
            return Ok(None);
        }
        self.inner.get_content(hash).await
    }

    async fn available_content(&self, hashes: &[String]) -> Result<Vec<(String, bool)>, DeployError> {
        let mut results = self.inner.available_content(hashes).await?;
        for (hash, available) in &mut results {
            if self.is_content_blacklisted(hash) {
                *available = false;
            }
        }
        Ok(results)
    }

    async fn get_audit(&self, entity_id: &str) -> Result<Option<AuditInfo>, DeployError> {
        if self.entities.read().contains(entity_id) {
            return Ok(None);
        }
        self.inner.get_audit(entity_id).await
    }

    async fn get_history(
        &self,
        from: Option<i64>,
        to: Option<i64>,
        server_name: Option<&str>,
    ) -> Vec<HistoryEvent> {
        self.inner.get_history(from, to, server_name).await
    }

    fn status(&self, server_name: &str, version: &str, now_ms: i64) -> ServerStatus {
        self.inner.status(server_name, version, now_ms)
    }
}
