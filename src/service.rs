//! C8 — Service / Deploy Orchestrator.
//!
//! The single entry point that turns an uploaded set of files plus an
//! auth chain into a committed deployment (spec section 4.5). Also
//! exposes the read paths (`get_entities`, `get_content`, ...) the HTTP
//! transport and Synchronizer need, so every other component only ever
//! reaches storage/pointers/history through here.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::{info, instrument};

use crate::access::AccessChecker;
use crate::analytics::Analytics;
use crate::audit::{AuditInfo, MigrationData};
use crate::auth::{claimed_root_address, AuthLink};
use crate::cache::EntityCache;
use crate::entity::{Entity, EntityType};
use crate::error::DeployError;
use crate::failed::FailedDeploymentRegistry;
use crate::hash::{self, CODEC_RAW};
use crate::history::{HistoryEvent, HistoryManager};
use crate::pointers::PointerManager;
use crate::storage::{Category, Storage};
use crate::validation::{self, Deployment, ExternalCalls, ValidationEnv, Validator};

/// The files and metadata a client (or the Synchronizer) submits for one
/// deployment. `files` must contain a part named `entity.json`.
pub struct DeployRequest {
    pub files: HashMap<String, Bytes>,
    pub entity_id: String,
    pub auth_chain: Vec<AuthLink>,
    pub server_name: Option<String>,
    pub explicit_timestamp: Option<i64>,
    pub check_freshness: bool,
    pub protocol_version: u32,
    pub migration_data: Option<MigrationData>,
}

pub const ENTITY_FILE_NAME: &str = "entity.json";

/// The key `known_entity_types`/[`crate::recovery::rebuild_from_storage`]
/// store the persisted entity-type set under, in `Category::Meta`.
pub const ENTITY_TYPES_KEY: &str = "entity-types";

pub enum EntityFilter {
    Pointers(Vec<String>),
    Ids(Vec<String>),
}

#[derive(Clone, Debug)]
pub struct ServerStatus {
    pub name: String,
    pub version: String,
    pub current_time: i64,
    pub last_immutable_time: i64,
}

/// The trait the blacklist overlay (design notes section 9) decorates:
/// the HTTP layer and Synchronizer depend on this, never on
/// `ContentService` directly, so the overlay is a drop-in.
#[async_trait]
pub trait ContentServerService: Send + Sync {
    async fn deploy(&self, request: DeployRequest) -> Result<i64, DeployError>;
    async fn get_entities(
        &self,
        entity_type: &EntityType,
        filter: EntityFilter,
    ) -> Result<Vec<Entity>, DeployError>;
    async fn get_active_pointers(&self, entity_type: &EntityType) -> Vec<String>;
    async fn get_content(&self, hash: &str) -> Result<Option<Bytes>, DeployError>;
    async fn available_content(&self, hashes: &[String]) -> Result<Vec<(String, bool)>, DeployError>;
    async fn get_audit(
        &self,
        entity_id: &str,
    ) -> Result<Option<AuditInfo>, DeployError>;
    async fn get_history(
        &self,
        from: Option<i64>,
        to: Option<i64>,
        server_name: Option<&str>,
    ) -> Vec<HistoryEvent>;
    fn status(&self, server_name: &str, version: &str, now_ms: i64) -> ServerStatus;
}

pub struct ContentService {
    storage: Arc<dyn Storage>,
    pointers: Arc<PointerManager>,
    history: Arc<HistoryManager>,
    failed: Arc<FailedDeploymentRegistry>,
    cache: Arc<EntityCache>,
    validators: Vec<Box<dyn Validator>>,
    access: Arc<dyn AccessChecker>,
    analytics: Arc<dyn Analytics>,
    ttl_backwards_ms: i64,
    ttl_forward_ms: i64,
    max_upload_size_per_type_mb: HashMap<EntityType, u64>,
    allow_legacy_entities: bool,
    // Single-writer serialization point (spec section 5: "implementations
    // must serialize deploy calls").
    deploy_lock: tokio::sync::Mutex<()>,
}

impl ContentService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        storage: Arc<dyn Storage>,
        pointers: Arc<PointerManager>,
        history: Arc<HistoryManager>,
        failed: Arc<FailedDeploymentRegistry>,
        cache: Arc<EntityCache>,
        access: Arc<dyn AccessChecker>,
        analytics: Arc<dyn Analytics>,
        ttl_backwards_ms: i64,
        ttl_forward_ms: i64,
        max_upload_size_per_type_mb: HashMap<EntityType, u64>,
        allow_legacy_entities: bool,
    ) -> Self {
        Self {
            storage,
            pointers,
            history,
            failed,
            cache,
            validators: validation::default_validators(),
            access,
            analytics,
            ttl_backwards_ms,
            ttl_forward_ms,
            max_upload_size_per_type_mb,
            allow_legacy_entities,
            deploy_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn pointers(&self) -> &Arc<PointerManager> {
        &self.pointers
    }

    pub fn history(&self) -> &Arc<HistoryManager> {
        &self.history
    }

    pub fn failed_deployments(&self) -> &Arc<FailedDeploymentRegistry> {
        &self.failed
    }

    async fn load_entity(&self, id: &str) -> Result<Option<Entity>, DeployError> {
        if let Some(cached) = self.cache.get(id) {
            return Ok(Some((*cached).clone()));
        }
        let Some(bytes) = self.storage.get(&Category::Content, id).await? else {
            return Ok(None);
        };
        let entity = Entity::parse(&bytes)?;
        self.cache.insert(entity.clone());
        Ok(Some(entity))
    }

    async fn load_audit(&self, id: &str) -> Result<Option<AuditInfo>, DeployError> {
        let Some(bytes) = self.storage.get(&Category::Proof, id).await? else {
            return Ok(None);
        };
        let audit: AuditInfo = serde_json::from_slice(&bytes)
            .map_err(|e| DeployError::Internal(anyhow::anyhow!(e)))?;
        Ok(Some(audit))
    }

    /// Adds `entity_type` to the persisted set of known types, if absent,
    /// so [`crate::recovery::rebuild_from_storage`] knows which `Pointer`
    /// namespaces to list on the next boot.
    async fn remember_entity_type(&self, entity_type: &EntityType) -> Result<(), DeployError> {
        let mut types = self.known_entity_types().await?;
        if types.iter().any(|t| t == entity_type) {
            return Ok(());
        }
        types.push(entity_type.clone());
        let bytes = serde_json::to_vec(&types).map_err(|e| DeployError::Internal(anyhow::anyhow!(e)))?;
        self.storage
            .put(&Category::Meta, ENTITY_TYPES_KEY, Bytes::from(bytes))
            .await?;
        Ok(())
    }

    async fn known_entity_types(&self) -> Result<Vec<EntityType>, DeployError> {
        let Some(bytes) = self.storage.get(&Category::Meta, ENTITY_TYPES_KEY).await? else {
            return Ok(Vec::new());
        };
        serde_json::from_slice(&bytes).map_err(|e| DeployError::Internal(anyhow::anyhow!(e)))
    }
}

#[async_trait]
impl ContentServerService for ContentService {
    #[instrument(skip(self, request), fields(entity_id = %request.entity_id))]
    async fn deploy(&self, request: DeployRequest) -> Result<i64, DeployError> {
        // Steps 1-3 (spec section 4.5): locate entity.json, parse it, and
        // confirm its claimed id matches its canonical hash.
        let entity_bytes = request
            .files
            .get(ENTITY_FILE_NAME)
            .ok_or_else(|| DeployError::Validation(vec!["Missing entity.json part".to_string()]))?;
        let entity = Entity::parse(entity_bytes)?;
        if entity.id != request.entity_id || !entity.verify_id()? {
            return Err(DeployError::Validation(vec![format!(
                "Entity id {} does not match the content of entity.json",
                request.entity_id
            )]));
        }

        // Step 6 (moved earlier so validation can see upload sizes/hashes):
        // hash every uploaded file under the raw content codec.
        let mut uploaded_hashes = HashMap::new();
        let mut entity_file_hash = String::new();
        for (name, bytes) in &request.files {
            let cid = hash::hash_blocking(bytes.clone(), CODEC_RAW).await.to_string();
            if name == ENTITY_FILE_NAME {
                entity_file_hash = cid.clone();
            }
            uploaded_hashes.insert(cid, bytes.len() as u64);
        }

        let eth_address = claimed_root_address(&request.auth_chain)
            .map(|a| format!("{a:#x}"))
            .unwrap_or_default();

        let audit = AuditInfo {
            deployed_timestamp: request.explicit_timestamp.unwrap_or_else(now_ms),
            auth_chain: request.auth_chain.clone(),
            version: request.protocol_version,
            migration_data: request.migration_data.clone(),
        };

        let env = ValidationEnv {
            now_ms: now_ms(),
            ttl_backwards_ms: self.ttl_backwards_ms,
            ttl_forward_ms: self.ttl_forward_ms,
            max_upload_size_per_type_mb: self.max_upload_size_per_type_mb.clone(),
            allow_legacy_entities: self.allow_legacy_entities,
            is_sync_path: !request.check_freshness,
        };
        let deployment = Deployment {
            entity: &entity,
            audit: &audit,
            entity_file_hash: &entity_file_hash,
            uploaded_hashes: &uploaded_hashes,
            eth_address: &eth_address,
        };
        let external_calls = ServiceExternalCalls {
            storage: self.storage.as_ref(),
            pointers: &self.pointers,
            access: self.access.as_ref(),
        };

        // Step 4: run every validator, collecting all errors.
        let errors = validation::validate_all(&self.validators, &deployment, &env, &external_calls).await;
        if !errors.is_empty() {
            return Err(DeployError::Validation(errors));
        }

        // Mutation region: steps 5 and 7-12 must observe a single total
        // order (spec section 5).
        let _guard = self.deploy_lock.lock().await;

        // Step 5: checkFreshness — local deploys only reject stale writes.
        if request.check_freshness {
            let candidate = (entity.timestamp, entity.id.clone());
            if self
                .pointers
                .has_newer_entity(&entity.entity_type, &entity.pointers, &candidate)
            {
                return Err(DeployError::Validation(vec![
                    "There is a newer entity already deployed for one of the given pointers"
                        .to_string(),
                ]));
            }
        }

        let deployment_timestamp = audit.deployed_timestamp;

        // Step 7: commit pointers. The ordering key is the client-declared
        // `entity.timestamp` (spec section 4.2's tryToCommit compares
        // `(E.timestamp, E.id)`, not server arrival time) — the same field
        // the checkFreshness candidate above is built from, and distinct
        // from `deployment_timestamp`/`audit.deployed_timestamp`, which
        // only ever feeds the history event and the returned
        // creationTimestamp.
        let outcome = self.pointers.try_to_commit(
            &entity.entity_type,
            &entity.id,
            entity.timestamp,
            &entity.pointers,
        );
        for deleted_id in &outcome.entities_deleted {
            self.cache.evict(deleted_id);
        }

        // Persist pointer state so a restart can rebuild it (spec section
        // 6: `pointers-<type>/<pointer>` -> entity id) and record the
        // entity type so boot-time recovery knows which namespace to list.
        if outcome.could_commit {
            for p in &entity.pointers {
                self.storage
                    .put(
                        &Category::Pointer(entity.entity_type.clone()),
                        p,
                        Bytes::from(entity.id.clone()),
                    )
                    .await?;
            }
            self.remember_entity_type(&entity.entity_type).await?;
        }

        // Step 8: persist content. Entity file is always stored under its
        // own id (the canonical descriptor key); the rest only if committed.
        self.storage
            .put(&Category::Content, &entity.id, entity_bytes.clone())
            .await?;
        if outcome.could_commit {
            for (name, bytes) in &request.files {
                if name == ENTITY_FILE_NAME {
                    continue;
                }
                let cid = hash::hash(bytes, CODEC_RAW).to_string();
                if !self.storage.exists(&Category::Content, &cid).await? {
                    self.storage.put(&Category::Content, &cid, bytes.clone()).await?;
                }
            }
        }

        // Step 10: persist AuditInfo.
        let audit_bytes = serde_json::to_vec(&audit).map_err(|e| DeployError::Internal(anyhow::anyhow!(e)))?;
        self.storage
            .put(&Category::Proof, &entity.id, Bytes::from(audit_bytes))
            .await?;

        // Step 11: append to history (idempotent on entityId), and persist
        // the event so the ledger survives a restart (spec section 6).
        let history_event = HistoryEvent {
            server_name: request.server_name.clone().unwrap_or_else(|| "local".to_string()),
            entity_id: entity.id.clone(),
            entity_type: entity.entity_type.clone(),
            timestamp: deployment_timestamp,
        };
        if self.history.append(history_event.clone()) {
            let event_bytes = serde_json::to_vec(&history_event)
                .map_err(|e| DeployError::Internal(anyhow::anyhow!(e)))?;
            self.storage
                .put(&Category::History, &entity.id, Bytes::from(event_bytes))
                .await?;
        }

        self.failed.clear(&entity.id);
        self.cache.insert(entity.clone());

        // Step 12: fire-and-forget analytics.
        self.analytics
            .record_deployment(&entity.id, &entity.entity_type, request.server_name.as_deref())
            .await;

        info!(entity_id = %entity.id, could_commit = outcome.could_commit, "deployment applied");
        Ok(deployment_timestamp)
    }

    async fn get_entities(
        &self,
        entity_type: &EntityType,
        filter: EntityFilter,
    ) -> Result<Vec<Entity>, DeployError> {
        let ids: HashSet<String> = match filter {
            EntityFilter::Ids(ids) => ids.into_iter().collect(),
            EntityFilter::Pointers(pointers) => pointers
                .into_iter()
                .filter_map(|p| self.pointers.active_entity(entity_type, &p))
                .collect(),
        };
        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(entity) = self.load_entity(&id).await? {
                out.push(entity);
            }
        }
        Ok(out)
    }

    async fn get_active_pointers(&self, entity_type: &EntityType) -> Vec<String> {
        self.pointers.active_pointers(entity_type)
    }

    async fn get_content(&self, hash: &str) -> Result<Option<Bytes>, DeployError> {
        Ok(self.storage.get(&Category::Content, hash).await?)
    }

    async fn available_content(&self, hashes: &[String]) -> Result<Vec<(String, bool)>, DeployError> {
        let mut out = Vec::with_capacity(hashes.len());
        for h in hashes {
            let available = self.storage.exists(&Category::Content, h).await?;
            out.push((h.clone(), available));
        }
        Ok(out)
    }

    async fn get_audit(&self, entity_id: &str) -> Result<Option<AuditInfo>, DeployError> {
        self.load_audit(entity_id).await
    }

    async fn get_history(
        &self,
        from: Option<i64>,
        to: Option<i64>,
        server_name: Option<&str>,
    ) -> Vec<HistoryEvent> {
        self.history.get_history(from, to, server_name)
    }

    fn status(&self, server_name: &str, version: &str, now_ms: i64) -> ServerStatus {
        ServerStatus {
            name: server_name.to_string(),
            version: version.to_string(),
            current_time: now_ms,
            last_immutable_time: self.history.immutable_time(now_ms),
        }
    }
}

struct ServiceExternalCalls<'a> {
    storage: &'a dyn Storage,
    pointers: &'a PointerManager,
    access: &'a dyn AccessChecker,
}

#[async_trait]
impl ExternalCalls for ServiceExternalCalls<'_> {
    async fn is_content_stored_already(&self, hash: &str) -> bool {
        self.storage
            .exists(&Category::Content, hash)
            .await
            .unwrap_or(false)
    }

    async fn fetch_overlapping_deployments(
        &self,
        entity_type: &EntityType,
        pointers: &[String],
    ) -> Vec<(Entity, AuditInfo)> {
        let mut ids: HashSet<String> = HashSet::new();
        for p in pointers {
            if let Some(id) = self.pointers.active_entity(entity_type, p) {
                ids.insert(id);
            }
        }
        let mut out = Vec::new();
        for id in ids {
            let entity = match self.storage.get(&Category::Content, &id).await {
                Ok(Some(bytes)) => match Entity::parse(&bytes) {
                    Ok(e) => e,
                    Err(_) => continue,
                },
                _ => continue,
            };
            let audit = match self.storage.get(&Category::Proof, &id).await {
                Ok(Some(bytes)) => match serde_json::from_slice::<AuditInfo>(&bytes) {
                    Ok(a) => a,
                    Err(_) => continue,
                },
                _ => continue,
            };
            out.push((entity, audit));
        }
        out
    }

    async fn check_access(
        &self,
        entity_type: &EntityType,
        pointer: &str,
        eth_address: &str,
    ) -> Vec<String> {
        self.access.check_access(entity_type, pointer, eth_address).await
    }
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
