//! C9 — Cluster & DAO Client (spec section 4.6).
//!
//! A DAO returns the current peer set; `Cluster::refresh` probes each
//! one and produces either an `Active` client or folds it behind a
//! shared `Redirect` client that fans out to whichever peers *are*
//! reachable. Tagged variants of one trait (design notes section 9:
//! "never as a subclass hierarchy").

pub mod dao;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::audit::AuditInfo;
use crate::entity::{Entity, EntityType};
use crate::error::ClusterError;
use crate::history::HistoryEvent;

pub use dao::Dao;

#[derive(Serialize, Deserialize)]
struct HistoryResponse {
    events: Vec<HistoryEvent>,
    #[serde(rename = "lastImmutableTime")]
    last_immutable_time: i64,
}

/// One cluster peer, either genuinely reachable (`Active`) or folded
/// behind the `Redirect` fan-out (spec section 4.6).
#[async_trait]
pub trait ClusterClient: Send + Sync {
    fn name(&self) -> &str;
    /// `false` for `Redirect` clients — callers must not advance a
    /// watermark against a peer that never truly answered.
    fn is_active(&self) -> bool;
    async fn get_history(&self, from: i64) -> Result<Vec<HistoryEvent>, ClusterError>;
    async fn get_entity_and_audit(
        &self,
        entity_type: &EntityType,
        entity_id: &str,
    ) -> Result<(Entity, AuditInfo), ClusterError>;
    async fn get_content(&self, hash: &str) -> Result<Bytes, ClusterError>;
}

/// A peer that answered its `/status` probe on the last refresh.
pub struct ActivePeerClient {
    name: String,
    base_url: String,
    http: reqwest::Client,
}

impl ActivePeerClient {
    pub fn new(name: String, base_url: String, http: reqwest::Client) -> Self {
        Self { name, base_url, http }
    }
}

#[async_trait]
impl ClusterClient for ActivePeerClient {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_active(&self) -> bool {
        true
    }

    async fn get_history(&self, from: i64) -> Result<Vec<HistoryEvent>, ClusterError> {
        let url = format!("{}/history?from={}", self.base_url, from);
        let resp: HistoryResponse = self.http.get(url).send().await?.error_for_status()?.json().await?;
        Ok(resp.events)
    }

    async fn get_entity_and_audit(
        &self,
        entity_type: &EntityType,
        entity_id: &str,
    ) -> Result<(Entity, AuditInfo), ClusterError> {
        let entities_url = format!("{}/entities/{}?id={}", self.base_url, entity_type, entity_id);
        let entities: Vec<Entity> = self
            .http
            .get(entities_url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        let entity = entities.into_iter().next().ok_or(ClusterError::NotFound)?;

        let audit_url = format!("{}/audit/{}/{}", self.base_url, entity_type, entity_id);
        let audit: AuditInfo = self.http.get(audit_url).send().await?.error_for_status()?.json().await?;
        Ok((entity, audit))
    }

    async fn get_content(&self, hash: &str) -> Result<Bytes, ClusterError> {
        let url = format!("{}/contents/{}", self.base_url, hash);
        let resp = self.http.get(url).send().await?.error_for_status()?;
        Ok(resp.bytes().await?)
    }
}

/// Stands in for every currently-unreachable peer. Any call fans out to
/// the live `Active` roster and returns the first success (spec section
/// 4.6: "gives read availability ... even when the naming authority
/// disagrees with reachability").
pub struct RedirectPeerClient {
    name: String,
    active_peers: Arc<RwLock<Vec<Arc<dyn ClusterClient>>>>,
}

impl RedirectPeerClient {
    pub fn new(name: String, active_peers: Arc<RwLock<Vec<Arc<dyn ClusterClient>>>>) -> Self {
        Self { name, active_peers }
    }

    fn peers(&self) -> Vec<Arc<dyn ClusterClient>> {
        self.active_peers.read().clone()
    }
}

#[async_trait]
impl ClusterClient for RedirectPeerClient {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_active(&self) -> bool {
        false
    }

    async fn get_history(&self, from: i64) -> Result<Vec<HistoryEvent>, ClusterError> {
        for peer in self.peers() {
            if let Ok(events) = peer.get_history(from).await {
                return Ok(events);
            }
        }
        Err(ClusterError::AllPeersUnreachable)
    }

    async fn get_entity_and_audit(
        &self,
        entity_type: &EntityType,
        entity_id: &str,
    ) -> Result<(Entity, AuditInfo), ClusterError> {
        for peer in self.peers() {
            if let Ok(result) = peer.get_entity_and_audit(entity_type, entity_id).await {
                return Ok(result);
            }
        }
        Err(ClusterError::AllPeersUnreachable)
    }

    async fn get_content(&self, hash: &str) -> Result<Bytes, ClusterError> {
        for peer in self.peers() {
            if let Ok(bytes) = peer.get_content(hash).await {
                return Ok(bytes);
            }
        }
        Err(ClusterError::AllPeersUnreachable)
    }
}

/// Resolves the peer set from a [`Dao`] and keeps `Active`/`Redirect`
/// clients up to date.
pub struct Cluster {
    dao: Arc<dyn Dao>,
    http: reqwest::Client,
    clients: RwLock<Vec<Arc<dyn ClusterClient>>>,
}

impl Cluster {
    pub fn new(dao: Arc<dyn Dao>, timeout: Duration) -> Self {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("reqwest client config is valid");
        Self {
            dao,
            http,
            clients: RwLock::new(Vec::new()),
        }
    }

    pub fn clients(&self) -> Vec<Arc<dyn ClusterClient>> {
        self.clients.read().clone()
    }

    /// Re-probes every peer the DAO reports (spec section 4.7 step 1).
    pub async fn refresh(&self) -> Result<(), ClusterError> {
        let servers = self.dao.get_all_servers().await?;
        let active_peers: Arc<RwLock<Vec<Arc<dyn ClusterClient>>>> = Arc::new(RwLock::new(Vec::new()));
        let mut names_by_url: HashMap<String, String> = HashMap::new();
        let mut unreachable = Vec::new();

        for base_url in &servers {
            let name = base_url.clone();
            names_by_url.insert(base_url.clone(), name.clone());
            let probe = self.http.get(format!("{base_url}/status")).send().await;
            match probe {
                Ok(resp) if resp.status().is_success() => {
                    let client: Arc<dyn ClusterClient> = Arc::new(ActivePeerClient::new(
                        name,
                        base_url.clone(),
                        self.http.clone(),
                    ));
                    active_peers.write().push(client);
                }
                _ => {
                    warn!(%base_url, "peer unreachable on refresh, folding behind redirect client");
                    unreachable.push(name);
                }
            }
        }

        let mut clients = active_peers.read().clone();
        for name in unreachable {
            clients.push(Arc::new(RedirectPeerClient::new(name, active_peers.clone())));
        }
        *self.clients.write() = clients;
        Ok(())
    }
}
