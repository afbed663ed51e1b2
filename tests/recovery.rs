//! Boot-time recovery: deploy against one set of in-memory components,
//! then rebuild a fresh `PointerManager`/`HistoryManager` from the same
//! `Storage` and confirm the restored state matches.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use bytes::Bytes;
use content_mesh::access::AllowAllAccessChecker;
use content_mesh::analytics::LoggingAnalytics;
use content_mesh::auth::{AuthLink, AuthLinkType};
use content_mesh::cache::EntityCache;
use content_mesh::entity::{Entity, EntityType};
use content_mesh::failed::FailedDeploymentRegistry;
use content_mesh::history::HistoryManager;
use content_mesh::pointers::PointerManager;
use content_mesh::recovery::rebuild_from_storage;
use content_mesh::service::{ContentServerService, ContentService, DeployRequest, ENTITY_FILE_NAME};
use content_mesh::storage::MemoryStorage;
use ethereum_types::Address;
use k256::ecdsa::SigningKey;

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

fn personal_sign_digest(message: &[u8]) -> [u8; 32] {
    let prefix = format!("\x19Ethereum Signed Message:\n{}", message.len());
    let mut buf = Vec::with_capacity(prefix.len() + message.len());
    buf.extend_from_slice(prefix.as_bytes());
    buf.extend_from_slice(message);
    keccak_hash::keccak(buf).0
}

fn address_of(signing_key: &SigningKey) -> Address {
    let uncompressed = signing_key.verifying_key().to_encoded_point(false);
    let pubkey_bytes = &uncompressed.as_bytes()[1..];
    let hash = keccak_hash::keccak(pubkey_bytes);
    Address::from_slice(&hash.as_bytes()[12..])
}

fn sign(signing_key: &SigningKey, message: &[u8]) -> String {
    let digest = personal_sign_digest(message);
    let (signature, recovery_id) = signing_key
        .sign_prehash_recoverable(&digest)
        .expect("signing a 32-byte digest never fails");
    let mut bytes = signature.to_bytes().to_vec();
    bytes.push(recovery_id.to_byte() + 27);
    format!("0x{}", hex::encode(bytes))
}

fn signed_chain(signing_key: &SigningKey, entity_id: &str) -> Vec<AuthLink> {
    vec![
        AuthLink {
            link_type: AuthLinkType::Signer,
            payload: format!("{:#x}", address_of(signing_key)),
            signature: None,
        },
        AuthLink {
            link_type: AuthLinkType::EcdsaSignedEntity,
            payload: entity_id.to_string(),
            signature: Some(sign(signing_key, entity_id.as_bytes())),
        },
    ]
}

fn build_entity(pointers: &[&str], timestamp: i64) -> (Entity, Bytes) {
    let unsigned = Entity {
        id: String::new(),
        entity_type: EntityType::from("scene"),
        pointers: pointers.iter().map(|s| s.to_string()).collect(),
        timestamp,
        content: BTreeMap::new(),
        metadata: serde_json::Value::Null,
    };
    let id = unsigned.compute_id().unwrap().to_string();
    let mut entity = unsigned;
    entity.id = id;
    let bytes = Bytes::from(serde_json::to_vec(&entity).unwrap());
    (entity, bytes)
}

fn service(storage: Arc<MemoryStorage>) -> ContentService {
    ContentService::new(
        storage,
        Arc::new(PointerManager::new()),
        Arc::new(HistoryManager::new(content_mesh::history::DEFAULT_IMMUTABLE_DELTA_MS)),
        Arc::new(FailedDeploymentRegistry::new()),
        Arc::new(EntityCache::new(128)),
        Arc::new(AllowAllAccessChecker),
        Arc::new(LoggingAnalytics),
        10 * 60 * 1000,
        5 * 60 * 1000,
        HashMap::new(),
        true,
    )
}

#[tokio::test]
async fn pointer_and_history_state_survive_a_simulated_restart() {
    let storage = Arc::new(MemoryStorage::new());
    let key = SigningKey::random(&mut rand::rngs::OsRng);
    let t1 = now_ms();

    {
        let svc = service(storage.clone());
        let (entity, entity_bytes) = build_entity(&["0,0", "0,1"], t1);
        let mut files = HashMap::new();
        files.insert(ENTITY_FILE_NAME.to_string(), entity_bytes);
        svc.deploy(DeployRequest {
            files,
            entity_id: entity.id.clone(),
            auth_chain: signed_chain(&key, &entity.id),
            server_name: Some("local".to_string()),
            explicit_timestamp: None,
            check_freshness: true,
            protocol_version: 3,
            migration_data: None,
        })
        .await
        .unwrap();
    }

    // Simulate a daemon restart: fresh PointerManager/HistoryManager
    // backed by the same storage.
    let restored_pointers = PointerManager::new();
    let restored_history = HistoryManager::new(content_mesh::history::DEFAULT_IMMUTABLE_DELTA_MS);
    rebuild_from_storage(storage.as_ref(), &restored_pointers, &restored_history)
        .await
        .unwrap();

    let ty = EntityType::from("scene");
    assert!(restored_pointers.active_entity(&ty, "0,0").is_some());
    assert_eq!(
        restored_pointers.active_entity(&ty, "0,0"),
        restored_pointers.active_entity(&ty, "0,1")
    );
    assert_eq!(restored_history.len(), 1);
}
