//! End-to-end deployment scenarios (literal scenarios S1-S5 and
//! idempotence, against an in-memory `Storage`; no real network calls).

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use bytes::Bytes;
use content_mesh::access::AllowAllAccessChecker;
use content_mesh::analytics::LoggingAnalytics;
use content_mesh::auth::{AuthLink, AuthLinkType};
use content_mesh::cache::EntityCache;
use content_mesh::entity::{Entity, EntityType};
use content_mesh::error::DeployError;
use content_mesh::failed::FailedDeploymentRegistry;
use content_mesh::history::HistoryManager;
use content_mesh::pointers::PointerManager;
use content_mesh::service::{ContentService, ContentServerService, DeployRequest, ENTITY_FILE_NAME};
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

fn build_entity(pointers: &[&str], timestamp: i64, content: BTreeMap<String, String>) -> (Entity, Bytes) {
    let unsigned = Entity {
        id: String::new(),
        entity_type: EntityType::from("scene"),
        pointers: pointers.iter().map(|s| s.to_string()).collect(),
        timestamp,
        content,
        metadata: serde_json::Value::Null,
    };
    let id = unsigned.compute_id().unwrap().to_string();
    let mut entity = unsigned;
    entity.id = id;
    let bytes = Bytes::from(serde_json::to_vec(&entity).unwrap());
    (entity, bytes)
}

fn service() -> ContentService {
    ContentService::new(
        Arc::new(MemoryStorage::new()),
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

async fn deploy_signed(
    svc: &ContentService,
    signing_key: &SigningKey,
    pointers: &[&str],
    timestamp: i64,
    content: BTreeMap<String, String>,
    extra_files: HashMap<String, Bytes>,
) -> Result<i64, DeployError> {
    let (entity, entity_bytes) = build_entity(pointers, timestamp, content);
    let mut files = extra_files;
    files.insert(ENTITY_FILE_NAME.to_string(), entity_bytes);
    svc.deploy(DeployRequest {
        files,
        entity_id: entity.id.clone(),
        auth_chain: signed_chain(signing_key, &entity.id),
        server_name: None,
        explicit_timestamp: None,
        check_freshness: true,
        protocol_version: 3,
        migration_data: None,
    })
    .await
}

#[tokio::test]
async fn s1_recent_timestamp_is_rejected() {
    let svc = service();
    let key = SigningKey::random(&mut rand::rngs::OsRng);
    let stale_timestamp = now_ms() - 25 * 60 * 1000;
    let result = deploy_signed(&svc, &key, &["0,0"], stale_timestamp, BTreeMap::new(), HashMap::new()).await;
    match result {
        Err(DeployError::Validation(errors)) => {
            assert!(errors.iter().any(|e| e.contains("not recent enough")));
        }
        other => panic!("expected a RECENT validation failure, got {other:?}"),
    }
}

#[tokio::test]
async fn s2_pointer_overlap_newer_wins() {
    let svc = service();
    let key = SigningKey::random(&mut rand::rngs::OsRng);
    let t1 = now_ms();

    let r1 = deploy_signed(&svc, &key, &["0,0", "0,1"], t1, BTreeMap::new(), HashMap::new())
        .await
        .unwrap();
    assert_eq!(r1, t1);

    let t2 = t1 + 1000;
    deploy_signed(&svc, &key, &["0,1", "0,2"], t2, BTreeMap::new(), HashMap::new())
        .await
        .unwrap();

    let ty = EntityType::from("scene");
    assert!(svc.pointers().active_entity(&ty, "0,0").is_some());
    let e1_id = svc.pointers().active_entity(&ty, "0,0").unwrap();
    assert_ne!(svc.pointers().active_entity(&ty, "0,1").unwrap(), e1_id);
    assert_eq!(
        svc.pointers().active_entity(&ty, "0,1"),
        svc.pointers().active_entity(&ty, "0,2")
    );
    assert_eq!(svc.history().len(), 2);
}

#[tokio::test]
async fn s3_pointer_overlap_older_loses() {
    let svc = service();
    let key = SigningKey::random(&mut rand::rngs::OsRng);
    let t1 = now_ms();

    deploy_signed(&svc, &key, &["0,0"], t1, BTreeMap::new(), HashMap::new())
        .await
        .unwrap();
    let active_after_first = svc
        .pointers()
        .active_entity(&EntityType::from("scene"), "0,0")
        .unwrap();

    // An older timestamp is still accepted (it is persisted for audit)
    // but must not move the pointer.
    deploy_signed(&svc, &key, &["0,0"], t1 - 1000, BTreeMap::new(), HashMap::new())
        .await
        .unwrap();

    assert_eq!(
        svc.pointers().active_entity(&EntityType::from("scene"), "0,0"),
        Some(active_after_first)
    );
}

#[tokio::test]
async fn s4_missing_content_reference_is_rejected() {
    let svc = service();
    let key = SigningKey::random(&mut rand::rngs::OsRng);
    let unfetched_hash = content_mesh::hash::hash(b"never uploaded", content_mesh::hash::CODEC_RAW).to_string();
    let mut content = BTreeMap::new();
    content.insert("a.png".to_string(), unfetched_hash);
    let result = deploy_signed(&svc, &key, &["0,0"], now_ms(), content, HashMap::new()).await;
    match result {
        Err(DeployError::Validation(errors)) => {
            assert!(errors.iter().any(|e| e.contains("was not uploaded or previously available")));
        }
        other => panic!("expected a CONTENT validation failure, got {other:?}"),
    }
}

#[tokio::test]
async fn s5_orphan_upload_is_rejected() {
    let svc = service();
    let key = SigningKey::random(&mut rand::rngs::OsRng);
    let mut extra = HashMap::new();
    extra.insert("orphan.png".to_string(), Bytes::from_static(b"unreferenced bytes"));
    let result = deploy_signed(&svc, &key, &["0,0"], now_ms(), BTreeMap::new(), extra).await;
    match result {
        Err(DeployError::Validation(errors)) => {
            assert!(errors.iter().any(|e| e.contains("was uploaded but is not referenced")));
        }
        other => panic!("expected a CONTENT orphan-upload failure, got {other:?}"),
    }
}

#[tokio::test]
async fn redeploying_the_same_entity_is_idempotent() {
    let svc = service();
    let key = SigningKey::random(&mut rand::rngs::OsRng);
    let t1 = now_ms();
    let (entity, entity_bytes) = build_entity(&["0,0"], t1, BTreeMap::new());
    let make_request = || DeployRequest {
        files: HashMap::from([(ENTITY_FILE_NAME.to_string(), entity_bytes.clone())]),
        entity_id: entity.id.clone(),
        auth_chain: signed_chain(&key, &entity.id),
        server_name: None,
        explicit_timestamp: None,
        check_freshness: true,
        protocol_version: 3,
        migration_data: None,
    };

    svc.deploy(make_request()).await.unwrap();
    assert_eq!(svc.history().len(), 1);
    svc.deploy(make_request()).await.unwrap();
    assert_eq!(svc.history().len(), 1);
}
