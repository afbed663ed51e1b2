//! Parses a `POST /entities` multipart body into a [`DeployRequest`]
//! (spec section 6: "multipart; must contain a part named `entity.json`
//! plus any referenced content files, plus form fields `entityId`,
//! `ethAddress`, `signature`/authChain"). Multipart parsing internals are
//! out of scope per spec section 1; this is the thin adapter the core
//! never has to know about.

use std::collections::HashMap;

use axum::extract::Multipart;
use bytes::Bytes;

use crate::auth::AuthLink;
use crate::service::DeployRequest;

use super::error::ApiError;

pub async fn parse_deploy_request(mut multipart: Multipart) -> Result<DeployRequest, ApiError> {
    let mut files: HashMap<String, Bytes> = HashMap::new();
    let mut entity_id = None;
    let mut auth_chain: Vec<AuthLink> = Vec::new();
    let mut protocol_version = 3u32;
    let mut migration_data = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("malformed multipart body: {e}")))?
    {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "entityId" => {
                entity_id = Some(field.text().await.unwrap_or_default());
            }
            "authChain" => {
                let text = field.text().await.unwrap_or_default();
                auth_chain = serde_json::from_str(&text)
                    .map_err(|e| ApiError::bad_request(format!("invalid authChain: {e}")))?;
            }
            "version" => {
                let text = field.text().await.unwrap_or_default();
                protocol_version = text.parse().unwrap_or(protocol_version);
            }
            "migrationData" => {
                let text = field.text().await.unwrap_or_default();
                migration_data = serde_json::from_str(&text).ok();
            }
            "ethAddress" | "signature" => {
                // The address/signature are carried inside `authChain`
                // links themselves; these legacy-shaped fields are
                // accepted for client compatibility and otherwise unused.
                let _ = field.text().await;
            }
            _ => {
                let file_name = field.file_name().map(str::to_string).unwrap_or(name);
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::bad_request(format!("could not read part {file_name}: {e}")))?;
                files.insert(file_name, bytes);
            }
        }
    }

    let entity_id = entity_id.ok_or_else(|| ApiError::bad_request("missing entityId field".to_string()))?;
    if auth_chain.is_empty() {
        return Err(ApiError::bad_request("missing authChain field".to_string()));
    }

    Ok(DeployRequest {
        files,
        entity_id,
        auth_chain,
        server_name: None,
        explicit_timestamp: None,
        check_freshness: true,
        protocol_version,
        migration_data,
    })
}
