//! C11 — HTTP transport (spec section 6). Deliberately thin: every
//! handler only translates request shape and calls into a
//! `ContentServerService`, and [`error::ApiError`] is the sole place
//! [`DeployError`] becomes an HTTP status code.

mod error;
mod multipart;

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Multipart, Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use tower_http::trace::TraceLayer;

use crate::entity::{Entity, EntityType};
use crate::service::{ContentServerService, EntityFilter};

use error::ApiError;

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<dyn ContentServerService>,
    pub server_name: String,
    pub version: String,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/entities/{entity_type}", get(get_entities))
        .route("/entities", post(deploy))
        .route("/contents/{hash}", get(get_content))
        .route("/available-content", post(available_content))
        .route("/pointers/{entity_type}", get(get_pointers))
        .route("/audit/{entity_type}/{entity_id}", get(get_audit))
        .route("/history", get(get_history))
        .route("/status", get(get_status))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn get_entities(
    State(state): State<AppState>,
    Path(entity_type): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<Vec<Entity>>, ApiError> {
    let entity_type = EntityType::from(entity_type.as_str());
    let filter = if let Some(ids) = params.get("id") {
        EntityFilter::Ids(ids.split(',').map(str::to_string).collect())
    } else if let Some(pointers) = params.get("pointer") {
        EntityFilter::Pointers(pointers.split(',').map(str::to_string).collect())
    } else {
        return Err(ApiError::bad_request(
            "must provide at least one of: pointer, id".to_string(),
        ));
    };
    let entities = state.service.get_entities(&entity_type, filter).await?;
    Ok(Json(entities))
}

/// `entity_type` is never taken from the path here — spec section 6 has
/// a single `POST /entities`, and the type is whatever `entity.json`
/// itself declares; `ContentService::deploy` parses it from there.
async fn deploy(State(state): State<AppState>, multipart: Multipart) -> Result<impl IntoResponse, ApiError> {
    let request = multipart::parse_deploy_request(multipart).await?;
    let creation_timestamp = state.service.deploy(request).await?;
    Ok((
        StatusCode::OK,
        Json(serde_json::json!({ "creationTimestamp": creation_timestamp })),
    ))
}

async fn get_content(State(state): State<AppState>, Path(hash): Path<String>) -> Result<impl IntoResponse, ApiError> {
    match state.service.get_content(&hash).await? {
        Some(bytes) => Ok((StatusCode::OK, bytes)),
        None => Err(ApiError::from(crate::error::DeployError::NotFound)),
    }
}

#[derive(Serialize)]
struct AvailableContentEntry {
    cid: String,
    available: bool,
}

async fn available_content(
    State(state): State<AppState>,
    Json(hashes): Json<Vec<String>>,
) -> Result<Json<Vec<AvailableContentEntry>>, ApiError> {
    let results = state.service.available_content(&hashes).await?;
    Ok(Json(
        results
            .into_iter()
            .map(|(cid, available)| AvailableContentEntry { cid, available })
            .collect(),
    ))
}

async fn get_pointers(State(state): State<AppState>, Path(entity_type): Path<String>) -> Json<Vec<String>> {
    let entity_type = EntityType::from(entity_type.as_str());
    Json(state.service.get_active_pointers(&entity_type).await)
}

async fn get_audit(
    State(state): State<AppState>,
    Path((_entity_type, entity_id)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    match state.service.get_audit(&entity_id).await? {
        Some(audit) => Ok((StatusCode::OK, Json(audit))),
        None => Err(ApiError::from(crate::error::DeployError::NotFound)),
    }
}

#[derive(Serialize)]
struct HistoryResponse {
    events: Vec<crate::history::HistoryEvent>,
    #[serde(rename = "lastImmutableTime")]
    last_immutable_time: i64,
}

async fn get_history(State(state): State<AppState>, Query(params): Query<HashMap<String, String>>) -> Json<HistoryResponse> {
    let from = params.get("from").and_then(|v| v.parse().ok());
    let to = params.get("to").and_then(|v| v.parse().ok());
    let server_name = params.get("serverName").map(String::as_str);
    let events = state.service.get_history(from, to, server_name).await;
    let now = chrono::Utc::now().timestamp_millis();
    let status = state.service.status(&state.server_name, &state.version, now);
    Json(HistoryResponse {
        events,
        last_immutable_time: status.last_immutable_time,
    })
}

async fn get_status(State(state): State<AppState>) -> Json<serde_json::Value> {
    let now = chrono::Utc::now().timestamp_millis();
    let status = state.service.status(&state.server_name, &state.version, now);
    Json(serde_json::json!({
        "name": status.name,
        "version": status.version,
        "currentTime": status.current_time,
        "lastImmutableTime": status.last_immutable_time,
    }))
}
