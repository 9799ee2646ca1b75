//! Management API handlers.
//!
//! Register, inspect, and remove mock calls, list the registry, and reload
//! it from the mock-calls folder.

use crate::config::MANAGEMENT_API_NAME;
use crate::error::{ServerError, ServerResult};
use crate::model::{MockApiCall, MockApiCallDto};
use crate::server::{base_url, AppState};
use axum::extract::{Path, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::info;

/// Register a mock call, generating an id when the body carries none.
pub async fn register_call(
    State(state): State<Arc<AppState>>,
    Json(dto): Json<MockApiCallDto>,
) -> ServerResult<impl IntoResponse> {
    register(&state, dto)
}

/// Register a mock call under the id from the path. The path id wins over
/// any id in the body, and an existing call with that id is replaced.
pub async fn register_call_with_id(
    State(state): State<Arc<AppState>>,
    Path(call_id): Path<String>,
    Json(mut dto): Json<MockApiCallDto>,
) -> ServerResult<impl IntoResponse> {
    dto.call_id = Some(call_id);
    register(&state, dto)
}

fn register(state: &AppState, dto: MockApiCallDto) -> ServerResult<impl IntoResponse> {
    dto.validate()
        .map_err(|e| ServerError::InvalidCall(e.to_string()))?;
    let call = state.registry.add(dto.into_call(Utc::now()));
    info!(call_id = %call.call_id, route = %call.route_key(), "Registered a mock call");
    Ok((StatusCode::CREATED, Json(json!({ "id": call.call_id }))))
}

/// Fetch a registered mock call by id.
pub async fn get_call(
    State(state): State<Arc<AppState>>,
    Path(call_id): Path<String>,
) -> ServerResult<Json<Value>> {
    let call = state.registry.get(&call_id).ok_or(ServerError::NotFound)?;
    Ok(Json(serde_json::to_value(&*call)?))
}

/// Remove a registered mock call by id.
pub async fn delete_call(
    State(state): State<Arc<AppState>>,
    Path(call_id): Path<String>,
) -> ServerResult<Json<Value>> {
    let call = state
        .registry
        .remove(&call_id)
        .ok_or(ServerError::NotFound)?;
    info!(call_id = %call.call_id, "Removed a mock call");
    Ok(Json(json!({ "id": call.call_id })))
}

/// List every non-expired mock call, grouped api -> path -> METHOD.
pub async fn list_calls(State(state): State<Arc<AppState>>) -> ServerResult<Json<Value>> {
    let calls = state.registry.list_all(Utc::now());
    Ok(Json(group_calls(&calls)?))
}

/// Clear the registry and reload it from the mock-calls folder.
pub async fn reset(State(state): State<Arc<AppState>>) -> ServerResult<impl IntoResponse> {
    state.registry.clear();
    let summary = state.loader.load(&state.registry).await;
    info!(
        loaded = summary.loaded,
        skipped = summary.skipped,
        "Reset the registry from the mock-calls folder"
    );
    Ok(Json(summary))
}

/// Serve the embedded management API definition.
pub async fn swagger_json(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    let base = base_url(&headers, &state.config);
    match state.specs.get_swagger_json(&base, MANAGEMENT_API_NAME).await {
        Some(json) => ([(CONTENT_TYPE, "application/json")], json).into_response(),
        None => (StatusCode::NOT_FOUND, String::new()).into_response(),
    }
}

fn group_calls(calls: &[Arc<MockApiCall>]) -> ServerResult<Value> {
    let mut result = Map::new();
    for call in calls {
        let api = result
            .entry(call.api_name.clone())
            .or_insert_with(|| Value::Object(Map::new()));
        let Value::Object(paths) = api else { continue };
        let path = paths
            .entry(call.api_path.clone())
            .or_insert_with(|| Value::Object(Map::new()));
        let Value::Object(methods) = path else { continue };
        let list = methods
            .entry(call.method.to_uppercase())
            .or_insert_with(|| Value::Array(Vec::new()));
        let Value::Array(list) = list else { continue };
        list.push(serde_json::to_value(&**call)?);
    }
    Ok(Value::Object(result))
}
