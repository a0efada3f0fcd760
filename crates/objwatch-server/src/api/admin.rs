//! Read-only views and dedup maintenance

use axum::{
    extract::{Path, State},
    Json,
};
use objwatch_common::types::ObjectId;
use serde::Serialize;
use serde_json::{json, Value};

use super::response::ApiResponse;
use super::AppState;
use crate::db::StoreRecord;
use crate::error::{AppError, AppResult};
use crate::pipeline::StatsSnapshot;

/// Store reachability
pub async fn health(State(state): State<AppState>) -> AppResult<Json<Value>> {
    state.store.ping().await?;
    Ok(Json(json!({ "status": "ok", "store": "reachable" })))
}

#[derive(Debug, Serialize)]
pub struct StatsView {
    #[serde(flatten)]
    pub counters: StatsSnapshot,
    pub tracked_identifiers: usize,
}

pub async fn stats(State(state): State<AppState>) -> ApiResponse<StatsView> {
    ApiResponse::success(StatsView {
        counters: state.stats.snapshot(),
        tracked_identifiers: state.identifiers.len(),
    })
}

pub async fn list_objects(
    State(state): State<AppState>,
) -> AppResult<ApiResponse<Vec<StoreRecord>>> {
    let records = state.store.list().await?;
    Ok(ApiResponse::success(records))
}

pub async fn clear_identifiers(State(state): State<AppState>) -> ApiResponse<Value> {
    let cleared = state.identifiers.clear();
    tracing::info!(cleared, "Identifier set cleared");
    ApiResponse::success(json!({ "cleared": cleared }))
}

pub async fn forget_identifier(
    State(state): State<AppState>,
    Path(raw): Path<String>,
) -> AppResult<ApiResponse<Value>> {
    let id: ObjectId = raw.parse()?;
    if !state.identifiers.forget(id) {
        return Err(AppError::NotFound(format!("object {} is not tracked", id)));
    }
    tracing::info!(object_id = %id, "Identifier released");
    Ok(ApiResponse::success(json!({ "forgotten": id })))
}
