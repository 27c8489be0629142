use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;
use serde_json::json;

use crate::error::AppResult;
use crate::indexer::{IntegrityReport, RepairSummary};
use crate::state::AppState;

/// Kick off an indexing run. Triggers arriving mid-run coalesce into one
/// follow-up run, so callers can fire freely.
pub async fn trigger_index(State(state): State<AppState>) -> Json<serde_json::Value> {
    let already = state.indexer.is_indexing();
    state.indexer.clone().trigger();
    if already {
        Json(json!({ "status": "already_indexing" }))
    } else {
        Json(json!({ "status": "indexing_started" }))
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct CheckParams {
    #[serde(default)]
    pub deep_scan: bool,
}

/// Compare filesystem vs state vs collection; deep_scan additionally scrolls
/// every point looking for orphans.
pub async fn check_index(
    State(state): State<AppState>,
    Query(params): Query<CheckParams>,
) -> AppResult<Json<IntegrityReport>> {
    let report = state.indexer.check_index(params.deep_scan).await?;
    Ok(Json(report))
}

#[derive(Debug, Deserialize)]
pub struct RepairRequest {
    pub issues: Vec<String>,
}

/// Apply fixes for issues reported by check_index and trigger a re-index.
pub async fn repair_index(
    State(state): State<AppState>,
    Json(request): Json<RepairRequest>,
) -> AppResult<Json<RepairSummary>> {
    let summary = state.indexer.clone().repair_index(&request.issues).await?;
    Ok(Json(summary))
}
