use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;
use serde_json::json;

use crate::error::AppResult;
use crate::state::AppState;
use crate::vector::ESTIMATED_BYTES_PER_POINT;

#[derive(Debug, Deserialize)]
pub struct StatusParams {
    #[serde(default)]
    pub verbose: bool,
}

/// Composite status: indexing progress, quota usage, and storage footprint.
/// `verbose=true` includes the full recent-errors ring.
pub async fn status(
    State(state): State<AppState>,
    Query(params): Query<StatusParams>,
) -> AppResult<Json<serde_json::Value>> {
    let progress = state.reporter.snapshot(params.verbose);
    let quota = state.governor.snapshot();

    // Point count is best-effort; status must not fail when the store is
    // briefly unreachable.
    let points = state.vectors.points_count().await.unwrap_or(0);

    let queue = state.indexer.queue_snapshot().map(|(pending, consumed, limit)| {
        json!({
            "pending_files": pending,
            "chunks_consumed_today": consumed,
            "daily_limit": limit,
        })
    });

    Ok(Json(json!({
        "progress": progress,
        "quota": quota,
        "storage": {
            "points": points,
            "estimated_bytes": points * ESTIMATED_BYTES_PER_POINT,
        },
        "queue": queue,
        "collection": state.config.collection,
        "model": state.config.model.name,
        "dimension": state.config.dimension,
    })))
}
