use axum::{extract::State, Json};

use crate::error::AppResult;
use crate::search::{search_codebase, SearchQuery, SearchResponse};
use crate::state::AppState;

/// Semantic search over the indexed codebase. Query validation (empty,
/// over-long) happens in the query path itself.
pub async fn search(
    State(state): State<AppState>,
    Json(query): Json<SearchQuery>,
) -> AppResult<Json<SearchResponse>> {
    let response = search_codebase(&state.embedder, &state.vectors, &query).await?;
    Ok(Json(response))
}
