//! Query Path
//!
//! Embeds a query string with the retrieval-query task hint, searches the
//! vector collection, and shapes results for callers: payload metadata plus
//! a display snippet. Scores are passed through unchanged from the store
//! (cosine similarity, higher is better).

use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::config::MAX_SEARCH_QUERY_LENGTH;
use crate::embedder::{EmbeddingClient, TaskHint};
use crate::error::{AppError, AppResult};
use crate::vector::{ScoredPoint, SearchFilter, VectorStore};

pub const DEFAULT_LIMIT: usize = 5;
pub const MAX_LIMIT: usize = 100;

/// Display cap applied to snippets after blank-line trimming.
const SNIPPET_MAX_CHARS: usize = 400;

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub query: String,
    pub k: Option<usize>,
    /// Optional payload filters (chunk kind, language tag).
    pub kind: Option<String>,
    pub language: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub relative_path: String,
    pub start_line: usize,
    pub end_line: usize,
    pub kind: String,
    pub name: String,
    pub language: String,
    /// Cosine similarity as returned by the vector store: in [-1, 1],
    /// effectively [0, 1] for natural text; higher is better.
    pub score: f32,
    pub snippet: String,
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub results: Vec<SearchHit>,
    pub query_time_ms: u64,
}

/// Clamp the requested result count into [1, MAX_LIMIT], defaulting to 5.
fn effective_k(requested: Option<usize>) -> usize {
    requested.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)
}

/// Trim leading and trailing blank lines, then cap at the display size on a
/// char boundary.
fn shape_snippet(content: &str) -> String {
    let lines: Vec<&str> = content.lines().collect();
    let first = lines.iter().position(|l| !l.trim().is_empty());
    let last = lines.iter().rposition(|l| !l.trim().is_empty());

    let trimmed = match (first, last) {
        (Some(first), Some(last)) => lines[first..=last].join("\n"),
        _ => return String::new(),
    };

    if trimmed.chars().count() <= SNIPPET_MAX_CHARS {
        trimmed
    } else {
        trimmed.chars().take(SNIPPET_MAX_CHARS).collect()
    }
}

fn hit_from_point(point: ScoredPoint) -> SearchHit {
    SearchHit {
        relative_path: point.payload.relative_path,
        start_line: point.payload.start_line,
        end_line: point.payload.end_line,
        kind: point.payload.kind,
        name: point.payload.name,
        language: point.payload.language,
        score: point.score,
        snippet: shape_snippet(&point.payload.content_snippet),
    }
}

/// Semantic search over the indexed codebase. An empty query is an input
/// error; an empty result set is not.
pub async fn search_codebase(
    embedder: &EmbeddingClient,
    vectors: &VectorStore,
    query: &SearchQuery,
) -> AppResult<SearchResponse> {
    if query.query.trim().is_empty() {
        return Err(AppError::BadRequest(
            "search query must not be empty".to_string(),
        ));
    }
    if query.query.len() > MAX_SEARCH_QUERY_LENGTH {
        return Err(AppError::BadRequest(format!(
            "search query too long ({} chars, max {})",
            query.query.len(),
            MAX_SEARCH_QUERY_LENGTH
        )));
    }

    let start = Instant::now();
    let k = effective_k(query.k);

    let vector = embedder.embed_one(&query.query, TaskHint::Query).await?;
    let filter = SearchFilter {
        kind: query.kind.clone(),
        language: query.language.clone(),
    };
    let points = vectors.search(&vector, k, Some(filter)).await?;

    Ok(SearchResponse {
        results: points.into_iter().map(hit_from_point).collect(),
        query_time_ms: start.elapsed().as_millis() as u64,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn k_clamps_into_range() {
        assert_eq!(effective_k(None), 5);
        assert_eq!(effective_k(Some(0)), 1);
        assert_eq!(effective_k(Some(50)), 50);
        assert_eq!(effective_k(Some(10_000)), 100);
    }

    #[test]
    fn snippet_trims_blank_lines() {
        let content = "\n\n  \nfn main() {\n    println!(\"hi\");\n}\n\n";
        let snippet = shape_snippet(content);
        assert!(snippet.starts_with("fn main()"));
        assert!(snippet.ends_with('}'));
    }

    #[test]
    fn snippet_caps_at_display_size() {
        let content = "x".repeat(2000);
        let snippet = shape_snippet(&content);
        assert_eq!(snippet.chars().count(), 400);
    }

    #[test]
    fn blank_only_content_yields_empty_snippet() {
        assert_eq!(shape_snippet("\n   \n\t\n"), "");
    }
}
