//! Vector Store Adapter
//!
//! REST adapter for a Qdrant-style vector database: collection lifecycle,
//! point upserts, deletion by file path, similarity search, and the scroll /
//! count primitives the integrity checker uses.
//!
//! Point ids are deterministic UUIDs derived from the chunk identity, so
//! re-embedding a chunk overwrites its previous vector in place. Search
//! scores are cosine similarity as returned by the store: in [-1, 1],
//! effectively [0, 1] for natural text embeddings, higher is better.

use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::{Digest, Sha256};
use std::time::Duration;
use tracing::info;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::error::{AppError, AppResult};

/// Rough wire size of one point, used for storage estimates in status
/// reports (float32 vector + payload overhead at 768 dims).
pub const ESTIMATED_BYTES_PER_POINT: u64 = 3584;

/// Payload stored with every point. Field names are part of the wire format
/// and must not change across versions.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PointPayload {
    pub relative_path: String,
    pub kind: String,
    pub name: String,
    pub start_line: usize,
    pub end_line: usize,
    pub language: String,
    pub content_snippet: String,
    pub file_hash: String,
    pub chunk_ordinal: usize,
}

#[derive(Debug, Clone)]
pub struct VectorPoint {
    pub id: Uuid,
    pub vector: Vec<f32>,
    pub payload: PointPayload,
}

#[derive(Debug, Clone)]
pub struct ScoredPoint {
    pub id: String,
    pub score: f32,
    pub payload: PointPayload,
}

#[derive(Debug, Clone)]
pub struct RetrievedPoint {
    pub id: String,
    pub payload: PointPayload,
}

#[derive(Debug, Clone, Default)]
pub struct SearchFilter {
    pub kind: Option<String>,
    pub language: Option<String>,
}

impl SearchFilter {
    fn is_empty(&self) -> bool {
        self.kind.is_none() && self.language.is_none()
    }

    fn to_qdrant(&self) -> serde_json::Value {
        let mut must = Vec::new();
        if let Some(kind) = &self.kind {
            must.push(json!({"key": "kind", "match": {"value": kind}}));
        }
        if let Some(language) = &self.language {
            must.push(json!({"key": "language", "match": {"value": language}}));
        }
        json!({ "must": must })
    }
}

/// Deterministic point id: first 16 bytes of SHA-256 over
/// `<relativePath>#<startLine>#<ordinal>`.
pub fn point_id(relative_path: &str, start_line: usize, ordinal: usize) -> Uuid {
    let mut hasher = Sha256::new();
    hasher.update(format!("{}#{}#{}", relative_path, start_line, ordinal).as_bytes());
    let digest = hasher.finalize();
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&digest[..16]);
    Uuid::from_bytes(bytes)
}

pub struct VectorStore {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    collection: String,
    dimension: usize,
}

impl VectorStore {
    pub fn new(config: &AppConfig) -> AppResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| AppError::Configuration(format!("vector store HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: config.vector_url.clone(),
            api_key: config.vector_api_key.clone(),
            collection: config.collection.clone(),
            dimension: config.dimension,
        })
    }

    pub fn collection_name(&self) -> &str {
        &self.collection
    }

    fn url(&self, suffix: &str) -> String {
        format!(
            "{}/collections/{}{}",
            self.base_url, self.collection, suffix
        )
    }

    async fn check(&self, response: reqwest::Response, context: &str) -> AppResult<serde_json::Value> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::VectorStore(format!(
                "{} failed ({}): {}",
                context,
                status,
                body.chars().take(200).collect::<String>()
            )));
        }
        response
            .json()
            .await
            .map_err(|e| AppError::VectorStore(format!("{}: malformed response: {}", context, e)))
    }

    /// Dimension of the existing collection, or None if it does not exist.
    pub async fn collection_dimension(&self) -> AppResult<Option<usize>> {
        let response = self
            .http
            .get(self.url(""))
            .header("api-key", &self.api_key)
            .send()
            .await?;

        if response.status().as_u16() == 404 {
            return Ok(None);
        }
        let body = self.check(response, "get collection").await?;
        let size = body["result"]["config"]["params"]["vectors"]["size"]
            .as_u64()
            .ok_or_else(|| {
                AppError::VectorStore("collection info missing vector size".to_string())
            })?;
        Ok(Some(size as usize))
    }

    /// Idempotent. Creates the collection (cosine distance) with keyword
    /// payload indexes on relativePath, kind, and language. An existing
    /// collection with a different dimension is a recognizable failure the
    /// caller interprets as "rebuild required".
    pub async fn ensure_collection(&self) -> AppResult<()> {
        match self.collection_dimension().await? {
            Some(existing) if existing == self.dimension => Ok(()),
            Some(existing) => Err(AppError::DimensionMismatch {
                collection: self.collection.clone(),
                expected: self.dimension,
                actual: existing,
            }),
            None => {
                info!(
                    collection = %self.collection,
                    dimension = self.dimension,
                    "creating vector collection"
                );
                let response = self
                    .http
                    .put(self.url(""))
                    .header("api-key", &self.api_key)
                    .json(&json!({
                        "vectors": { "size": self.dimension, "distance": "Cosine" }
                    }))
                    .send()
                    .await?;
                self.check(response, "create collection").await?;

                for field in ["relativePath", "kind", "language"] {
                    let response = self
                        .http
                        .put(self.url("/index?wait=true"))
                        .header("api-key", &self.api_key)
                        .json(&json!({
                            "field_name": field,
                            "field_schema": "keyword"
                        }))
                        .send()
                        .await?;
                    self.check(response, "create payload index").await?;
                }
                Ok(())
            }
        }
    }

    /// Atomic per-batch upsert; points with existing ids are replaced.
    pub async fn upsert_batch(&self, points: &[VectorPoint]) -> AppResult<()> {
        if points.is_empty() {
            return Ok(());
        }
        let body = json!({
            "points": points
                .iter()
                .map(|p| json!({
                    "id": p.id.to_string(),
                    "vector": p.vector,
                    "payload": p.payload,
                }))
                .collect::<Vec<_>>()
        });

        let response = self
            .http
            .put(self.url("/points?wait=true"))
            .header("api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;
        self.check(response, "upsert points").await?;
        Ok(())
    }

    /// Remove every point whose payload path equals the given value.
    pub async fn delete_by_path(&self, relative_path: &str) -> AppResult<()> {
        let response = self
            .http
            .post(self.url("/points/delete?wait=true"))
            .header("api-key", &self.api_key)
            .json(&json!({
                "filter": {
                    "must": [{ "key": "relativePath", "match": { "value": relative_path } }]
                }
            }))
            .send()
            .await?;
        self.check(response, "delete points by path").await?;
        Ok(())
    }

    /// Top-k by cosine similarity, strictly non-increasing score; ties break
    /// by ascending point id.
    pub async fn search(
        &self,
        query_vector: &[f32],
        k: usize,
        filter: Option<SearchFilter>,
    ) -> AppResult<Vec<ScoredPoint>> {
        let mut body = json!({
            "vector": query_vector,
            "limit": k,
            "with_payload": true,
        });
        if let Some(filter) = filter.filter(|f| !f.is_empty()) {
            body["filter"] = filter.to_qdrant();
        }

        let response = self
            .http
            .post(self.url("/points/search"))
            .header("api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;
        let value = self.check(response, "search points").await?;

        let mut points = parse_scored_points(&value)?;
        sort_scored(&mut points);
        Ok(points)
    }

    /// Page through all points; used by deep integrity scans.
    pub async fn scroll(
        &self,
        cursor: Option<String>,
        page_size: usize,
    ) -> AppResult<(Vec<RetrievedPoint>, Option<String>)> {
        let mut body = json!({
            "limit": page_size,
            "with_payload": true,
        });
        if let Some(offset) = cursor {
            body["offset"] = json!(offset);
        }

        let response = self
            .http
            .post(self.url("/points/scroll"))
            .header("api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;
        let value = self.check(response, "scroll points").await?;

        let mut points = Vec::new();
        if let Some(raw) = value["result"]["points"].as_array() {
            for item in raw {
                let payload: PointPayload = serde_json::from_value(item["payload"].clone())
                    .map_err(|e| {
                        AppError::VectorStore(format!("scroll payload malformed: {}", e))
                    })?;
                points.push(RetrievedPoint {
                    id: point_id_string(&item["id"]),
                    payload,
                });
            }
        }
        let next = match &value["result"]["next_page_offset"] {
            serde_json::Value::Null => None,
            other => Some(point_id_string(other)),
        };
        Ok((points, next))
    }

    /// Exact point count for status reporting and drift checks.
    pub async fn points_count(&self) -> AppResult<u64> {
        let response = self
            .http
            .post(self.url("/points/count"))
            .header("api-key", &self.api_key)
            .json(&json!({ "exact": true }))
            .send()
            .await?;
        let value = self.check(response, "count points").await?;
        value["result"]["count"]
            .as_u64()
            .ok_or_else(|| AppError::VectorStore("count missing from response".to_string()))
    }
}

/// Qdrant point ids arrive as strings or integers depending on how they were
/// written; normalize to a string.
fn point_id_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn parse_scored_points(value: &serde_json::Value) -> AppResult<Vec<ScoredPoint>> {
    let mut points = Vec::new();
    if let Some(raw) = value["result"].as_array() {
        for item in raw {
            let payload: PointPayload = serde_json::from_value(item["payload"].clone())
                .map_err(|e| AppError::VectorStore(format!("search payload malformed: {}", e)))?;
            let score = item["score"].as_f64().unwrap_or(0.0) as f32;
            points.push(ScoredPoint {
                id: point_id_string(&item["id"]),
                score,
                payload,
            });
        }
    }
    Ok(points)
}

fn sort_scored(points: &mut [ScoredPoint]) {
    points.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.id.cmp(&b.id))
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn point_ids_are_deterministic_and_distinct() {
        let a1 = point_id("src/a.py", 1, 0);
        let a2 = point_id("src/a.py", 1, 0);
        assert_eq!(a1, a2);

        assert_ne!(point_id("src/a.py", 1, 0), point_id("src/a.py", 1, 1));
        assert_ne!(point_id("src/a.py", 1, 0), point_id("src/b.py", 1, 0));
        assert_ne!(point_id("src/a.py", 1, 0), point_id("src/a.py", 11, 0));
    }

    #[test]
    fn payload_serializes_with_wire_field_names() {
        let payload = PointPayload {
            relative_path: "src/a.py".to_string(),
            kind: "function".to_string(),
            name: "alpha".to_string(),
            start_line: 1,
            end_line: 10,
            language: "python".to_string(),
            content_snippet: "def alpha(): ...".to_string(),
            file_hash: "abc".to_string(),
            chunk_ordinal: 0,
        };
        let json = serde_json::to_value(&payload).unwrap();
        for key in [
            "relativePath",
            "kind",
            "name",
            "startLine",
            "endLine",
            "language",
            "contentSnippet",
            "fileHash",
            "chunkOrdinal",
        ] {
            assert!(json.get(key).is_some(), "missing wire key {}", key);
        }
    }

    #[test]
    fn search_results_sort_by_score_then_id() {
        let payload = PointPayload {
            relative_path: "x".to_string(),
            kind: "other".to_string(),
            name: "anonymous".to_string(),
            start_line: 1,
            end_line: 1,
            language: "plaintext".to_string(),
            content_snippet: String::new(),
            file_hash: String::new(),
            chunk_ordinal: 0,
        };
        let mut points = vec![
            ScoredPoint { id: "b".into(), score: 0.5, payload: payload.clone() },
            ScoredPoint { id: "a".into(), score: 0.5, payload: payload.clone() },
            ScoredPoint { id: "c".into(), score: 0.9, payload: payload.clone() },
        ];
        sort_scored(&mut points);
        let order: Vec<&str> = points.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(order, vec!["c", "a", "b"]);
    }

    #[test]
    fn search_response_parses_qdrant_shape() {
        let raw = serde_json::json!({
            "result": [{
                "id": "3fa85f64-5717-4562-b3fc-2c963f66afa6",
                "score": 0.87,
                "payload": {
                    "relativePath": "src/a.py",
                    "kind": "function",
                    "name": "alpha",
                    "startLine": 1,
                    "endLine": 10,
                    "language": "python",
                    "contentSnippet": "def alpha(): ...",
                    "fileHash": "abc",
                    "chunkOrdinal": 0
                }
            }]
        });
        let points = parse_scored_points(&raw).unwrap();
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].payload.name, "alpha");
        assert!((points[0].score - 0.87).abs() < 1e-6);
    }
}
