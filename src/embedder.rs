//! Embedding Client
//!
//! Calls the remote embedding provider's `embedContent` REST endpoint.
//! Execution shape is selected by the model profile: high-RPM models run
//! batches of requests concurrently and pace per second; low-RPM models run
//! one request at a time with a fixed gap. Every request gates through the
//! shared rate governor first.
//!
//! Transient failures (throttling, 5xx, timeouts) retry with exponential
//! backoff; exhaustion and permanent failures surface as `None` per chunk so
//! the orchestrator can decide what to requeue.

use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::config::{AppConfig, ExecutionProfile};
use crate::error::{AppError, AppResult};
use crate::governor::{estimate_tokens, RateGovernor};

/// Gap between successive requests on the serial profile.
const SERIAL_GAP: Duration = Duration::from_millis(1500);

/// Parallel batches are paced to at most one batch per second.
const BATCH_PACE: Duration = Duration::from_secs(1);

const BACKOFF_CAP: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskHint {
    Document,
    Query,
}

impl TaskHint {
    fn as_str(&self) -> &'static str {
        match self {
            TaskHint::Document => "RETRIEVAL_DOCUMENT",
            TaskHint::Query => "RETRIEVAL_QUERY",
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EmbedRequest<'a> {
    model: String,
    content: ContentBody<'a>,
    task_type: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    output_dimensionality: Option<usize>,
}

#[derive(Serialize)]
struct ContentBody<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct EmbedResponse {
    embedding: EmbeddingValues,
}

#[derive(Deserialize)]
struct EmbeddingValues {
    values: Vec<f32>,
}

enum RequestFailure {
    /// Throttling, 5xx, timeouts and transport errors.
    Retryable(String),
    /// Other 4xx and malformed responses; never retried.
    Permanent(String),
}

pub struct EmbeddingClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model_name: String,
    dimension: usize,
    execution: ExecutionProfile,
    batch_size: usize,
    governor: Arc<RateGovernor>,
}

impl EmbeddingClient {
    pub fn new(config: &AppConfig, governor: Arc<RateGovernor>) -> AppResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| AppError::Configuration(format!("embedding HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: config.embed_base_url.trim_end_matches('/').to_string(),
            api_key: config.embed_api_key.clone(),
            model_name: config.model.name.to_string(),
            dimension: config.dimension,
            execution: config.model.execution,
            batch_size: config.batch_size.max(1),
            governor,
        })
    }

    /// Output dimension of the configured model; the vector store adapter
    /// uses this to create collections correctly.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    fn backoff_schedule(&self) -> (Duration, u32) {
        match self.execution {
            ExecutionProfile::Parallel => (Duration::from_secs(2), 3),
            ExecutionProfile::Serial => (Duration::from_secs(5), 5),
        }
    }

    async fn request(&self, text: &str, hint: TaskHint) -> Result<Vec<f32>, RequestFailure> {
        let estimated = estimate_tokens(text);
        self.governor.acquire(estimated).await;

        let url = format!(
            "{}/v1beta/models/{}:embedContent",
            self.base_url, self.model_name
        );
        let body = EmbedRequest {
            model: format!("models/{}", self.model_name),
            content: ContentBody {
                parts: vec![Part { text }],
            },
            task_type: hint.as_str(),
            output_dimensionality: Some(self.dimension),
        };

        let response = self
            .http
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| RequestFailure::Retryable(format!("transport: {}", e)))?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(RequestFailure::Retryable("throttled (429)".to_string()));
        }
        if status.is_server_error() {
            return Err(RequestFailure::Retryable(format!("server error {}", status)));
        }
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            // Some providers signal quota exhaustion through 403 bodies.
            if detail.contains("RESOURCE_EXHAUSTED") || detail.contains("quota") {
                return Err(RequestFailure::Retryable(format!("quota ({})", status)));
            }
            return Err(RequestFailure::Permanent(format!(
                "{}: {}",
                status,
                detail.chars().take(200).collect::<String>()
            )));
        }

        let parsed: EmbedResponse = response
            .json()
            .await
            .map_err(|e| RequestFailure::Permanent(format!("malformed response: {}", e)))?;

        if parsed.embedding.values.len() != self.dimension {
            return Err(RequestFailure::Permanent(format!(
                "dimension mismatch: got {}, expected {}",
                parsed.embedding.values.len(),
                self.dimension
            )));
        }

        self.governor.record(estimated);
        Ok(parsed.embedding.values)
    }

    /// Retry loop around one request. Returns None on permanent failure or
    /// retry exhaustion; cancellation aborts between attempts.
    async fn embed_with_retry(
        &self,
        text: &str,
        hint: TaskHint,
        cancel: &AtomicBool,
    ) -> Option<Vec<f32>> {
        let (base_delay, max_retries) = self.backoff_schedule();
        let mut delay = base_delay;

        for attempt in 0..=max_retries {
            if cancel.load(Ordering::Relaxed) {
                return None;
            }
            match self.request(text, hint).await {
                Ok(vector) => return Some(vector),
                Err(RequestFailure::Permanent(msg)) => {
                    warn!(error = %msg, "embedding request failed permanently");
                    return None;
                }
                Err(RequestFailure::Retryable(msg)) => {
                    if attempt == max_retries {
                        warn!(
                            error = %msg,
                            attempts = max_retries + 1,
                            "embedding retries exhausted"
                        );
                        return None;
                    }
                    debug!(error = %msg, delay_ms = delay.as_millis() as u64, "retrying embedding");
                    tokio::time::sleep(delay).await;
                    delay = (delay * 2).min(BACKOFF_CAP);
                }
            }
        }
        None
    }

    /// Embed a single text, propagating failure. Used by the query path with
    /// the query task hint.
    pub async fn embed_one(&self, text: &str, hint: TaskHint) -> AppResult<Vec<f32>> {
        if text.trim().is_empty() {
            return Err(AppError::BadRequest("text must not be empty".to_string()));
        }
        let cancel = AtomicBool::new(false);
        self.embed_with_retry(text, hint, &cancel)
            .await
            .ok_or_else(|| AppError::Provider("embedding failed after retries".to_string()))
    }

    /// Embed many texts with the document task hint, preserving input order.
    /// Failed entries are None; the caller decides whether to requeue.
    pub async fn embed_many(
        &self,
        texts: &[String],
        cancel: &AtomicBool,
    ) -> Vec<Option<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());

        match self.execution {
            ExecutionProfile::Parallel => {
                let mut remaining = texts.len();
                for batch in texts.chunks(self.batch_size) {
                    if cancel.load(Ordering::Relaxed) {
                        results.extend(batch.iter().map(|_| None));
                        remaining -= batch.len();
                        continue;
                    }
                    let started = Instant::now();
                    let futures = batch
                        .iter()
                        .map(|text| self.embed_with_retry(text, TaskHint::Document, cancel));
                    results.extend(join_all(futures).await);
                    remaining -= batch.len();

                    // Pace: at most one full batch per second.
                    if remaining > 0 {
                        let elapsed = started.elapsed();
                        if elapsed < BATCH_PACE {
                            tokio::time::sleep(BATCH_PACE - elapsed).await;
                        }
                    }
                }
            }
            ExecutionProfile::Serial => {
                for (i, text) in texts.iter().enumerate() {
                    if cancel.load(Ordering::Relaxed) {
                        results.push(None);
                        continue;
                    }
                    if i > 0 {
                        tokio::time::sleep(SERIAL_GAP).await;
                    }
                    results.push(self.embed_with_retry(text, TaskHint::Document, cancel).await);
                }
            }
        }

        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_hints_map_to_provider_strings() {
        assert_eq!(TaskHint::Document.as_str(), "RETRIEVAL_DOCUMENT");
        assert_eq!(TaskHint::Query.as_str(), "RETRIEVAL_QUERY");
    }

    #[test]
    fn request_body_uses_provider_field_names() {
        let body = EmbedRequest {
            model: "models/text-embedding-004".to_string(),
            content: ContentBody {
                parts: vec![Part { text: "fn main() {}" }],
            },
            task_type: TaskHint::Document.as_str(),
            output_dimensionality: Some(768),
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["taskType"], "RETRIEVAL_DOCUMENT");
        assert_eq!(json["outputDimensionality"], 768);
        assert_eq!(json["content"]["parts"][0]["text"], "fn main() {}");
    }

    #[test]
    fn output_dimensionality_is_omitted_when_unset() {
        let body = EmbedRequest {
            model: "models/text-embedding-004".to_string(),
            content: ContentBody {
                parts: vec![Part { text: "x" }],
            },
            task_type: TaskHint::Query.as_str(),
            output_dimensionality: None,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert!(json.get("outputDimensionality").is_none());
    }

    #[test]
    fn response_parsing_extracts_values() {
        let raw = r#"{"embedding": {"values": [0.1, -0.25, 0.5]}}"#;
        let parsed: EmbedResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.embedding.values, vec![0.1, -0.25, 0.5]);
    }
}
