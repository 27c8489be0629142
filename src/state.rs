use std::sync::Arc;
use tokio::sync::broadcast;

use crate::config::AppConfig;
use crate::embedder::EmbeddingClient;
use crate::error::AppResult;
use crate::governor::RateGovernor;
use crate::indexer::IndexerService;
use crate::reporter::Reporter;
use crate::scanner::Scanner;
use crate::store::{PidLock, StateStore};
use crate::vector::VectorStore;

/// Events broadcast to all connected WebSocket clients
#[derive(Debug, Clone, serde::Serialize)]
#[serde(tag = "type", content = "data")]
pub enum ServerEvent {
    #[serde(rename = "index_started")]
    IndexingStarted { total: usize },
    #[serde(rename = "index_progress")]
    IndexingProgress {
        processed: usize,
        total: usize,
        current_file: String,
    },
    #[serde(rename = "index_complete")]
    IndexingCompleted {
        processed: usize,
        pending: usize,
        duration_ms: u64,
    },
    #[serde(rename = "index_error")]
    IndexingError { error: String },
    #[serde(rename = "file_changed")]
    FileChanged { path: String, change_type: String },
}

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub indexer: Arc<IndexerService>,
    pub embedder: Arc<EmbeddingClient>,
    pub vectors: Arc<VectorStore>,
    pub reporter: Arc<Reporter>,
    pub governor: Arc<RateGovernor>,
    pub event_tx: broadcast::Sender<ServerEvent>,
    /// One indexer process per repository; released on drop at exit.
    _lock: Arc<PidLock>,
}

impl AppState {
    /// Wire up every component. Fails fast on configuration problems, a held
    /// repository lock, or an unreachable/incompatible vector collection.
    pub async fn new(config: AppConfig) -> AppResult<Self> {
        let config = Arc::new(config);
        let (event_tx, _) = broadcast::channel(1024);

        let state_store = Arc::new(StateStore::new(&config.repo_path));
        let lock = Arc::new(state_store.acquire_lock()?);
        let initial_state = state_store.load(config.daily_limit);

        let governor = Arc::new(RateGovernor::new(&config.model));
        let embedder = Arc::new(EmbeddingClient::new(&config, governor.clone())?);
        let vectors = Arc::new(VectorStore::new(&config)?);
        vectors.ensure_collection().await?;

        let scanner = Scanner::new(&config)?;
        let reporter = Arc::new(Reporter::new());

        let indexer = Arc::new(IndexerService::new(
            config.clone(),
            scanner,
            embedder.clone(),
            vectors.clone(),
            state_store,
            reporter.clone(),
            event_tx.clone(),
            initial_state,
        ));

        Ok(Self {
            config,
            indexer,
            embedder,
            vectors,
            reporter,
            governor,
            event_tx,
            _lock: lock,
        })
    }
}
