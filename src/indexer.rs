//! Indexer Orchestrator
//!
//! Coordinates scan → categorize → chunk → embed → upsert, owns all mutation
//! of the incremental state, checkpoints every few files, and enforces the
//! daily chunk budget. A single orchestrator instance runs per collection;
//! parallelism lives inside the embedding client.
//!
//! Failure discipline: per-chunk embedding failures drop that chunk's point
//! and the file still counts as indexed when at least half its chunks made
//! it. Majority failures, double upsert failures, and mid-file budget
//! cutoffs mark the file failed with an empty stored hash so the next run
//! re-classifies it as modified and retries.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

use crate::chunker::{self, CodeChunk};
use crate::config::AppConfig;
use crate::embedder::EmbeddingClient;
use crate::error::{AppError, AppResult};
use crate::reporter::{IndexPhase, Reporter};
use crate::scanner::{ScanOutcome, Scanner};
use crate::state::ServerEvent;
use crate::store::{FileRecord, FileStatus, IncrementalState, ScanCounters, StateStore};
use crate::vector::{self, PointPayload, VectorPoint, VectorStore};

/// Snippets stored in point payloads are capped at this many chars; the
/// query path applies its own display cap on top.
const PAYLOAD_SNIPPET_CHARS: usize = 1000;

/// Collection drift tolerance: ± this many points per indexed file.
const DRIFT_TOLERANCE_PER_FILE: u64 = 1;

/// Page size for deep integrity scrolls.
const SCROLL_PAGE: usize = 256;

pub struct IndexerService {
    config: Arc<AppConfig>,
    scanner: Arc<Scanner>,
    embedder: Arc<EmbeddingClient>,
    vectors: Arc<VectorStore>,
    state_store: Arc<StateStore>,
    reporter: Arc<Reporter>,
    event_tx: broadcast::Sender<ServerEvent>,
    /// Orchestrator-owned; held for the duration of a run.
    state: tokio::sync::Mutex<IncrementalState>,
    is_indexing: AtomicBool,
    /// Set by the watcher while a run is active; drained at run end.
    rescan_requested: AtomicBool,
    cancel: AtomicBool,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct IndexIssue {
    /// Stable id, e.g. `missing:src/a.py`; feed back into repair_index.
    pub id: String,
    pub kind: String,
    pub relative_path: String,
    pub detail: String,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct IntegrityReport {
    pub issues: Vec<IndexIssue>,
    pub files_in_state: usize,
    pub points_in_collection: u64,
    pub deep_scanned: bool,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct RepairSummary {
    pub orphans_removed: usize,
    pub requeued: usize,
    pub triggered: bool,
}

/// Work-list order: modified files first, then the carried-over pending
/// queue, then new files. Entries deduplicate; pending paths missing from
/// the current scan are dropped.
fn build_work_list(
    modified: &[String],
    pending: Vec<String>,
    new: &[String],
    still_present: &HashSet<&String>,
) -> Vec<String> {
    let mut work = Vec::new();
    let mut queued: HashSet<String> = HashSet::new();

    for path in modified {
        if queued.insert(path.clone()) {
            work.push(path.clone());
        }
    }
    for path in pending {
        if still_present.contains(&path) && queued.insert(path.clone()) {
            work.push(path);
        }
    }
    for path in new {
        if queued.insert(path.clone()) {
            work.push(path.clone());
        }
    }
    work
}

fn fits_budget(estimate: u64, consumed: u64, limit: u64) -> bool {
    consumed + estimate <= limit
}

impl IndexerService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: Arc<AppConfig>,
        scanner: Scanner,
        embedder: Arc<EmbeddingClient>,
        vectors: Arc<VectorStore>,
        state_store: Arc<StateStore>,
        reporter: Arc<Reporter>,
        event_tx: broadcast::Sender<ServerEvent>,
        initial_state: IncrementalState,
    ) -> Self {
        Self {
            config,
            scanner: Arc::new(scanner),
            embedder,
            vectors,
            state_store,
            reporter,
            event_tx,
            state: tokio::sync::Mutex::new(initial_state),
            is_indexing: AtomicBool::new(false),
            rescan_requested: AtomicBool::new(false),
            cancel: AtomicBool::new(false),
        }
    }

    pub fn is_indexing(&self) -> bool {
        self.is_indexing.load(Ordering::Acquire)
    }

    /// Kick off an indexing run in the background. While a run is active,
    /// triggers coalesce into a single follow-up run.
    pub fn trigger(self: Arc<Self>) {
        if self
            .is_indexing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            self.rescan_requested.store(true, Ordering::SeqCst);
            return;
        }

        let svc = self.clone();
        tokio::spawn(async move {
            loop {
                if let Err(e) = svc.run_once().await {
                    error!(error = %e, "indexing run failed");
                    let _ = svc.event_tx.send(ServerEvent::IndexingError {
                        error: e.to_string(),
                    });
                }
                if svc.cancel.load(Ordering::Relaxed)
                    || !svc.rescan_requested.swap(false, Ordering::SeqCst)
                {
                    break;
                }
            }
            svc.reporter.run_finished();
            svc.is_indexing.store(false, Ordering::Release);
        });
    }

    /// Request shutdown: cancel the active run, wait for it to drain, and
    /// write a final checkpoint.
    pub async fn shutdown(&self) {
        self.cancel.store(true, Ordering::SeqCst);
        for _ in 0..100 {
            if !self.is_indexing() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        let state = self.state.lock().await;
        if let Err(e) = self.state_store.save(&state) {
            warn!(error = %e, "final checkpoint failed");
        } else {
            info!("final checkpoint written");
        }
    }

    async fn run_once(&self) -> AppResult<()> {
        let run_started = Instant::now();
        let mut state = self.state.lock().await;

        roll_daily_quota(&mut state);

        // Verify the collection is still what the state believes it is
        // before trusting any incremental shortcut.
        self.verify_collection(&mut state).await?;

        self.reporter.phase(IndexPhase::Scanning);
        let outcome = self.scan(state.hash_map()).await?;

        self.reporter.phase(IndexPhase::Categorizing);
        state.counters = ScanCounters {
            new: outcome.new.len(),
            modified: outcome.modified.len(),
            unchanged: outcome.unchanged.len(),
            deleted: outcome.deleted.len(),
        };
        self.reporter.set_counters(state.counters);
        info!(
            new = outcome.new.len(),
            modified = outcome.modified.len(),
            unchanged = outcome.unchanged.len(),
            deleted = outcome.deleted.len(),
            failed = outcome.failed.len(),
            "scan categorized"
        );

        for path in &outcome.deleted {
            match self.vectors.delete_by_path(path).await {
                Ok(()) => {
                    state.files.remove(path);
                }
                Err(e) => {
                    // Keep the record; the path stays in the deleted set on
                    // the next run and deletion is retried then.
                    warn!(path = %path, error = %e, "failed to delete points for removed file");
                    self.reporter.record_error(path, "failed to delete points");
                }
            }
        }

        for path in &outcome.failed {
            if let Some(record) = state.files.get_mut(path) {
                record.status = FileStatus::Failed;
            }
            self.reporter.record_error(path, "file unreadable during scan");
        }

        let still_present: HashSet<&String> = outcome.hashes.keys().collect();
        let pending = std::mem::take(&mut state.pending_queue);
        let work = build_work_list(&outcome.modified, pending, &outcome.new, &still_present);
        state.total_files = outcome.hashes.len();

        self.reporter.phase(IndexPhase::Embedding);
        self.reporter.run_started(work.len());
        self.reporter
            .set_budget(state.daily_quota.clone(), state.pending_queue.len());
        let _ = self
            .event_tx
            .send(ServerEvent::IndexingStarted { total: work.len() });

        let mut deferred: Vec<String> = Vec::new();
        let mut since_checkpoint = 0usize;
        let mut processed = 0usize;

        for path in &work {
            if self.cancel.load(Ordering::Relaxed) {
                self.reporter.phase(IndexPhase::ShuttingDown);
                break;
            }

            let estimate = state
                .files
                .get(path)
                .map(|r| r.chunk_count.max(1) as u64)
                .unwrap_or(1);
            if !fits_budget(
                estimate,
                state.daily_quota.chunks_consumed_today,
                state.daily_quota.daily_limit,
            ) {
                // A cheaper file later in the list may still fit.
                deferred.push(path.clone());
                continue;
            }

            let file_started = Instant::now();
            self.reporter.file_started(path);
            self.index_file(path, &outcome.hashes, &mut state).await;
            processed += 1;
            self.reporter.file_completed(file_started.elapsed());
            self.reporter
                .set_budget(state.daily_quota.clone(), deferred.len());
            let _ = self.event_tx.send(ServerEvent::IndexingProgress {
                processed,
                total: work.len(),
                current_file: path.clone(),
            });

            since_checkpoint += 1;
            if since_checkpoint >= self.config.checkpoint_interval {
                self.reporter.phase(IndexPhase::Checkpointing);
                self.checkpoint(&mut state)?;
                since_checkpoint = 0;
                self.reporter.phase(IndexPhase::Embedding);
            }
        }

        if !deferred.is_empty() {
            info!(
                deferred = deferred.len(),
                consumed = state.daily_quota.chunks_consumed_today,
                limit = state.daily_quota.daily_limit,
                "daily budget exhausted, files deferred to pending queue"
            );
        }
        state.pending_queue = deferred;

        self.reporter.phase(IndexPhase::Checkpointing);
        self.checkpoint(&mut state)?;
        self.reporter
            .set_budget(state.daily_quota.clone(), state.pending_queue.len());
        self.reporter.run_finished();

        let duration_ms = run_started.elapsed().as_millis() as u64;
        let _ = self.event_tx.send(ServerEvent::IndexingCompleted {
            processed,
            pending: state.pending_queue.len(),
            duration_ms,
        });
        info!(
            processed,
            pending = state.pending_queue.len(),
            duration_ms,
            "indexing run complete"
        );
        Ok(())
    }

    async fn scan(&self, previous: HashMap<String, String>) -> AppResult<ScanOutcome> {
        let scanner = self.scanner.clone();
        tokio::task::spawn_blocking(move || scanner.scan(&previous))
            .await
            .map_err(|e| AppError::Internal(anyhow::anyhow!("scan task panicked: {}", e)))
    }

    /// Detect collection drift: a deleted or truncated collection, or one
    /// whose point count disagrees with the state beyond tolerance, discards
    /// the state so everything re-indexes as new.
    async fn verify_collection(&self, state: &mut IncrementalState) -> AppResult<()> {
        if state.files.is_empty() {
            return Ok(());
        }

        match self.vectors.collection_dimension().await? {
            None => {
                warn!("vector collection missing, discarding state for full rebuild");
                self.vectors.ensure_collection().await?;
                *state = IncrementalState::empty(self.config.daily_limit);
            }
            Some(dim) if dim != self.config.dimension => {
                return Err(AppError::DimensionMismatch {
                    collection: self.vectors.collection_name().to_string(),
                    expected: self.config.dimension,
                    actual: dim,
                });
            }
            Some(_) => {
                let count = self.vectors.points_count().await?;
                let expected = state.indexed_chunk_total();
                let tolerance = state.indexed_file_count() as u64 * DRIFT_TOLERANCE_PER_FILE;
                if count.abs_diff(expected) > tolerance {
                    warn!(
                        points = count,
                        expected,
                        tolerance,
                        "collection drift detected, discarding state for full rebuild"
                    );
                    *state = IncrementalState::empty(self.config.daily_limit);
                }
            }
        }
        Ok(())
    }

    /// Index one file: chunk, delete prior points, embed, upsert, update the
    /// record. Failures are recorded in state and the error ring; they never
    /// abort the run.
    async fn index_file(
        &self,
        path: &str,
        hashes: &HashMap<String, String>,
        state: &mut IncrementalState,
    ) {
        let absolute = self.config.repo_path.join(path);
        let content = match tokio::fs::read_to_string(&absolute).await {
            Ok(content) => content,
            Err(e) => {
                warn!(path = %path, error = %e, "file unreadable, marking failed");
                self.mark_failed(state, path, "file unreadable");
                return;
            }
        };

        let extension = absolute
            .extension()
            .unwrap_or_default()
            .to_string_lossy()
            .to_lowercase();
        let language = crate::lang::detect_language(&extension);
        let chunks = chunker::chunk_file(&content, language, path);
        let file_hash = hashes.get(path).cloned().unwrap_or_default();

        let prior = state.files.get(path).map(|r| r.status);

        // Conservative rule: a previously known file always gets its old
        // points removed first, so stale vectors from shifted chunk
        // boundaries can never linger.
        if prior.is_some() {
            let mut deleted = false;
            for _ in 0..2 {
                match self.vectors.delete_by_path(path).await {
                    Ok(()) => {
                        deleted = true;
                        break;
                    }
                    Err(e) => warn!(path = %path, error = %e, "delete before re-upsert failed"),
                }
            }
            if !deleted {
                self.mark_failed(state, path, "failed to clear prior points");
                return;
            }
        }

        if chunks.is_empty() {
            // Blank file: indexed with zero chunks.
            state.files.insert(
                path.to_string(),
                FileRecord {
                    relative_path: path.to_string(),
                    content_hash: file_hash,
                    last_indexed_at: Utc::now(),
                    chunk_count: 0,
                    status: FileStatus::Indexed,
                },
            );
            return;
        }

        // The daily budget may cut the file short; chunks beyond the
        // remaining allowance are never sent.
        let remaining = state
            .daily_quota
            .daily_limit
            .saturating_sub(state.daily_quota.chunks_consumed_today);
        let allowed = (remaining as usize).min(chunks.len());
        let budget_cut = allowed < chunks.len();

        let texts: Vec<String> = chunks[..allowed]
            .iter()
            .map(|c| c.content.clone())
            .collect();
        let embeddings = self.embedder.embed_many(&texts, &self.cancel).await;
        state.daily_quota.chunks_consumed_today += allowed as u64;

        let mut points = Vec::new();
        for (chunk, embedding) in chunks[..allowed].iter().zip(embeddings) {
            if let Some(vector) = embedding {
                points.push(build_point(chunk, vector, &file_hash));
            }
        }

        if budget_cut {
            // Not a provider failure; the file re-enters as modified on the
            // next run (its stored hash stays empty) and re-embeds whole.
            warn!(
                path = %path,
                embedded = points.len(),
                total = chunks.len(),
                "daily budget exhausted mid-file"
            );
            self.mark_failed(state, path, "daily budget exhausted mid-file");
            return;
        }

        if points.len() * 2 < chunks.len() {
            warn!(
                path = %path,
                succeeded = points.len(),
                total = chunks.len(),
                "majority of chunks failed to embed"
            );
            self.mark_failed(state, path, "majority of chunks failed to embed");
            return;
        }

        // All-or-nothing per file: one upsert batch, retried once.
        let mut upserted = false;
        for attempt in 0..2 {
            match self.vectors.upsert_batch(&points).await {
                Ok(()) => {
                    upserted = true;
                    break;
                }
                Err(e) => warn!(path = %path, attempt, error = %e, "upsert failed"),
            }
        }
        if !upserted {
            self.mark_failed(state, path, "upsert failed twice");
            return;
        }

        state.files.insert(
            path.to_string(),
            FileRecord {
                relative_path: path.to_string(),
                content_hash: file_hash,
                last_indexed_at: Utc::now(),
                chunk_count: points.len(),
                status: FileStatus::Indexed,
            },
        );
    }

    /// Record a file-level failure. The stored hash is cleared so the next
    /// scan re-classifies the file as modified and retries it.
    fn mark_failed(&self, state: &mut IncrementalState, path: &str, reason: &str) {
        state.files.insert(
            path.to_string(),
            FileRecord {
                relative_path: path.to_string(),
                content_hash: String::new(),
                last_indexed_at: Utc::now(),
                chunk_count: 0,
                status: FileStatus::Failed,
            },
        );
        self.reporter.record_error(path, reason);
    }

    fn checkpoint(&self, state: &mut IncrementalState) -> AppResult<()> {
        state.last_updated_at = Utc::now();
        // Inability to persist state is fatal; it would silently undo
        // crash-recovery guarantees.
        self.state_store.save(state)
    }

    /// Compare filesystem vs state vs collection. `deep` additionally
    /// scrolls every point and flags orphans whose payload references paths
    /// absent from state.
    pub async fn check_index(&self, deep: bool) -> AppResult<IntegrityReport> {
        let state = self
            .state
            .try_lock()
            .map_err(|_| AppError::IndexerBusy)?;

        let outcome = self.scan(state.hash_map()).await?;
        let mut issues = Vec::new();

        for path in &outcome.new {
            issues.push(IndexIssue {
                id: format!("missing:{}", path),
                kind: "missing".to_string(),
                relative_path: path.clone(),
                detail: "file on disk but absent from the index".to_string(),
            });
        }
        for path in &outcome.modified {
            issues.push(IndexIssue {
                id: format!("drift:{}", path),
                kind: "stale_hash".to_string(),
                relative_path: path.clone(),
                detail: "file content changed since it was indexed".to_string(),
            });
        }
        for path in &outcome.deleted {
            issues.push(IndexIssue {
                id: format!("stale:{}", path),
                kind: "stale_record".to_string(),
                relative_path: path.clone(),
                detail: "state references a file missing on disk".to_string(),
            });
        }

        let points_in_collection = self.vectors.points_count().await?;
        let expected = state.indexed_chunk_total();
        let tolerance = state.indexed_file_count() as u64 * DRIFT_TOLERANCE_PER_FILE;
        if points_in_collection.abs_diff(expected) > tolerance {
            issues.push(IndexIssue {
                id: format!("count:{}", self.vectors.collection_name()),
                kind: "count_drift".to_string(),
                relative_path: String::new(),
                detail: format!(
                    "collection holds {} points, state expects {} (±{})",
                    points_in_collection, expected, tolerance
                ),
            });
        }

        if deep {
            let mut orphan_paths: HashSet<String> = HashSet::new();
            let mut cursor = None;
            loop {
                let (points, next) = self.vectors.scroll(cursor, SCROLL_PAGE).await?;
                for point in points {
                    if !state.files.contains_key(&point.payload.relative_path) {
                        orphan_paths.insert(point.payload.relative_path);
                    }
                }
                match next {
                    Some(next) => cursor = Some(next),
                    None => break,
                }
            }
            let mut orphans: Vec<String> = orphan_paths.into_iter().collect();
            orphans.sort();
            for path in orphans {
                issues.push(IndexIssue {
                    id: format!("orphan:{}", path),
                    kind: "orphan".to_string(),
                    relative_path: path.clone(),
                    detail: "points reference a path not present in state".to_string(),
                });
            }
        }

        Ok(IntegrityReport {
            files_in_state: state.files.len(),
            points_in_collection,
            deep_scanned: deep,
            issues,
        })
    }

    /// Apply fixes for issues reported by check_index: orphaned and stale
    /// points are deleted, missing/drifted files are dropped from state and
    /// re-indexed by the run this triggers.
    pub async fn repair_index(self: Arc<Self>, issue_ids: &[String]) -> AppResult<RepairSummary> {
        let mut orphans_removed = 0usize;
        let mut requeued = 0usize;

        {
            let mut state = self
                .state
                .try_lock()
                .map_err(|_| AppError::IndexerBusy)?;

            for issue in issue_ids {
                if let Some(path) = issue.strip_prefix("orphan:") {
                    self.vectors.delete_by_path(path).await?;
                    orphans_removed += 1;
                } else if let Some(path) = issue.strip_prefix("stale:") {
                    self.vectors.delete_by_path(path).await?;
                    state.files.remove(path);
                    orphans_removed += 1;
                } else if let Some(path) = issue
                    .strip_prefix("missing:")
                    .or_else(|| issue.strip_prefix("drift:"))
                {
                    // Dropping the record makes the next scan classify the
                    // file as new and re-embed it.
                    state.files.remove(path);
                    requeued += 1;
                } else if issue.starts_with("count:") {
                    *state = IncrementalState::empty(self.config.daily_limit);
                    requeued += 1;
                }
            }
            self.state_store.save(&state)?;
        }

        self.trigger();
        Ok(RepairSummary {
            orphans_removed,
            requeued,
            triggered: true,
        })
    }

    /// Read-only view of the daily quota and pending queue for status
    /// composition; None while a run holds the state.
    pub fn queue_snapshot(&self) -> Option<(usize, u64, u64)> {
        self.state.try_lock().ok().map(|state| {
            (
                state.pending_queue.len(),
                state.daily_quota.chunks_consumed_today,
                state.daily_quota.daily_limit,
            )
        })
    }
}

fn roll_daily_quota(state: &mut IncrementalState) {
    let today = chrono::Local::now().format("%Y-%m-%d").to_string();
    if state.daily_quota.date != today {
        info!(previous = %state.daily_quota.date, "daily quota bucket rolled over");
        state.daily_quota.date = today;
        state.daily_quota.chunks_consumed_today = 0;
    }
}

fn build_point(chunk: &CodeChunk, vector_values: Vec<f32>, file_hash: &str) -> VectorPoint {
    let snippet: String = chunk
        .content
        .chars()
        .take(PAYLOAD_SNIPPET_CHARS)
        .collect();
    VectorPoint {
        id: vector::point_id(&chunk.relative_path, chunk.start_line, ordinal_of(chunk)),
        vector: vector_values,
        payload: PointPayload {
            relative_path: chunk.relative_path.clone(),
            kind: chunk.kind.as_str().to_string(),
            name: chunk.name.clone(),
            start_line: chunk.start_line,
            end_line: chunk.end_line,
            language: chunk.language.clone(),
            content_snippet: snippet,
            file_hash: file_hash.to_string(),
            chunk_ordinal: ordinal_of(chunk),
        },
    }
}

/// The ordinal is the trailing component of the chunk id.
fn ordinal_of(chunk: &CodeChunk) -> usize {
    chunk
        .id
        .rsplit(':')
        .next()
        .and_then(|s| s.parse().ok())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn work_list_orders_modified_then_pending_then_new() {
        let modified = strings(&["m1.rs", "m2.rs"]);
        let pending = strings(&["p1.rs", "p2.rs"]);
        let new = strings(&["n1.rs"]);
        let all = strings(&["m1.rs", "m2.rs", "p1.rs", "p2.rs", "n1.rs"]);
        let present: HashSet<&String> = all.iter().collect();

        let work = build_work_list(&modified, pending, &new, &present);
        assert_eq!(work, strings(&["m1.rs", "m2.rs", "p1.rs", "p2.rs", "n1.rs"]));
    }

    #[test]
    fn work_list_deduplicates_pending_entries() {
        let modified = strings(&["a.rs"]);
        // a.rs was deferred last run and also shows up as modified now.
        let pending = strings(&["a.rs", "b.rs"]);
        let new = strings(&["b.rs", "c.rs"]);
        let all = strings(&["a.rs", "b.rs", "c.rs"]);
        let present: HashSet<&String> = all.iter().collect();

        let work = build_work_list(&modified, pending, &new, &present);
        assert_eq!(work, strings(&["a.rs", "b.rs", "c.rs"]));
    }

    #[test]
    fn work_list_drops_pending_files_no_longer_on_disk() {
        let pending = strings(&["gone.rs", "kept.rs"]);
        let all = strings(&["kept.rs"]);
        let present: HashSet<&String> = all.iter().collect();

        let work = build_work_list(&[], pending, &[], &present);
        assert_eq!(work, strings(&["kept.rs"]));
    }

    #[test]
    fn budget_precheck_uses_estimate() {
        assert!(fits_budget(1, 0, 3));
        assert!(fits_budget(3, 0, 3));
        assert!(!fits_budget(1, 3, 3));
        assert!(!fits_budget(5, 2, 3));
    }

    #[test]
    fn ordinal_parses_from_chunk_id() {
        let chunk = CodeChunk {
            id: "src/a.py:11:3".to_string(),
            content: String::new(),
            kind: crate::chunker::ChunkKind::Function,
            name: "gamma".to_string(),
            relative_path: "src/a.py".to_string(),
            start_line: 11,
            end_line: 20,
            language: "python".to_string(),
            imports: vec![],
            complexity: 1,
            truncated: false,
        };
        assert_eq!(ordinal_of(&chunk), 3);
    }

    #[test]
    fn point_ids_follow_chunk_identity() {
        let chunk = CodeChunk {
            id: "src/a.py:1:0".to_string(),
            content: "def alpha(): pass".to_string(),
            kind: crate::chunker::ChunkKind::Function,
            name: "alpha".to_string(),
            relative_path: "src/a.py".to_string(),
            start_line: 1,
            end_line: 10,
            language: "python".to_string(),
            imports: vec![],
            complexity: 1,
            truncated: false,
        };
        let point = build_point(&chunk, vec![0.0; 4], "hash");
        assert_eq!(point.id, vector::point_id("src/a.py", 1, 0));
        assert_eq!(point.payload.chunk_ordinal, 0);
        assert_eq!(point.payload.file_hash, "hash");
    }
}
