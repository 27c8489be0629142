//! Incremental State Store
//!
//! Persists indexing progress as a single JSON document under the repo's
//! `.memory/` directory, plus a derivable per-file hash sidecar for fast
//! partial reads. Writes are atomic (temp file in the same directory, fsync,
//! rename over target). Unknown schema versions and unparseable documents
//! degrade to an empty state, forcing a full re-index.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::error::{AppError, AppResult};

pub const SCHEMA_VERSION: &str = "2.0.0";

const STATE_FILE: &str = "incremental_state.json";
const METADATA_FILE: &str = "index-metadata.json";
const LOCK_FILE: &str = "indexer.lock";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    Indexed,
    Pending,
    Failed,
}

/// Per-file indexing metadata. For every record with status `indexed`, the
/// vector store holds exactly `chunk_count` points for its path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileRecord {
    pub relative_path: String,
    pub content_hash: String,
    pub last_indexed_at: DateTime<Utc>,
    pub chunk_count: usize,
    pub status: FileStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailyQuota {
    /// Local date string; the bucket resets at local midnight.
    pub date: String,
    pub chunks_consumed_today: u64,
    pub daily_limit: u64,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ScanCounters {
    pub new: usize,
    pub modified: usize,
    pub unchanged: usize,
    pub deleted: usize,
}

/// Process-wide persistent snapshot. Owned and mutated exclusively by the
/// orchestrator; everyone else sees read-only copies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncrementalState {
    pub schema_version: String,
    pub last_updated_at: DateTime<Utc>,
    pub total_files: usize,
    pub files: HashMap<String, FileRecord>,
    /// Paths deferred to a later day by daily-budget exhaustion.
    pub pending_queue: Vec<String>,
    pub daily_quota: DailyQuota,
    pub counters: ScanCounters,
}

fn local_day() -> String {
    chrono::Local::now().format("%Y-%m-%d").to_string()
}

impl IncrementalState {
    pub fn empty(daily_limit: u64) -> Self {
        Self {
            schema_version: SCHEMA_VERSION.to_string(),
            last_updated_at: Utc::now(),
            total_files: 0,
            files: HashMap::new(),
            pending_queue: Vec::new(),
            daily_quota: DailyQuota {
                date: local_day(),
                chunks_consumed_today: 0,
                daily_limit,
            },
            counters: ScanCounters::default(),
        }
    }

    /// Path → content hash map for the scanner's diff.
    pub fn hash_map(&self) -> HashMap<String, String> {
        self.files
            .iter()
            .map(|(path, record)| (path.clone(), record.content_hash.clone()))
            .collect()
    }

    /// Expected point count in the collection: the chunk total over records
    /// with status `indexed`.
    pub fn indexed_chunk_total(&self) -> u64 {
        self.files
            .values()
            .filter(|r| r.status == FileStatus::Indexed)
            .map(|r| r.chunk_count as u64)
            .sum()
    }

    pub fn indexed_file_count(&self) -> usize {
        self.files
            .values()
            .filter(|r| r.status == FileStatus::Indexed)
            .count()
    }
}

pub struct StateStore {
    dir: PathBuf,
}

impl StateStore {
    pub fn new(repo_path: &Path) -> Self {
        Self {
            dir: repo_path.join(".memory"),
        }
    }

    fn state_path(&self) -> PathBuf {
        self.dir.join(STATE_FILE)
    }

    fn metadata_path(&self) -> PathBuf {
        self.dir.join(METADATA_FILE)
    }

    /// Load persisted state, degrading to empty on any corruption or schema
    /// mismatch, and roll the daily quota bucket if the local date moved on.
    pub fn load(&self, daily_limit: u64) -> IncrementalState {
        let path = self.state_path();
        let mut state = match std::fs::read_to_string(&path) {
            Ok(json) => match serde_json::from_str::<IncrementalState>(&json) {
                Ok(state) if state.schema_version == SCHEMA_VERSION => state,
                Ok(state) => {
                    warn!(
                        found = %state.schema_version,
                        expected = SCHEMA_VERSION,
                        "unknown state schema version, forcing full re-index"
                    );
                    IncrementalState::empty(daily_limit)
                }
                Err(e) => {
                    warn!(error = %e, "state file unparseable, forcing full re-index");
                    IncrementalState::empty(daily_limit)
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("no prior state found, starting fresh");
                IncrementalState::empty(daily_limit)
            }
            Err(e) => {
                warn!(error = %e, "state file unreadable, forcing full re-index");
                IncrementalState::empty(daily_limit)
            }
        };

        let today = local_day();
        if state.daily_quota.date != today {
            info!(
                previous = %state.daily_quota.date,
                "daily quota bucket rolled over"
            );
            state.daily_quota.date = today;
            state.daily_quota.chunks_consumed_today = 0;
        }
        state.daily_quota.daily_limit = daily_limit;

        state
    }

    /// Checkpoint: atomically replace both the state document and the
    /// per-file hash sidecar.
    pub fn save(&self, state: &IncrementalState) -> AppResult<()> {
        std::fs::create_dir_all(&self.dir)?;

        let json = serde_json::to_string_pretty(state)?;
        write_atomic(&self.state_path(), json.as_bytes())?;

        let hashes: HashMap<&String, &String> = state
            .files
            .iter()
            .map(|(path, record)| (path, &record.content_hash))
            .collect();
        let metadata = serde_json::to_string_pretty(&hashes)?;
        write_atomic(&self.metadata_path(), metadata.as_bytes())?;

        Ok(())
    }

    /// One indexer process per repository. The lock file holds our pid and is
    /// removed on drop; a live foreign pid refuses startup.
    pub fn acquire_lock(&self) -> AppResult<PidLock> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.dir.join(LOCK_FILE);
        let our_pid = std::process::id();

        if let Ok(existing) = std::fs::read_to_string(&path) {
            if let Ok(pid) = existing.trim().parse::<u32>() {
                if pid != our_pid && process_alive(pid) {
                    return Err(AppError::State(format!(
                        "another indexer (pid {}) holds the lock at {}",
                        pid,
                        path.display()
                    )));
                }
            }
            warn!(path = %path.display(), "removing stale indexer lock");
        }

        std::fs::write(&path, our_pid.to_string())?;
        Ok(PidLock { path })
    }
}

pub struct PidLock {
    path: PathBuf,
}

impl Drop for PidLock {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

#[cfg(target_os = "linux")]
fn process_alive(pid: u32) -> bool {
    Path::new(&format!("/proc/{}", pid)).exists()
}

#[cfg(not(target_os = "linux"))]
fn process_alive(_pid: u32) -> bool {
    // Without a portable liveness probe, treat foreign locks as stale.
    false
}

fn write_atomic(target: &Path, bytes: &[u8]) -> AppResult<()> {
    let tmp = target.with_extension("json.tmp");
    {
        let mut file = std::fs::File::create(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
    }
    std::fs::rename(&tmp, target)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path());

        let mut state = IncrementalState::empty(500);
        state.files.insert(
            "src/main.rs".to_string(),
            FileRecord {
                relative_path: "src/main.rs".to_string(),
                content_hash: "abc123".to_string(),
                last_indexed_at: Utc::now(),
                chunk_count: 4,
                status: FileStatus::Indexed,
            },
        );
        state.total_files = 1;
        state.pending_queue.push("src/big.rs".to_string());
        store.save(&state).unwrap();

        let loaded = store.load(500);
        assert_eq!(loaded.files.len(), 1);
        assert_eq!(loaded.files["src/main.rs"].chunk_count, 4);
        assert_eq!(loaded.pending_queue, vec!["src/big.rs".to_string()]);
        assert_eq!(loaded.indexed_chunk_total(), 4);

        // Sidecar is derivable from the state document.
        let sidecar = std::fs::read_to_string(dir.path().join(".memory/index-metadata.json")).unwrap();
        let hashes: HashMap<String, String> = serde_json::from_str(&sidecar).unwrap();
        assert_eq!(hashes["src/main.rs"], "abc123");
    }

    #[test]
    fn unknown_schema_version_degrades_to_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path());

        let mut state = IncrementalState::empty(100);
        state.schema_version = "99.0.0".to_string();
        state.total_files = 7;
        store.save(&state).unwrap();

        let loaded = store.load(100);
        assert_eq!(loaded.schema_version, SCHEMA_VERSION);
        assert_eq!(loaded.total_files, 0);
        assert!(loaded.files.is_empty());
    }

    #[test]
    fn corrupt_state_degrades_to_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path());
        std::fs::create_dir_all(dir.path().join(".memory")).unwrap();
        std::fs::write(
            dir.path().join(".memory/incremental_state.json"),
            "{not json",
        )
        .unwrap();

        let loaded = store.load(100);
        assert!(loaded.files.is_empty());
    }

    #[test]
    fn stale_quota_date_resets_consumption() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path());

        let mut state = IncrementalState::empty(100);
        state.daily_quota.date = "2000-01-01".to_string();
        state.daily_quota.chunks_consumed_today = 99;
        store.save(&state).unwrap();

        let loaded = store.load(100);
        assert_eq!(loaded.daily_quota.chunks_consumed_today, 0);
        assert_ne!(loaded.daily_quota.date, "2000-01-01");
    }

    #[test]
    fn missing_state_starts_fresh() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path());
        let loaded = store.load(250);
        assert!(loaded.files.is_empty());
        assert_eq!(loaded.daily_quota.daily_limit, 250);
    }

    #[test]
    fn lock_is_reentrant_for_own_pid_and_released_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path());
        let lock_path = dir.path().join(".memory/indexer.lock");

        let lock = store.acquire_lock().unwrap();
        assert!(lock_path.exists());
        drop(lock);
        assert!(!lock_path.exists());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn live_foreign_pid_blocks_lock() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path());
        std::fs::create_dir_all(dir.path().join(".memory")).unwrap();
        // pid 1 is always alive on Linux.
        std::fs::write(dir.path().join(".memory/indexer.lock"), "1").unwrap();
        assert!(store.acquire_lock().is_err());
    }

    #[test]
    fn stale_lock_is_reclaimed() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path());
        std::fs::create_dir_all(dir.path().join(".memory")).unwrap();
        std::fs::write(dir.path().join(".memory/indexer.lock"), "999999999").unwrap();
        assert!(store.acquire_lock().is_ok());
    }
}
