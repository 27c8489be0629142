//! Status Reporter
//!
//! Pull-only observer over the orchestrator's progress. The orchestrator
//! publishes into this snapshot after each file; HTTP handlers read it
//! without ever touching orchestrator state, so there is no cycle and no
//! blocking in either direction.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crate::store::{DailyQuota, ScanCounters};

/// FIFO-evicted ring of the most recent per-file failures.
const ERROR_RING_CAP: usize = 10;

/// Smoothing factor for the per-file duration moving average.
const EWMA_ALPHA: f64 = 0.2;

#[derive(Debug, Clone, Serialize)]
pub struct RecentError {
    pub relative_path: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexPhase {
    Idle,
    Scanning,
    Categorizing,
    Embedding,
    Checkpointing,
    ShuttingDown,
}

struct Progress {
    phase: IndexPhase,
    processed: usize,
    total: usize,
    current_file: Option<String>,
    run_started_at: Option<Instant>,
    ewma_ms_per_file: Option<f64>,
    counters: ScanCounters,
    daily_quota: Option<DailyQuota>,
    pending_count: usize,
    recent_errors: VecDeque<RecentError>,
}

pub struct Reporter {
    inner: RwLock<Progress>,
}

impl Default for Reporter {
    fn default() -> Self {
        Self::new()
    }
}

impl Reporter {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Progress {
                phase: IndexPhase::Idle,
                processed: 0,
                total: 0,
                current_file: None,
                run_started_at: None,
                ewma_ms_per_file: None,
                counters: ScanCounters::default(),
                daily_quota: None,
                pending_count: 0,
                recent_errors: VecDeque::new(),
            }),
        }
    }

    pub fn phase(&self, phase: IndexPhase) {
        self.inner.write().phase = phase;
    }

    pub fn run_started(&self, total: usize) {
        let mut p = self.inner.write();
        p.processed = 0;
        p.total = total;
        p.current_file = None;
        p.run_started_at = Some(Instant::now());
    }

    pub fn set_counters(&self, counters: ScanCounters) {
        self.inner.write().counters = counters;
    }

    pub fn set_budget(&self, quota: DailyQuota, pending_count: usize) {
        let mut p = self.inner.write();
        p.daily_quota = Some(quota);
        p.pending_count = pending_count;
    }

    pub fn file_started(&self, relative_path: &str) {
        self.inner.write().current_file = Some(relative_path.to_string());
    }

    pub fn file_completed(&self, duration: Duration) {
        let mut p = self.inner.write();
        p.processed += 1;
        p.current_file = None;
        let sample = duration.as_secs_f64() * 1000.0;
        p.ewma_ms_per_file = Some(match p.ewma_ms_per_file {
            Some(prev) => EWMA_ALPHA * sample + (1.0 - EWMA_ALPHA) * prev,
            None => sample,
        });
    }

    pub fn record_error(&self, relative_path: &str, message: &str) {
        let mut p = self.inner.write();
        if p.recent_errors.len() == ERROR_RING_CAP {
            p.recent_errors.pop_front();
        }
        p.recent_errors.push_back(RecentError {
            relative_path: relative_path.to_string(),
            message: message.to_string(),
            timestamp: Utc::now(),
        });
    }

    pub fn run_finished(&self) {
        let mut p = self.inner.write();
        p.phase = IndexPhase::Idle;
        p.current_file = None;
    }

    pub fn snapshot(&self, verbose: bool) -> StatusSnapshot {
        let p = self.inner.read();
        let elapsed = p
            .run_started_at
            .map(|t| t.elapsed())
            .unwrap_or(Duration::ZERO);
        let elapsed_secs = elapsed.as_secs_f64();

        let percent = if p.total == 0 {
            100.0
        } else {
            (p.processed as f64 / p.total as f64) * 100.0
        };

        let files_per_sec = if elapsed_secs > 0.0 && p.processed > 0 {
            p.processed as f64 / elapsed_secs
        } else {
            0.0
        };

        let eta_seconds = match (p.ewma_ms_per_file, p.total.checked_sub(p.processed)) {
            (Some(ms), Some(remaining)) if remaining > 0 && p.phase != IndexPhase::Idle => {
                Some((ms * remaining as f64 / 1000.0).ceil() as u64)
            }
            _ => None,
        };

        StatusSnapshot {
            is_indexing: p.phase != IndexPhase::Idle,
            phase: p.phase,
            processed: p.processed,
            total: p.total,
            current_file: p.current_file.clone(),
            percent,
            eta_seconds,
            files_per_sec,
            avg_ms_per_file: p.ewma_ms_per_file,
            elapsed_seconds: elapsed.as_secs(),
            counters: p.counters,
            daily_quota: p.daily_quota.clone(),
            pending_count: p.pending_count,
            recent_error_count: p.recent_errors.len(),
            recent_errors: if verbose {
                Some(p.recent_errors.iter().cloned().collect())
            } else {
                None
            },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub is_indexing: bool,
    pub phase: IndexPhase,
    pub processed: usize,
    pub total: usize,
    pub current_file: Option<String>,
    pub percent: f64,
    pub eta_seconds: Option<u64>,
    pub files_per_sec: f64,
    pub avg_ms_per_file: Option<f64>,
    pub elapsed_seconds: u64,
    pub counters: ScanCounters,
    pub daily_quota: Option<DailyQuota>,
    pub pending_count: usize,
    pub recent_error_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recent_errors: Option<Vec<RecentError>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ewma_smooths_per_file_durations() {
        let r = Reporter::new();
        r.run_started(10);
        r.file_completed(Duration::from_millis(100));
        assert_eq!(r.snapshot(false).avg_ms_per_file, Some(100.0));

        r.file_completed(Duration::from_millis(200));
        // 0.2 * 200 + 0.8 * 100 = 120
        let avg = r.snapshot(false).avg_ms_per_file.unwrap();
        assert!((avg - 120.0).abs() < 1e-6);
    }

    #[test]
    fn eta_uses_remaining_files() {
        let r = Reporter::new();
        r.phase(IndexPhase::Embedding);
        r.run_started(4);
        r.file_completed(Duration::from_millis(1000));
        let snap = r.snapshot(false);
        // 3 remaining at ~1s each.
        assert_eq!(snap.eta_seconds, Some(3));
        assert_eq!(snap.processed, 1);
    }

    #[test]
    fn error_ring_caps_at_ten_with_fifo_eviction() {
        let r = Reporter::new();
        for i in 0..12 {
            r.record_error(&format!("file{}.rs", i), "boom");
        }
        let snap = r.snapshot(true);
        let errors = snap.recent_errors.unwrap();
        assert_eq!(errors.len(), 10);
        assert_eq!(errors[0].relative_path, "file2.rs");
        assert_eq!(errors[9].relative_path, "file11.rs");
    }

    #[test]
    fn non_verbose_snapshot_omits_ring_but_counts_it() {
        let r = Reporter::new();
        r.record_error("a.rs", "x");
        let snap = r.snapshot(false);
        assert!(snap.recent_errors.is_none());
        assert_eq!(snap.recent_error_count, 1);
    }

    #[test]
    fn idle_reporter_reads_as_complete() {
        let r = Reporter::new();
        let snap = r.snapshot(false);
        assert!(!snap.is_indexing);
        assert_eq!(snap.percent, 100.0);
        assert_eq!(snap.eta_seconds, None);
    }
}
