//! Filesystem watcher
//!
//! External event source for the orchestrator: debounced change events on
//! the repository trigger a scan. Bursts coalesce twice — the debouncer
//! merges events inside its window, and the indexer folds triggers that
//! arrive mid-run into a single follow-up run.

use notify::RecursiveMode;
use notify_debouncer_full::{new_debouncer, DebounceEventResult, DebouncedEvent};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::config::{self, AppConfig};
use crate::indexer::IndexerService;
use crate::state::ServerEvent;

/// Minimum interval between triggers for the same file. Rapid editor saves
/// inside this window ride along with the already-queued run.
const TRIGGER_COOLDOWN_MS: u64 = 2000;

pub struct RepoWatcher {
    _debouncer: notify_debouncer_full::Debouncer<
        notify::RecommendedWatcher,
        notify_debouncer_full::RecommendedCache,
    >,
}

struct CooldownTracker {
    last_trigger: HashMap<String, Instant>,
}

impl CooldownTracker {
    fn new() -> Self {
        Self {
            last_trigger: HashMap::new(),
        }
    }

    fn should_trigger(&mut self, path: &str) -> bool {
        let now = Instant::now();
        if let Some(last) = self.last_trigger.get(path) {
            if now.duration_since(*last) < Duration::from_millis(TRIGGER_COOLDOWN_MS) {
                return false;
            }
        }
        self.last_trigger.insert(path.to_string(), now);
        true
    }

    fn cleanup_stale(&mut self) {
        let cutoff = Instant::now() - Duration::from_secs(60);
        self.last_trigger.retain(|_, v| *v > cutoff);
    }
}

/// A path is relevant when it is a supported source file outside the
/// ignored directory set.
fn is_relevant(path: &Path) -> bool {
    for component in path.components() {
        if let std::path::Component::Normal(name) = component {
            if config::DEFAULT_IGNORE_DIRS.contains(&name.to_string_lossy().as_ref()) {
                return false;
            }
        }
    }
    let ext = path
        .extension()
        .unwrap_or_default()
        .to_string_lossy()
        .to_lowercase();
    config::is_supported_extension(&ext)
}

fn classify_debounced_event(event: &DebouncedEvent) -> &'static str {
    use notify::EventKind;
    match event.kind {
        EventKind::Create(_) => "create",
        EventKind::Modify(_) => "modify",
        EventKind::Remove(_) => "remove",
        EventKind::Access(_) => "access",
        _ => "other",
    }
}

/// Start watching the repository root. The returned handle keeps the watcher
/// alive; dropping it stops watching.
pub fn start(
    config: &Arc<AppConfig>,
    indexer: Arc<IndexerService>,
    event_tx: broadcast::Sender<ServerEvent>,
) -> Result<RepoWatcher, notify::Error> {
    let repo_path = config.repo_path.clone();
    let root = repo_path.clone();
    let cooldown = Arc::new(Mutex::new(CooldownTracker::new()));
    let cleanup_counter = Arc::new(std::sync::atomic::AtomicUsize::new(0));
    let rt_handle = tokio::runtime::Handle::current();

    let mut debouncer = new_debouncer(
        Duration::from_millis(config.watcher_debounce_ms),
        None,
        move |result: DebounceEventResult| match result {
            Ok(events) => {
                let count = cleanup_counter.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                if count % 50 == 0 {
                    cooldown.lock().cleanup_stale();
                }

                // Collapse the burst to unique paths with their final event type.
                let mut file_events: HashMap<std::path::PathBuf, &'static str> = HashMap::new();
                for event in &events {
                    let change_type = classify_debounced_event(event);
                    if change_type == "access" || change_type == "other" {
                        continue;
                    }
                    for path in &event.paths {
                        if !is_relevant(path) {
                            continue;
                        }
                        file_events.insert(path.clone(), change_type);
                    }
                }

                let mut any_triggered = false;
                for (path, change_type) in file_events {
                    let relative = path
                        .strip_prefix(&root)
                        .unwrap_or(&path)
                        .to_string_lossy()
                        .replace('\\', "/");

                    if !cooldown.lock().should_trigger(&relative) {
                        continue;
                    }

                    let _ = event_tx.send(ServerEvent::FileChanged {
                        path: relative,
                        change_type: change_type.to_string(),
                    });
                    any_triggered = true;
                }

                if any_triggered {
                    let svc = indexer.clone();
                    rt_handle.spawn(async move {
                        svc.trigger();
                    });
                }
            }
            Err(errors) => {
                for e in errors {
                    warn!("file watcher error: {:?}", e);
                }
            }
        },
    )?;

    debouncer.watch(repo_path.as_path(), RecursiveMode::Recursive)?;

    info!(
        path = %repo_path.display(),
        debounce_ms = config.watcher_debounce_ms,
        "watching repository for changes"
    );
    Ok(RepoWatcher {
        _debouncer: debouncer,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ignored_directories_are_not_relevant() {
        assert!(!is_relevant(Path::new("/repo/node_modules/pkg/x.js")));
        assert!(!is_relevant(Path::new("/repo/.git/objects/ab/cd")));
        assert!(!is_relevant(Path::new("/repo/.memory/incremental_state.json")));
        assert!(is_relevant(Path::new("/repo/src/main.rs")));
    }

    #[test]
    fn unsupported_extensions_are_not_relevant() {
        assert!(!is_relevant(Path::new("/repo/image.png")));
        assert!(!is_relevant(Path::new("/repo/README.md")));
        assert!(is_relevant(Path::new("/repo/lib/util.py")));
    }

    #[test]
    fn cooldown_suppresses_rapid_repeats() {
        let mut tracker = CooldownTracker::new();
        assert!(tracker.should_trigger("src/a.rs"));
        assert!(!tracker.should_trigger("src/a.rs"));
        assert!(tracker.should_trigger("src/b.rs"));
    }
}
