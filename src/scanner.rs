//! File Scanner & Change Detector
//!
//! Walks the repository, applies ignore rules, computes streaming SHA-256
//! content hashes in parallel, and diffs the result against the previously
//! persisted hash map into four disjoint sets: new, modified, unchanged,
//! deleted. Deterministic across runs on an unchanging tree.

use globset::{Glob, GlobSet, GlobSetBuilder};
use ignore::WalkBuilder;
use rayon::prelude::*;
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::config::{self, AppConfig};
use crate::error::{AppError, AppResult};

/// Leading window sniffed for NUL bytes to detect binary files.
const BINARY_SNIFF_BYTES: usize = 8 * 1024;

/// Streaming hash read size; huge files are never loaded whole.
const HASH_READ_BYTES: usize = 64 * 1024;

#[derive(Debug, Default)]
pub struct ScanOutcome {
    pub new: Vec<String>,
    pub modified: Vec<String>,
    pub unchanged: Vec<String>,
    pub deleted: Vec<String>,
    /// Files that errored during hashing; their previous records are retained.
    pub failed: Vec<String>,
    /// Content hash for every successfully hashed file in this scan.
    pub hashes: HashMap<String, String>,
}

pub struct Scanner {
    root: PathBuf,
    user_ignores: GlobSet,
    max_file_size: u64,
}

impl Scanner {
    pub fn new(config: &AppConfig) -> AppResult<Self> {
        let mut builder = GlobSetBuilder::new();
        for pattern in &config.ignore_paths {
            let glob = Glob::new(pattern).map_err(|e| {
                AppError::Configuration(format!("invalid IGNORE_PATHS pattern '{}': {}", pattern, e))
            })?;
            builder.add(glob);
        }
        let user_ignores = builder
            .build()
            .map_err(|e| AppError::Configuration(format!("IGNORE_PATHS: {}", e)))?;

        Ok(Self {
            root: config.repo_path.clone(),
            user_ignores,
            max_file_size: config.max_file_size_bytes,
        })
    }

    /// Walk the repository and diff against the previous path → hash map.
    /// Never aborts on per-file IO errors; the resulting sets are sorted.
    pub fn scan(&self, previous: &HashMap<String, String>) -> ScanOutcome {
        let paths = self.collect_files();

        let hashed: Vec<(String, std::io::Result<Option<String>>)> = paths
            .par_iter()
            .map(|path| {
                let relative = self.relative(path);
                (relative, hash_file(path, self.max_file_size))
            })
            .collect();

        let mut outcome = ScanOutcome::default();
        let mut seen: HashSet<String> = HashSet::new();

        for (relative, result) in hashed {
            match result {
                Ok(Some(hash)) => {
                    seen.insert(relative.clone());
                    match previous.get(&relative) {
                        None => outcome.new.push(relative.clone()),
                        Some(prev) if *prev != hash => outcome.modified.push(relative.clone()),
                        Some(_) => outcome.unchanged.push(relative.clone()),
                    }
                    outcome.hashes.insert(relative, hash);
                }
                Ok(None) => {
                    // Binary or oversized: invisible to the index. A previous
                    // record for it will fall out through the deleted set.
                    debug!(path = %relative, "skipping binary or oversized file");
                }
                Err(e) => {
                    warn!(path = %relative, error = %e, "failed to hash file");
                    if previous.contains_key(&relative) {
                        seen.insert(relative.clone());
                        outcome.failed.push(relative);
                    }
                }
            }
        }

        for prev_path in previous.keys() {
            if !seen.contains(prev_path) {
                outcome.deleted.push(prev_path.clone());
            }
        }

        outcome.new.sort();
        outcome.modified.sort();
        outcome.unchanged.sort();
        outcome.deleted.sort();
        outcome.failed.sort();
        outcome
    }

    /// Collect candidate source files under the permitted extension set,
    /// deduplicated by canonical path so symlink aliases appear once.
    fn collect_files(&self) -> Vec<PathBuf> {
        let user_ignores = self.user_ignores.clone();
        let root = self.root.clone();

        let walker = WalkBuilder::new(&self.root)
            .hidden(false)
            .git_ignore(true)
            .git_global(true)
            .git_exclude(true)
            .follow_links(true)
            .max_depth(Some(20))
            .filter_entry(move |entry| {
                if entry.file_type().is_some_and(|ft| ft.is_dir()) {
                    let name = entry.file_name().to_string_lossy();
                    if config::DEFAULT_IGNORE_DIRS.contains(&name.as_ref()) {
                        return false;
                    }
                    if user_ignores.is_match(name.as_ref()) {
                        return false;
                    }
                    if let Ok(rel) = entry.path().strip_prefix(&root) {
                        if user_ignores.is_match(rel) {
                            return false;
                        }
                    }
                }
                true
            })
            .build();

        let mut canonical_seen: HashSet<PathBuf> = HashSet::new();
        let mut files = Vec::new();

        for entry in walker.filter_map(|e| e.ok()) {
            if !entry.file_type().is_some_and(|ft| ft.is_file()) {
                continue;
            }
            let path = entry.path();
            let ext = path
                .extension()
                .unwrap_or_default()
                .to_string_lossy()
                .to_lowercase();
            if !config::is_supported_extension(&ext) {
                continue;
            }
            // Symlink cycle / alias guard: each canonical target is visited once.
            let canonical = dunce::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
            if !canonical_seen.insert(canonical) {
                continue;
            }
            files.push(entry.into_path());
        }

        files.sort();
        files
    }

    fn relative(&self, path: &Path) -> String {
        path.strip_prefix(&self.root)
            .unwrap_or(path)
            .to_string_lossy()
            .replace('\\', "/")
    }
}

/// Streaming SHA-256 over raw file bytes. Returns Ok(None) for binary or
/// oversized files. The first 8 KiB are sniffed for NUL bytes before the
/// rest of the file is fed to the digest.
fn hash_file(path: &Path, max_file_size: u64) -> std::io::Result<Option<String>> {
    let metadata = std::fs::metadata(path)?;
    if metadata.len() > max_file_size {
        return Ok(None);
    }

    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();

    let mut sniff = vec![0u8; BINARY_SNIFF_BYTES];
    let mut sniffed = 0usize;
    while sniffed < BINARY_SNIFF_BYTES {
        let n = file.read(&mut sniff[sniffed..])?;
        if n == 0 {
            break;
        }
        sniffed += n;
    }
    if sniff[..sniffed].contains(&0) {
        return Ok(None);
    }
    hasher.update(&sniff[..sniffed]);

    let mut buf = vec![0u8; HASH_READ_BYTES];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    Ok(Some(format!("{:x}", hasher.finalize())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{model_profile, AppConfig};

    fn test_config(root: &Path) -> AppConfig {
        AppConfig {
            repo_path: root.to_path_buf(),
            embed_api_key: "k".into(),
            embed_base_url: "http://localhost".into(),
            vector_url: "http://localhost:6333".into(),
            vector_api_key: "k".into(),
            collection: "test".into(),
            model: model_profile("text-embedding-004").unwrap(),
            dimension: 768,
            watch_mode: false,
            batch_size: 25,
            daily_limit: 1000,
            ignore_paths: vec!["generated".into()],
            listen_addr: "127.0.0.1:0".into(),
            max_file_size_bytes: 1024 * 1024,
            checkpoint_interval: 10,
            watcher_debounce_ms: 500,
            request_timeout_secs: 30,
        }
    }

    #[test]
    fn categorizes_new_modified_unchanged_deleted() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.py"), "def alpha():\n    pass\n").unwrap();
        std::fs::write(dir.path().join("b.ts"), "export function beta() {}\n").unwrap();

        let scanner = Scanner::new(&test_config(dir.path())).unwrap();
        let first = scanner.scan(&HashMap::new());
        assert_eq!(first.new, vec!["a.py".to_string(), "b.ts".to_string()]);
        assert!(first.modified.is_empty());
        assert!(first.deleted.is_empty());

        // Unchanged tree: everything classifies as unchanged.
        let second = scanner.scan(&first.hashes);
        assert!(second.new.is_empty());
        assert_eq!(second.unchanged.len(), 2);

        // Modify one file, delete the other.
        std::fs::write(dir.path().join("a.py"), "def alpha():\n    return 1\n").unwrap();
        std::fs::remove_file(dir.path().join("b.ts")).unwrap();
        let third = scanner.scan(&first.hashes);
        assert_eq!(third.modified, vec!["a.py".to_string()]);
        assert_eq!(third.deleted, vec!["b.ts".to_string()]);
        assert!(third.unchanged.is_empty());
    }

    #[test]
    fn skips_binary_and_unsupported_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("blob.rs"), b"\x00\x01\x02binary").unwrap();
        std::fs::write(dir.path().join("readme.md"), "# docs\n").unwrap();
        std::fs::write(dir.path().join("ok.rs"), "fn main() {}\n").unwrap();

        let scanner = Scanner::new(&test_config(dir.path())).unwrap();
        let outcome = scanner.scan(&HashMap::new());
        assert_eq!(outcome.new, vec!["ok.rs".to_string()]);
    }

    #[test]
    fn skips_ignored_directories() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("node_modules/pkg")).unwrap();
        std::fs::write(dir.path().join("node_modules/pkg/x.js"), "var x = 1;\n").unwrap();
        std::fs::create_dir_all(dir.path().join("generated")).unwrap();
        std::fs::write(dir.path().join("generated/gen.rs"), "fn g() {}\n").unwrap();
        std::fs::write(dir.path().join("main.rs"), "fn main() {}\n").unwrap();

        let scanner = Scanner::new(&test_config(dir.path())).unwrap();
        let outcome = scanner.scan(&HashMap::new());
        assert_eq!(outcome.new, vec!["main.rs".to_string()]);
    }

    #[test]
    fn scan_is_deterministic() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["z.rs", "a.rs", "m.py"] {
            std::fs::write(dir.path().join(name), format!("// {}\n", name)).unwrap();
        }
        let scanner = Scanner::new(&test_config(dir.path())).unwrap();
        let one = scanner.scan(&HashMap::new());
        let two = scanner.scan(&HashMap::new());
        assert_eq!(one.new, two.new);
        assert_eq!(one.hashes, two.hashes);
    }
}
