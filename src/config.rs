use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};

/// Maximum allowed length for search queries (characters).
pub const MAX_SEARCH_QUERY_LENGTH: usize = 1000;

/// Canonical list of file extensions considered indexable and embeddable.
/// The scanner and the query path both use this single list so they never
/// diverge on which files exist in the index.
pub const SUPPORTED_EXTENSIONS: &[&str] = &[
    // JavaScript / TypeScript
    "ts", "tsx", "js", "jsx", "mjs", "cjs",
    // Systems / compiled
    "rs", "py", "pyi", "go", "java", "c", "cpp", "h", "hpp", "cc",
    "cs", "rb", "php", "swift", "kt", "scala",
    // Misc languages
    "lua", "zig", "dart", "ex", "exs",
    // Query / schema
    "sql",
    // Shell
    "sh", "bash", "zsh",
    // Frontend frameworks
    "vue", "svelte",
];

/// Check whether a file extension (without leading dot, lowercase) is in the
/// shared supported-extensions list.
pub fn is_supported_extension(ext: &str) -> bool {
    SUPPORTED_EXTENSIONS.contains(&ext)
}

/// Directory basenames that are never descended into, regardless of
/// gitignore state. Catches build artifacts in repos without a .gitignore.
pub const DEFAULT_IGNORE_DIRS: &[&str] = &[
    ".git",
    ".hg",
    ".svn",
    "node_modules",
    "target",
    "dist",
    "build",
    "out",
    ".next",
    ".nuxt",
    ".output",
    ".vite",
    ".turbo",
    ".svelte-kit",
    "__pycache__",
    ".tox",
    ".mypy_cache",
    ".pytest_cache",
    ".ruff_cache",
    "coverage",
    ".cache",
    "vendor",
    ".gradle",
    ".terraform",
    ".idea",
    ".vscode",
    ".memory",
];

/// Execution shape for the embedding client, keyed off the model's RPM tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionProfile {
    /// High-RPM models: batches in flight concurrently, paced per second.
    Parallel,
    /// Low-RPM models: one request at a time with a fixed gap.
    Serial,
}

/// Rate-limit and output profile for an embedding model.
#[derive(Debug, Clone, Serialize)]
pub struct ModelProfile {
    pub name: &'static str,
    /// Default output dimension; `supported_dimensions` lists alternatives.
    pub dimension: usize,
    pub supported_dimensions: &'static [usize],
    pub rpm_limit: u32,
    pub tpm_limit: u64,
    /// None on paid tiers with no daily request ceiling.
    pub rpd_limit: Option<u32>,
    pub execution: ExecutionProfile,
    /// Default ceiling on chunks embedded per local day.
    pub default_daily_chunk_limit: u64,
}

/// Look up the profile for a model identifier.
pub fn model_profile(model: &str) -> Option<ModelProfile> {
    match model {
        "text-embedding-004" => Some(ModelProfile {
            name: "text-embedding-004",
            dimension: 768,
            supported_dimensions: &[768],
            rpm_limit: 1500,
            tpm_limit: 1_000_000,
            rpd_limit: None,
            execution: ExecutionProfile::Parallel,
            default_daily_chunk_limit: 100_000,
        }),
        "gemini-embedding-001" => Some(ModelProfile {
            name: "gemini-embedding-001",
            dimension: 3072,
            supported_dimensions: &[3072, 1536, 768],
            rpm_limit: 100,
            tpm_limit: 30_000,
            rpd_limit: Some(1000),
            execution: ExecutionProfile::Serial,
            default_daily_chunk_limit: 1000,
        }),
        _ => None,
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Absolute path of the repository to index.
    pub repo_path: PathBuf,
    pub embed_api_key: String,
    /// Base URL of the embedding provider (overridable for self-hosted proxies).
    pub embed_base_url: String,
    pub vector_url: String,
    pub vector_api_key: String,
    pub collection: String,
    pub model: ModelProfile,
    /// Output dimension actually requested; fixed for the collection's lifetime.
    pub dimension: usize,
    pub watch_mode: bool,
    /// Parallel-profile batch width.
    pub batch_size: usize,
    /// Hard ceiling on chunks embedded per local day.
    pub daily_limit: u64,
    /// Additional directory names / glob patterns to skip while scanning.
    pub ignore_paths: Vec<String>,
    pub listen_addr: String,
    /// Files larger than this are never hashed or chunked.
    pub max_file_size_bytes: u64,
    /// State is checkpointed every this many completed files.
    pub checkpoint_interval: usize,
    pub watcher_debounce_ms: u64,
    /// Per-request HTTP timeout for provider and vector-store calls.
    pub request_timeout_secs: u64,
}

fn required(name: &str) -> AppResult<String> {
    std::env::var(name)
        .ok()
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AppError::Configuration(format!("{} must be set", name)))
}

impl AppConfig {
    pub fn from_env() -> AppResult<Self> {
        let repo_path = PathBuf::from(required("REPO_PATH")?);
        if !repo_path.is_absolute() {
            return Err(AppError::Configuration(format!(
                "REPO_PATH must be absolute, got {}",
                repo_path.display()
            )));
        }
        if !repo_path.is_dir() {
            return Err(AppError::Configuration(format!(
                "REPO_PATH does not exist or is not a directory: {}",
                repo_path.display()
            )));
        }

        let model_name =
            std::env::var("EMBED_MODEL").unwrap_or_else(|_| "text-embedding-004".to_string());
        let model = model_profile(&model_name).ok_or_else(|| {
            AppError::Configuration(format!("unknown EMBED_MODEL '{}'", model_name))
        })?;

        let dimension = match std::env::var("EMBED_DIMENSION").ok() {
            Some(raw) => {
                let dim: usize = raw.parse().map_err(|_| {
                    AppError::Configuration(format!("EMBED_DIMENSION is not a number: {}", raw))
                })?;
                if !model.supported_dimensions.contains(&dim) {
                    return Err(AppError::Configuration(format!(
                        "EMBED_DIMENSION {} is not supported by {} (supported: {:?})",
                        dim, model.name, model.supported_dimensions
                    )));
                }
                dim
            }
            None => model.dimension,
        };

        let daily_limit = match std::env::var("DAILY_LIMIT").ok() {
            Some(raw) => raw.parse().map_err(|_| {
                AppError::Configuration(format!("DAILY_LIMIT is not a number: {}", raw))
            })?,
            None => model.default_daily_chunk_limit,
        };

        let ignore_paths = std::env::var("IGNORE_PATHS")
            .unwrap_or_default()
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let port = std::env::var("BACKEND_PORT").unwrap_or_else(|_| "9800".to_string());

        Ok(Self {
            repo_path,
            embed_api_key: required("EMBED_API_KEY")?,
            embed_base_url: std::env::var("EMBED_API_URL")
                .unwrap_or_else(|_| "https://generativelanguage.googleapis.com".to_string()),
            vector_url: required("VECTOR_URL")?.trim_end_matches('/').to_string(),
            vector_api_key: required("VECTOR_API_KEY")?,
            collection: std::env::var("VECTOR_COLLECTION")
                .unwrap_or_else(|_| "codebase".to_string()),
            model,
            dimension,
            watch_mode: std::env::var("WATCH_MODE")
                .map(|v| v != "false" && v != "0")
                .unwrap_or(true),
            batch_size: std::env::var("BATCH_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(25),
            daily_limit,
            ignore_paths,
            listen_addr: format!("127.0.0.1:{}", port),
            max_file_size_bytes: std::env::var("MAX_FILE_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(1024 * 1024), // 1MB
            checkpoint_interval: 10,
            watcher_debounce_ms: 500,
            request_timeout_secs: 30,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn supported_extensions_cover_fifteen_languages() {
        let languages: std::collections::HashSet<&str> = SUPPORTED_EXTENSIONS
            .iter()
            .map(|e| crate::lang::detect_language(e))
            .filter(|l| *l != "plaintext")
            .collect();
        assert!(languages.len() >= 15, "only {} languages", languages.len());
    }

    #[test]
    fn profiles_resolve_by_name() {
        let parallel = model_profile("text-embedding-004").unwrap();
        assert_eq!(parallel.execution, ExecutionProfile::Parallel);
        assert_eq!(parallel.dimension, 768);
        assert!(parallel.rpd_limit.is_none());

        let serial = model_profile("gemini-embedding-001").unwrap();
        assert_eq!(serial.execution, ExecutionProfile::Serial);
        assert_eq!(serial.rpd_limit, Some(1000));

        assert!(model_profile("nonexistent-model").is_none());
    }
}
