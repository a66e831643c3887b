//! Configuration for indexer instances
//!
//! Provides IndexerConfig with a validating builder. The values are supplied by
//! the preferences layer and consumed by delta analysis, the existence cache,
//! the include heuristics and the indexer tasks.

use std::path::PathBuf;
use std::time::Duration;

// ============================================================================
// Configuration Constants
// ============================================================================

/// Default per-file size limit (8 MiB)
///
/// Files above the limit are skipped rather than parsed; generated sources of
/// this size rarely contribute useful declarations.
pub const DEFAULT_FILE_SIZE_LIMIT_BYTES: u64 = 8 * 1024 * 1024;

/// Default timeout for acquiring a read or write lock on the persisted index
pub const DEFAULT_LOCK_TIMEOUT_SECS: u64 = 10;

/// Maximum allowed lock timeout (5 minutes)
pub const MAX_LOCK_TIMEOUT_SECS: u64 = 300;

// ============================================================================
// Errors
// ============================================================================

/// Configuration validation errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Invalid per-file size limit
    #[error("Invalid file size limit: {limit} - {reason}")]
    InvalidSizeLimit { limit: u64, reason: String },

    /// Invalid lock timeout
    #[error("Invalid lock timeout: {timeout:?} - {reason}")]
    InvalidTimeout { timeout: Duration, reason: String },

    /// Invalid include path
    #[error("Invalid include path: {path} - {reason}")]
    InvalidIncludePath { path: PathBuf, reason: String },
}

// ============================================================================
// Core Configuration Types
// ============================================================================

/// Which concrete task flavor an indexer creates for parsing work
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexerMode {
    /// Quick updates from saved content, no include heuristics
    Fast,
    /// Thorough parses with include heuristics enabled
    Full,
}

impl std::fmt::Display for IndexerMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IndexerMode::Fast => write!(f, "fast"),
            IndexerMode::Full => write!(f, "full"),
        }
    }
}

/// Flags that let the parse engine drop classes of references
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SkipReferences {
    /// Skip all references, keep declarations only
    pub all: bool,
    /// Skip references to types
    pub type_references: bool,
    /// Skip references to macros
    pub macro_references: bool,
}

/// Complete indexer configuration
#[derive(Debug, Clone, PartialEq)]
pub struct IndexerConfig {
    /// Index source files that do not belong to any build configuration
    pub index_all_files: bool,

    /// Index headers on their own, even when no indexed source includes them
    pub index_unused_headers: bool,

    /// Reference classes the parse engine may skip
    pub skip_references: SkipReferences,

    /// Files larger than this are skipped
    pub file_size_limit: u64,

    /// Host file system case sensitivity; None selects the platform default
    pub case_sensitive_fs: Option<bool>,

    /// Disable the directory listing cache and stat on every query
    pub bypass_file_exists_cache: bool,

    /// Search referenced projects for includes the regular search missed
    pub include_heuristics: bool,

    /// Skip the raw resource delta pass of the delta analyzer (tests only)
    pub suppress_raw_delta: bool,

    /// Timeout for acquiring persisted index locks
    pub lock_timeout: Duration,

    /// Extra include directories searched after the includer's directory
    pub include_paths: Vec<PathBuf>,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            index_all_files: false,
            index_unused_headers: false,
            skip_references: SkipReferences::default(),
            file_size_limit: DEFAULT_FILE_SIZE_LIMIT_BYTES,
            case_sensitive_fs: None,
            bypass_file_exists_cache: false,
            include_heuristics: true,
            suppress_raw_delta: false,
            lock_timeout: Duration::from_secs(DEFAULT_LOCK_TIMEOUT_SECS),
            include_paths: Vec::new(),
        }
    }
}

impl IndexerConfig {
    /// Create a builder starting from defaults
    pub fn builder() -> IndexerConfigBuilder {
        IndexerConfigBuilder::new()
    }

    /// Effective case sensitivity of the host file system
    pub fn is_case_sensitive(&self) -> bool {
        self.case_sensitive_fs
            .unwrap_or(!cfg!(any(windows, target_os = "macos")))
    }
}

// ============================================================================
// Configuration Builder
// ============================================================================

/// Builder for IndexerConfig with validation and defaults
#[derive(Debug, Default)]
pub struct IndexerConfigBuilder {
    config: IndexerConfig,
}

impl IndexerConfigBuilder {
    /// Create a new configuration builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Index sources outside any build configuration
    pub fn index_all_files(mut self, enabled: bool) -> Self {
        self.config.index_all_files = enabled;
        self
    }

    /// Index headers without an including context
    pub fn index_unused_headers(mut self, enabled: bool) -> Self {
        self.config.index_unused_headers = enabled;
        self
    }

    /// Set the reference skipping flags
    pub fn skip_references(mut self, skip: SkipReferences) -> Self {
        self.config.skip_references = skip;
        self
    }

    /// Set the per-file size limit in bytes
    pub fn file_size_limit(mut self, limit: u64) -> Self {
        self.config.file_size_limit = limit;
        self
    }

    /// Force case sensitivity instead of the platform default
    pub fn case_sensitive_fs(mut self, sensitive: bool) -> Self {
        self.config.case_sensitive_fs = Some(sensitive);
        self
    }

    /// Bypass the file existence cache
    pub fn bypass_file_exists_cache(mut self, bypass: bool) -> Self {
        self.config.bypass_file_exists_cache = bypass;
        self
    }

    /// Enable or disable the include resolution heuristics
    pub fn include_heuristics(mut self, enabled: bool) -> Self {
        self.config.include_heuristics = enabled;
        self
    }

    /// Suppress the raw resource delta pass
    pub fn suppress_raw_delta(mut self, suppress: bool) -> Self {
        self.config.suppress_raw_delta = suppress;
        self
    }

    /// Set the index lock timeout
    pub fn lock_timeout(mut self, timeout: Duration) -> Self {
        self.config.lock_timeout = timeout;
        self
    }

    /// Add an include directory
    pub fn add_include_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.include_paths.push(path.into());
        self
    }

    /// Build the configuration with validation
    pub fn build(self) -> Result<IndexerConfig, ConfigError> {
        let config = self.config;

        if config.file_size_limit == 0 {
            return Err(ConfigError::InvalidSizeLimit {
                limit: config.file_size_limit,
                reason: "File size limit must be positive".to_string(),
            });
        }

        if config.lock_timeout.is_zero() {
            return Err(ConfigError::InvalidTimeout {
                timeout: config.lock_timeout,
                reason: "Lock timeout must be positive".to_string(),
            });
        }

        if config.lock_timeout > Duration::from_secs(MAX_LOCK_TIMEOUT_SECS) {
            return Err(ConfigError::InvalidTimeout {
                timeout: config.lock_timeout,
                reason: format!("Lock timeout exceeds {MAX_LOCK_TIMEOUT_SECS} seconds"),
            });
        }

        if let Some(path) = config.include_paths.iter().find(|p| p.is_relative()) {
            return Err(ConfigError::InvalidIncludePath {
                path: path.clone(),
                reason: "Include paths must be absolute".to_string(),
            });
        }

        Ok(config)
    }
}
