//! Parse/persist engine interface
//!
//! Tasks decide what to index; an engine does the per-file work and writes the
//! results into the shared index. Per-file failures stay inside the engine's
//! result and never abort a task run.

pub mod digest;

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

use crate::config::{IndexerMode, SkipReferences};
use crate::index::{IndexError, SharedIndex};
use crate::project::element::CompilationInput;
use crate::resolve::IncludeResolver;

pub use digest::{DigestEngine, IncludePatterns};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("File {path} has {size} bytes, above the limit of {limit}")]
    FileTooLarge { path: PathBuf, size: u64, limit: u64 },

    #[error("Unsupported input: {path}")]
    Unsupported { path: PathBuf },

    #[error("Index error: {0}")]
    Index(#[from] IndexError),
}

impl EngineError {
    pub fn io<P: AsRef<Path>>(path: P, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }
}

/// Result of parsing one file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseOutcome {
    /// The record was (re)written
    Indexed { includes: usize, unresolved: usize },
    /// The stored record is still current
    Unchanged,
}

/// Everything an engine needs for one task run
#[derive(Clone)]
pub struct ParseContext {
    pub mode: IndexerMode,
    pub index: SharedIndex,
    pub resolver: Arc<IncludeResolver>,
    pub skip_references: SkipReferences,
    /// Include directories searched after the includer's own directory
    pub include_paths: Vec<PathBuf>,
    pub file_size_limit: u64,
}

/// External parser and persister of files
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ParseEngine: Send + Sync {
    /// Parse one file and store its record; `forced` disables staleness shortcuts
    async fn parse_file(
        &self,
        input: &CompilationInput,
        forced: bool,
        ctx: &ParseContext,
    ) -> Result<ParseOutcome, EngineError>;

    /// Drop the record of a file; returns whether one existed
    async fn remove_file(&self, path: &Path, ctx: &ParseContext) -> Result<bool, EngineError>;
}
