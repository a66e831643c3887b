//! Reference engine: content digests and include graphs
//!
//! Does not build an AST. For each file it records the SHA-256 of the content
//! and every `#include` directive, resolving names through the task's
//! [`IncludeResolver`](crate::resolve::IncludeResolver). Heuristic guesses are
//! only made when the run's resolver carries heuristics (Full mode).

use async_trait::async_trait;
use chrono::Utc;
use regex::Regex;
use sha2::{Digest, Sha256};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, trace};

use crate::config::IndexerMode;
use crate::engine::{EngineError, ParseContext, ParseEngine, ParseOutcome};
use crate::index::{FileRecord, IncludeDirective, IndexEvent, IndexStore};
use crate::io::FileSystemTrait;
use crate::project::element::CompilationInput;

/// Compiled preprocessor patterns
#[derive(Clone)]
pub struct IncludePatterns {
    include_regex: Regex,
}

impl IncludePatterns {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            // #include "a.h"   #  include <sys/types.h>   #import "x.h"
            include_regex: Regex::new(
                r#"(?m)^[ \t]*#[ \t]*(?:include|include_next|import)[ \t]*([<"])([^>"\n]+)[>"]"#,
            )?,
        })
    }

    /// Include names in order of appearance, with the `<...>` flag
    pub fn scan<'a>(&'a self, content: &'a str) -> impl Iterator<Item = (&'a str, bool)> + 'a {
        self.include_regex.captures_iter(content).filter_map(|captures| {
            let system = captures.get(1)?.as_str() == "<";
            Some((captures.get(2)?.as_str().trim(), system))
        })
    }
}

pub fn content_hash(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    format!("{:x}", hasher.finalize())
}

pub struct DigestEngine {
    fs: Arc<dyn FileSystemTrait>,
    patterns: IncludePatterns,
}

impl DigestEngine {
    pub fn new(fs: Arc<dyn FileSystemTrait>) -> Result<Self, regex::Error> {
        Ok(Self {
            fs,
            patterns: IncludePatterns::new()?,
        })
    }
}

#[async_trait]
impl ParseEngine for DigestEngine {
    async fn parse_file(
        &self,
        input: &CompilationInput,
        forced: bool,
        ctx: &ParseContext,
    ) -> Result<ParseOutcome, EngineError> {
        let path = input.path();
        let metadata = self
            .fs
            .metadata(path)
            .map_err(|e| EngineError::io(path, e))?;
        if !metadata.is_file {
            return Err(EngineError::Unsupported {
                path: path.to_path_buf(),
            });
        }
        if metadata.size > ctx.file_size_limit {
            return Err(EngineError::FileTooLarge {
                path: path.to_path_buf(),
                size: metadata.size,
                limit: ctx.file_size_limit,
            });
        }

        if ctx.mode == IndexerMode::Fast && !forced {
            let index = ctx.index.read().await?;
            if let Some(existing) = index.get(path)
                && !existing.is_outdated(&metadata)
            {
                trace!("Reusing stored digest for {:?}", path);
                return Ok(ParseOutcome::Unchanged);
            }
        }

        let bytes = self.fs.read(path).map_err(|e| EngineError::io(path, e))?;
        let hash = content_hash(&bytes);
        let content = String::from_utf8_lossy(&bytes);

        let includes: Vec<IncludeDirective> = self
            .patterns
            .scan(&content)
            .map(|(name, system)| IncludeDirective {
                name: name.to_string(),
                system,
                resolved: ctx
                    .resolver
                    .resolve_include(name, system, path, &ctx.include_paths),
            })
            .collect();
        let unresolved = includes.iter().filter(|i| !i.is_resolved()).count();
        let outcome = ParseOutcome::Indexed {
            includes: includes.len(),
            unresolved,
        };

        let record = FileRecord {
            path: path.to_path_buf(),
            kind: input.kind(),
            membership: input.membership(),
            modified: metadata.modified,
            size: metadata.size,
            content_hash: hash,
            includes,
            mode: ctx.mode,
            indexed_at: Utc::now(),
        };
        ctx.index.write().await?.put(record);
        ctx.index.notify(IndexEvent::FilesUpdated {
            paths: vec![path.to_path_buf()],
        });

        debug!(
            "Indexed {:?} ({} mode, {} unresolved includes)",
            path, ctx.mode, unresolved
        );
        Ok(outcome)
    }

    async fn remove_file(&self, path: &Path, ctx: &ParseContext) -> Result<bool, EngineError> {
        let removed = ctx.index.write().await?.remove(path).is_some();
        if removed {
            ctx.index.notify(IndexEvent::FilesRemoved {
                paths: vec![path.to_path_buf()],
            });
        }
        Ok(removed)
    }
}
