use std::path::{Path, PathBuf};

use crate::cache::{CacheReclaimer, FileExistenceCache};
use crate::resolve::heuristics::IncludeHeuristics;

/// File resolution surface handed to the parse engine for one task run
pub struct IncludeResolver {
    cache: FileExistenceCache,
    heuristics: Option<IncludeHeuristics>,
}

impl IncludeResolver {
    pub fn new(cache: FileExistenceCache, heuristics: Option<IncludeHeuristics>) -> Self {
        Self { cache, heuristics }
    }

    pub fn does_include_file_exist(&self, path: &Path) -> bool {
        self.cache.is_file(path)
    }

    /// Heuristic lookup for an include the regular search missed
    pub fn find_inclusion(&self, include: &str, current_file: &Path) -> Option<PathBuf> {
        self.heuristics
            .as_ref()?
            .find_inclusion(Path::new(include), current_file)
    }

    /// Resolve an include directive
    ///
    /// Quoted names are tried next to the includer first, then every include
    /// path in order, then the heuristic when one is configured.
    pub fn resolve_include(
        &self,
        name: &str,
        system: bool,
        includer: &Path,
        include_paths: &[PathBuf],
    ) -> Option<PathBuf> {
        let include = Path::new(name);
        if include.is_absolute() {
            return self
                .does_include_file_exist(include)
                .then(|| include.to_path_buf());
        }

        if !system && let Some(dir) = includer.parent() {
            let candidate = dir.join(include);
            if self.does_include_file_exist(&candidate) {
                return Some(candidate);
            }
        }

        include_paths
            .iter()
            .map(|dir| dir.join(include))
            .find(|candidate| self.does_include_file_exist(candidate))
            .or_else(|| self.find_inclusion(name, includer))
    }

    pub fn has_heuristics(&self) -> bool {
        self.heuristics.as_ref().is_some_and(IncludeHeuristics::is_enabled)
    }

    pub fn reclaimer(&self) -> CacheReclaimer {
        self.cache.reclaimer()
    }
}
