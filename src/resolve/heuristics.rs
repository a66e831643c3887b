//! Best-effort resolution of includes the regular search could not find
//!
//! Looks for same-named files in the includer's project and every project it
//! references (transitively), then picks the candidate whose directory is
//! closest to the includer.

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, trace};

use crate::project::model::ProjectId;
use crate::resolve::search::ProjectSearch;

/// A candidate file and its match score against the includer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncludeSearchCandidate {
    pub path: PathBuf,
    pub score: i64,
}

/// Score `candidate` against `origin`
///
/// The high bits hold the offset of the last '/' up to which both paths agree;
/// the candidate length is subtracted so that shorter paths win ties.
pub fn compute_score(candidate: &str, origin: &str) -> i64 {
    let mut agreement = 0usize;
    for (i, (a, b)) in candidate.bytes().zip(origin.bytes()).enumerate() {
        if a != b {
            break;
        }
        if a == b'/' {
            agreement = i;
        }
    }
    ((agreement as i64) << 16) - candidate.len() as i64
}

/// Pick the best-scoring candidate; the first one wins ties
pub fn select_best(candidates: &[PathBuf], origin: &Path) -> Option<IncludeSearchCandidate> {
    let origin = origin.to_string_lossy();
    let mut best: Option<IncludeSearchCandidate> = None;
    for path in candidates {
        let score = compute_score(&path.to_string_lossy(), &origin);
        if best.as_ref().is_none_or(|b| score > b.score) {
            best = Some(IncludeSearchCandidate {
                path: path.clone(),
                score,
            });
        }
    }
    best
}

pub struct IncludeHeuristics {
    search: Arc<dyn ProjectSearch>,
    enabled: bool,
    ignore_case: bool,
    scopes: Mutex<HashMap<ProjectId, Arc<Vec<ProjectId>>>>,
}

impl IncludeHeuristics {
    pub fn new(search: Arc<dyn ProjectSearch>, enabled: bool, ignore_case: bool) -> Self {
        Self {
            search,
            enabled,
            ignore_case,
            scopes: Mutex::new(HashMap::new()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Guess the file meant by `include` when included from `current_file`
    pub fn find_inclusion(&self, include: &Path, current_file: &Path) -> Option<PathBuf> {
        if !self.enabled {
            return None;
        }
        let origin = self.search.canonical_location(current_file)?;
        let project = self.search.project_of(&origin)?;

        let scope = self.search_scope(&project);
        if scope.is_empty() {
            return None;
        }

        let candidates = self
            .search
            .find_files_by_name(&scope, include, self.ignore_case);
        trace!(
            "Heuristic search for {} from {}: {} candidates",
            include.display(),
            origin.display(),
            candidates.len()
        );
        let best = select_best(&candidates, &origin)?;
        debug!(
            "Resolved {} heuristically to {}",
            include.display(),
            best.path.display()
        );
        Some(best.path)
    }

    /// Origin project plus everything it references, open projects only
    fn search_scope(&self, origin: &ProjectId) -> Arc<Vec<ProjectId>> {
        let mut scopes = self.scopes.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(scope) = scopes.get(origin) {
            return Arc::clone(scope);
        }

        let mut seen = HashSet::new();
        let mut queue = VecDeque::from([origin.clone()]);
        let mut scope = Vec::new();
        while let Some(project) = queue.pop_front() {
            if !seen.insert(project.clone()) || !self.search.is_accessible(&project) {
                continue;
            }
            queue.extend(self.search.referenced_projects(&project));
            scope.push(project);
        }

        let scope = Arc::new(scope);
        scopes.insert(origin.clone(), Arc::clone(&scope));
        scope
    }
}
