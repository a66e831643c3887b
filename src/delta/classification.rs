use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::project::element::CompilationInput;

/// Insertion-ordered set of compilation inputs keyed by path
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InputSet {
    items: Vec<CompilationInput>,
    paths: HashSet<PathBuf>,
}

impl InputSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an input; returns false when the path is already present
    pub fn insert(&mut self, input: CompilationInput) -> bool {
        if !self.paths.insert(input.path().to_path_buf()) {
            return false;
        }
        self.items.push(input);
        true
    }

    pub fn remove(&mut self, path: &Path) -> bool {
        if !self.paths.remove(path) {
            return false;
        }
        self.items.retain(|item| item.path() != path);
        true
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.paths.contains(path)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CompilationInput> {
        self.items.iter()
    }

    pub fn retain(&mut self, mut keep: impl FnMut(&CompilationInput) -> bool) {
        let paths = &mut self.paths;
        self.items.retain(|item| {
            let kept = keep(item);
            if !kept {
                paths.remove(item.path());
            }
            kept
        });
    }

    pub fn into_vec(self) -> Vec<CompilationInput> {
        self.items
    }

    pub fn to_vec(&self) -> Vec<CompilationInput> {
        self.items.clone()
    }
}

impl FromIterator<CompilationInput> for InputSet {
    fn from_iter<I: IntoIterator<Item = CompilationInput>>(iter: I) -> Self {
        let mut set = InputSet::new();
        for input in iter {
            set.insert(input);
        }
        set
    }
}

/// Which of the three sets an input belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Forced,
    Changed,
    Removed,
}

/// The forced / changed / removed sets produced by delta analysis
///
/// The sets stay pairwise disjoint: classifying a path moves it out of any
/// other set, so the latest classification wins.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeClassification {
    forced: InputSet,
    changed: InputSet,
    removed: InputSet,
}

impl ChangeClassification {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_lists(
        forced: Vec<CompilationInput>,
        changed: Vec<CompilationInput>,
        removed: Vec<CompilationInput>,
    ) -> Self {
        let mut classification = Self::new();
        for input in forced {
            classification.classify(input, Classification::Forced);
        }
        for input in changed {
            classification.classify(input, Classification::Changed);
        }
        for input in removed {
            classification.classify(input, Classification::Removed);
        }
        classification
    }

    pub fn classify(&mut self, input: CompilationInput, class: Classification) {
        let path = input.path().to_path_buf();
        let (target, others) = match class {
            Classification::Forced => (&mut self.forced, [&mut self.changed, &mut self.removed]),
            Classification::Changed => (&mut self.changed, [&mut self.forced, &mut self.removed]),
            Classification::Removed => (&mut self.removed, [&mut self.forced, &mut self.changed]),
        };
        for other in others {
            other.remove(&path);
        }
        target.insert(input);
    }

    pub fn forced(&self) -> &InputSet {
        &self.forced
    }

    pub fn changed(&self) -> &InputSet {
        &self.changed
    }

    pub fn removed(&self) -> &InputSet {
        &self.removed
    }

    pub fn forced_mut(&mut self) -> &mut InputSet {
        &mut self.forced
    }

    pub fn changed_mut(&mut self) -> &mut InputSet {
        &mut self.changed
    }

    pub fn removed_mut(&mut self) -> &mut InputSet {
        &mut self.removed
    }

    pub fn len(&self) -> usize {
        self.forced.len() + self.changed.len() + self.removed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn into_parts(self) -> (InputSet, InputSet, InputSet) {
        (self.forced, self.changed, self.removed)
    }
}
