//! Delta analysis: change notification tree → forced / changed / removed
//!
//! The logical tree is walked children first. Each node is then examined
//! itself, followed by the raw file system entries attached to it. A handled
//! set keeps the raw pass from reclassifying files the logical pass already
//! saw; it lives for a single `analyze_delta` call.

use std::collections::HashSet;
use std::path::PathBuf;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::delta::classification::{ChangeClassification, Classification};
use crate::delta::node::{DeltaKind, ElementDelta, ResourceDelta};
use crate::project::collector::{HeaderSink, TranslationUnitCollector};
use crate::project::element::{CompilationInput, ElementKind};

#[derive(Debug, Error)]
pub enum DeltaError {
    #[error("Delta for {child} is not below its parent {parent}")]
    ChildOutsideParent { parent: String, child: String },

    #[error("Translation unit delta {path} must not have element children")]
    UnitWithChildren { path: String },
}

/// Classifies change notifications into the three input sets
///
/// Results accumulate across `analyze_delta` calls on the same instance. When a
/// call fails, the sets may hold the part classified before the failure.
pub struct DeltaAnalyzer {
    classification: ChangeClassification,
    suppress_raw_delta: bool,
    cancel: CancellationToken,
}

impl Default for DeltaAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl DeltaAnalyzer {
    pub fn new() -> Self {
        Self {
            classification: ChangeClassification::new(),
            suppress_raw_delta: false,
            cancel: CancellationToken::new(),
        }
    }

    /// Skip raw file system entries; only logically tracked files are classified
    pub fn suppress_raw_delta(mut self, suppress: bool) -> Self {
        self.suppress_raw_delta = suppress;
        self
    }

    /// Token observed while collecting units below added folders
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn analyze_delta(&mut self, delta: &ElementDelta) -> Result<(), DeltaError> {
        let mut handled = HashSet::new();
        self.process_delta(delta, &mut handled)?;
        debug!(
            "Analyzed delta for {}: {} forced, {} changed, {} removed",
            delta.path().display(),
            self.classification.forced().len(),
            self.classification.changed().len(),
            self.classification.removed().len()
        );
        Ok(())
    }

    pub fn get_forced_list(&self) -> Vec<CompilationInput> {
        self.classification.forced().to_vec()
    }

    pub fn get_changed_list(&self) -> Vec<CompilationInput> {
        self.classification.changed().to_vec()
    }

    pub fn get_removed_list(&self) -> Vec<CompilationInput> {
        self.classification.removed().to_vec()
    }

    pub fn classification(&self) -> &ChangeClassification {
        &self.classification
    }

    pub fn into_classification(self) -> ChangeClassification {
        self.classification
    }

    fn process_delta(
        &mut self,
        delta: &ElementDelta,
        handled: &mut HashSet<PathBuf>,
    ) -> Result<(), DeltaError> {
        for child in delta.children() {
            if !child.path().starts_with(delta.path()) {
                return Err(DeltaError::ChildOutsideParent {
                    parent: delta.path().display().to_string(),
                    child: child.path().display().to_string(),
                });
            }
            self.process_delta(child, handled)?;
        }

        match delta.element().kind() {
            ElementKind::TranslationUnit { .. } => {
                if !delta.children().is_empty() {
                    return Err(DeltaError::UnitWithChildren {
                        path: delta.path().display().to_string(),
                    });
                }
                if !delta.is_working_copy()
                    && let Some(input) = delta.element().as_input()
                {
                    handled.insert(input.path().to_path_buf());
                    self.classify_unit(delta, input);
                }
            }
            ElementKind::Folder if delta.kind() == DeltaKind::Added => {
                let mut units = Vec::new();
                TranslationUnitCollector::new(&mut units, HeaderSink::Merged, &self.cancel)
                    .collect(delta.element());
                trace!(
                    "Added folder {} contributes {} units",
                    delta.path().display(),
                    units.len()
                );
                for unit in units {
                    handled.insert(unit.path().to_path_buf());
                    self.classification.classify(unit, Classification::Changed);
                }
            }
            _ => {}
        }

        if !self.suppress_raw_delta {
            for raw in delta.resource_deltas() {
                self.process_resource_delta(raw, handled);
            }
        }
        Ok(())
    }

    fn classify_unit(&mut self, delta: &ElementDelta, input: CompilationInput) {
        match delta.kind() {
            DeltaKind::Changed => {
                let flags = delta.flags();
                if flags.content {
                    self.classification.classify(input, Classification::Changed);
                } else if flags.settings {
                    self.classification.classify(input, Classification::Forced);
                }
            }
            DeltaKind::Added => {
                self.classification.classify(input, Classification::Changed);
            }
            DeltaKind::Removed => {
                self.classification.classify(input, Classification::Removed);
            }
        }
    }

    fn process_resource_delta(&mut self, delta: &ResourceDelta, handled: &HashSet<PathBuf>) {
        if delta.is_file() && !handled.contains(delta.path()) {
            let class = match delta.kind() {
                DeltaKind::Changed if delta.content_changed() => Some(Classification::Changed),
                DeltaKind::Removed => Some(Classification::Removed),
                _ => None,
            };
            if let Some(class) = class
                && let Some(input) = CompilationInput::potential(delta.path())
            {
                self.classification.classify(input, class);
            }
        }
        for child in delta.affected_children() {
            self.process_resource_delta(child, handled);
        }
    }
}
