//! Translation unit collection over the logical project tree

use tokio_util::sync::CancellationToken;

use crate::project::element::{CompilationInput, ElementKind, ElementVisitor, ProjectElement};

/// Where discovered headers go
pub enum HeaderSink<'a> {
    /// Collect headers into their own list
    Separate(&'a mut Vec<CompilationInput>),
    /// Merge headers into the sources list
    Merged,
    /// Ignore headers
    Skip,
}

/// Collects translation units below a container into source/header lists
///
/// Descends into projects and folders, stops at units and any other element,
/// and stops descending (without failing) once the token is cancelled.
pub struct TranslationUnitCollector<'a> {
    sources: &'a mut Vec<CompilationInput>,
    headers: HeaderSink<'a>,
    cancel: &'a CancellationToken,
}

impl<'a> TranslationUnitCollector<'a> {
    pub fn new(
        sources: &'a mut Vec<CompilationInput>,
        headers: HeaderSink<'a>,
        cancel: &'a CancellationToken,
    ) -> Self {
        Self {
            sources,
            headers,
            cancel,
        }
    }

    /// Walk `root` and everything below it
    pub fn collect(mut self, root: &ProjectElement) {
        root.accept(&mut self);
    }
}

impl ElementVisitor for TranslationUnitCollector<'_> {
    fn visit(&mut self, element: &ProjectElement) -> bool {
        if self.cancel.is_cancelled() {
            return false;
        }

        match element.kind() {
            ElementKind::TranslationUnit { .. } => {
                if let Some(input) = element.as_input() {
                    if input.is_source() {
                        self.sources.push(input);
                    } else {
                        match &mut self.headers {
                            HeaderSink::Separate(headers) => headers.push(input),
                            HeaderSink::Merged => self.sources.push(input),
                            HeaderSink::Skip => {}
                        }
                    }
                }
                false
            }
            ElementKind::Project | ElementKind::Folder => true,
            ElementKind::Other => false,
        }
    }
}
