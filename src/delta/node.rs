//! Change notification trees
//!
//! An [`ElementDelta`] mirrors the logical project tree. Each node may carry
//! raw [`ResourceDelta`] entries for files the logical tree does not track
//! (generated headers, files outside any source folder, ...).

use std::path::{Path, PathBuf};

use crate::project::element::ProjectElement;

/// Operation recorded on a delta node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeltaKind {
    Added,
    Changed,
    Removed,
}

/// Detail flags of a CHANGED element delta
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChangeFlags {
    /// File content changed on disk
    pub content: bool,
    /// Build settings of the unit changed (defines, include paths, ...)
    pub settings: bool,
    /// Only descendants changed
    pub children: bool,
}

impl ChangeFlags {
    pub fn content() -> Self {
        Self {
            content: true,
            ..Self::default()
        }
    }

    pub fn settings() -> Self {
        Self {
            settings: true,
            ..Self::default()
        }
    }

    pub fn children() -> Self {
        Self {
            children: true,
            ..Self::default()
        }
    }
}

/// Raw file system level change
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceDelta {
    path: PathBuf,
    kind: DeltaKind,
    is_file: bool,
    content_changed: bool,
    children: Vec<ResourceDelta>,
}

impl ResourceDelta {
    pub fn file(path: impl Into<PathBuf>, kind: DeltaKind) -> Self {
        Self {
            path: path.into(),
            kind,
            is_file: true,
            content_changed: kind == DeltaKind::Changed,
            children: Vec::new(),
        }
    }

    pub fn folder(path: impl Into<PathBuf>, kind: DeltaKind) -> Self {
        Self {
            path: path.into(),
            kind,
            is_file: false,
            content_changed: false,
            children: Vec::new(),
        }
    }

    /// Override the content flag; a CHANGED file without it is a marker or
    /// property change
    pub fn with_content_changed(mut self, changed: bool) -> Self {
        self.content_changed = changed;
        self
    }

    pub fn with_child(mut self, child: ResourceDelta) -> Self {
        self.children.push(child);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn kind(&self) -> DeltaKind {
        self.kind
    }

    pub fn is_file(&self) -> bool {
        self.is_file
    }

    pub fn content_changed(&self) -> bool {
        self.content_changed
    }

    pub fn children(&self) -> &[ResourceDelta] {
        &self.children
    }

    /// Children whose kind is CHANGED or REMOVED
    pub fn affected_children(&self) -> impl Iterator<Item = &ResourceDelta> {
        self.children
            .iter()
            .filter(|child| matches!(child.kind, DeltaKind::Changed | DeltaKind::Removed))
    }
}

/// Change notification node over the logical project tree
#[derive(Debug, Clone, PartialEq)]
pub struct ElementDelta {
    element: ProjectElement,
    kind: DeltaKind,
    flags: ChangeFlags,
    working_copy: bool,
    children: Vec<ElementDelta>,
    resource_deltas: Vec<ResourceDelta>,
}

impl ElementDelta {
    pub fn new(element: ProjectElement, kind: DeltaKind) -> Self {
        Self {
            element,
            kind,
            flags: ChangeFlags::default(),
            working_copy: false,
            children: Vec::new(),
            resource_deltas: Vec::new(),
        }
    }

    pub fn added(element: ProjectElement) -> Self {
        Self::new(element, DeltaKind::Added)
    }

    pub fn removed(element: ProjectElement) -> Self {
        Self::new(element, DeltaKind::Removed)
    }

    pub fn changed(element: ProjectElement, flags: ChangeFlags) -> Self {
        Self::new(element, DeltaKind::Changed).with_flags(flags)
    }

    pub fn with_flags(mut self, flags: ChangeFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Mark the node as an unsaved in-memory copy of its element
    pub fn as_working_copy(mut self) -> Self {
        self.working_copy = true;
        self
    }

    pub fn with_child(mut self, child: ElementDelta) -> Self {
        self.children.push(child);
        self
    }

    pub fn with_resource_delta(mut self, delta: ResourceDelta) -> Self {
        self.resource_deltas.push(delta);
        self
    }

    pub fn element(&self) -> &ProjectElement {
        &self.element
    }

    pub fn path(&self) -> &Path {
        self.element.path()
    }

    pub fn kind(&self) -> DeltaKind {
        self.kind
    }

    pub fn flags(&self) -> ChangeFlags {
        self.flags
    }

    pub fn is_working_copy(&self) -> bool {
        self.working_copy
    }

    pub fn children(&self) -> &[ElementDelta] {
        &self.children
    }

    pub fn resource_deltas(&self) -> &[ResourceDelta] {
        &self.resource_deltas
    }
}
