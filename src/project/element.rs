//! Project element tree and compilation inputs
//!
//! A project is modelled as a logical tree (project → folder → translation
//! unit). Compilation inputs are the immutable values that delta analysis and
//! tree collection hand to indexer tasks.

use serde::Serialize;
use std::path::{Path, PathBuf};

/// Source/header classification of a translation unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitKind {
    Source,
    Header,
}

const SOURCE_EXTENSIONS: &[&str] = &["c", "cc", "cpp", "cxx", "c++", "C", "m", "mm"];
const HEADER_EXTENSIONS: &[&str] = &["h", "hh", "hpp", "hxx", "h++", "inl", "tcc", "H"];

impl UnitKind {
    /// Classify a path by its extension; None for non C/C++ files
    pub fn classify(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?;
        if SOURCE_EXTENSIONS.contains(&ext) {
            Some(UnitKind::Source)
        } else if HEADER_EXTENSIONS.contains(&ext) {
            Some(UnitKind::Header)
        } else {
            // Case-insensitive retry for exotic casing like FOO.CPP
            let lower = ext.to_ascii_lowercase();
            if SOURCE_EXTENSIONS.contains(&lower.as_str()) {
                Some(UnitKind::Source)
            } else if HEADER_EXTENSIONS.contains(&lower.as_str()) {
                Some(UnitKind::Header)
            } else {
                None
            }
        }
    }
}

/// Whether a unit is declared by a build configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Membership {
    /// Listed by a build configuration of the project
    Member,
    /// Discovered only on disk or through inclusion
    Potential,
}

/// One file that is, or might become, a unit of indexing
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct CompilationInput {
    path: PathBuf,
    kind: UnitKind,
    membership: Membership,
}

impl CompilationInput {
    pub fn new(path: impl Into<PathBuf>, kind: UnitKind, membership: Membership) -> Self {
        Self {
            path: path.into(),
            kind,
            membership,
        }
    }

    /// Wrap a file seen only on disk; None when the name is not a C/C++ file
    pub fn potential(path: impl Into<PathBuf>) -> Option<Self> {
        let path = path.into();
        let kind = UnitKind::classify(&path)?;
        Some(Self::new(path, kind, Membership::Potential))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn kind(&self) -> UnitKind {
        self.kind
    }

    pub fn membership(&self) -> Membership {
        self.membership
    }

    pub fn is_source(&self) -> bool {
        self.kind == UnitKind::Source
    }

    pub fn is_header(&self) -> bool {
        self.kind == UnitKind::Header
    }

    pub fn is_member(&self) -> bool {
        self.membership == Membership::Member
    }
}

/// Kind of a node in the logical project tree
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementKind {
    Project,
    Folder,
    TranslationUnit {
        kind: UnitKind,
        membership: Membership,
    },
    /// Any other resource (binaries, build scripts, ...)
    Other,
}

/// Node of the logical project tree
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectElement {
    kind: ElementKind,
    path: PathBuf,
    children: Vec<ProjectElement>,
}

/// Visitor over a project element tree; returning false prunes the subtree
pub trait ElementVisitor {
    fn visit(&mut self, element: &ProjectElement) -> bool;
}

impl ProjectElement {
    pub fn project(path: impl Into<PathBuf>, children: Vec<ProjectElement>) -> Self {
        Self {
            kind: ElementKind::Project,
            path: path.into(),
            children,
        }
    }

    pub fn folder(path: impl Into<PathBuf>, children: Vec<ProjectElement>) -> Self {
        Self {
            kind: ElementKind::Folder,
            path: path.into(),
            children,
        }
    }

    pub fn unit(path: impl Into<PathBuf>, kind: UnitKind, membership: Membership) -> Self {
        Self {
            kind: ElementKind::TranslationUnit { kind, membership },
            path: path.into(),
            children: Vec::new(),
        }
    }

    pub fn other(path: impl Into<PathBuf>) -> Self {
        Self {
            kind: ElementKind::Other,
            path: path.into(),
            children: Vec::new(),
        }
    }

    pub fn kind(&self) -> ElementKind {
        self.kind
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn children(&self) -> &[ProjectElement] {
        &self.children
    }

    pub fn push_child(&mut self, child: ProjectElement) {
        self.children.push(child);
    }

    pub fn is_container(&self) -> bool {
        matches!(self.kind, ElementKind::Project | ElementKind::Folder)
    }

    /// Compilation input for a translation unit element
    pub fn as_input(&self) -> Option<CompilationInput> {
        match self.kind {
            ElementKind::TranslationUnit { kind, membership } => {
                Some(CompilationInput::new(self.path.clone(), kind, membership))
            }
            _ => None,
        }
    }

    /// Depth-first pre-order traversal
    pub fn accept(&self, visitor: &mut dyn ElementVisitor) {
        if visitor.visit(self) {
            for child in &self.children {
                child.accept(visitor);
            }
        }
    }

    /// Find the element for a path below (or at) this node
    pub fn find(&self, path: &Path) -> Option<&ProjectElement> {
        if self.path == path {
            return Some(self);
        }
        if !self.is_container() || !path.starts_with(&self.path) {
            return None;
        }
        self.children.iter().find_map(|child| child.find(path))
    }
}
