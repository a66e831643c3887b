//! Project model: the logical element tree of one project
//!
//! The model is scanned from disk with walkdir. Sources listed by the build
//! configuration (compile_commands.json) are members; every other C/C++ file is
//! a potential translation unit.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::project::compilation_database::CompilationDatabase;
use crate::project::element::{ElementKind, Membership, ProjectElement, UnitKind};
use crate::project::error::ProjectError;

/// Stable identity of a project within a workspace
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ProjectId(String);

impl ProjectId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ProjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Options for configuring project scanning behavior
#[derive(Debug, Clone)]
pub struct ScanOptions {
    /// Skip hidden directories (starting with '.')
    pub skip_hidden: bool,

    /// Follow symbolic links during traversal
    pub follow_symlinks: bool,

    /// Build directory holding compile_commands.json; excluded from the tree
    pub build_dir: Option<PathBuf>,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            skip_hidden: true,
            follow_symlinks: false,
            build_dir: None,
        }
    }
}

/// Logical tree of a single project plus its build configuration
#[derive(Debug, Clone)]
pub struct ProjectModel {
    id: ProjectId,
    root: PathBuf,
    tree: ProjectElement,
    include_dirs: Vec<PathBuf>,
    scanned_at: DateTime<Utc>,
}

impl ProjectModel {
    /// Create a model from an already built tree
    pub fn from_tree(id: ProjectId, tree: ProjectElement) -> Self {
        Self {
            id,
            root: tree.path().to_path_buf(),
            tree,
            include_dirs: Vec::new(),
            scanned_at: Utc::now(),
        }
    }

    /// Scan a project root directory
    pub fn scan(id: ProjectId, root: &Path, options: &ScanOptions) -> Result<Self, ProjectError> {
        if !root.exists() {
            return Err(ProjectError::PathNotFound {
                path: root.to_string_lossy().to_string(),
            });
        }
        if !root.is_dir() {
            return Err(ProjectError::InvalidRoot {
                path: root.to_string_lossy().to_string(),
            });
        }
        let root = root.canonicalize()?;

        let build_dir = options
            .build_dir
            .as_ref()
            .map(|dir| dir.canonicalize().unwrap_or_else(|_| dir.clone()));

        let database = match &build_dir {
            Some(dir) => Some(CompilationDatabase::new(dir.join("compile_commands.json"))?),
            None => None,
        };
        let members: Option<BTreeSet<PathBuf>> = database.as_ref().map(|db| {
            db.member_files()
                .into_iter()
                .map(|p| p.canonicalize().unwrap_or(p))
                .collect()
        });

        let mut walker = WalkDir::new(&root).sort_by_file_name();
        if options.follow_symlinks {
            walker = walker.follow_links(true);
        }

        let skip_hidden = options.skip_hidden;
        let excluded = build_dir.clone();
        let entries = walker.into_iter().filter_entry(move |entry| {
            if entry.depth() == 0 {
                return true;
            }
            if skip_hidden && entry.file_name().to_string_lossy().starts_with('.') {
                return false;
            }
            excluded.as_deref() != Some(entry.path())
        });

        let mut stack = vec![ProjectElement::project(&root, Vec::new())];
        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Failed to access directory entry: {}", e);
                    continue;
                }
            };
            if entry.depth() == 0 {
                continue;
            }

            let path = entry.path();
            close_finished_folders(&mut stack, path);

            let element = if entry.file_type().is_dir() {
                stack.push(ProjectElement::folder(path, Vec::new()));
                continue;
            } else {
                match UnitKind::classify(path) {
                    Some(UnitKind::Source) => {
                        let membership = match &members {
                            Some(members) if !members.contains(path) => Membership::Potential,
                            _ => Membership::Member,
                        };
                        ProjectElement::unit(path, UnitKind::Source, membership)
                    }
                    Some(UnitKind::Header) => {
                        ProjectElement::unit(path, UnitKind::Header, Membership::Potential)
                    }
                    None => ProjectElement::other(path),
                }
            };
            if let Some(parent) = stack.last_mut() {
                parent.push_child(element);
            }
        }
        close_finished_folders(&mut stack, &root);

        let tree = stack.pop().ok_or_else(|| ProjectError::Scan {
            reason: "project root missing from scan".to_string(),
        })?;

        let include_dirs = database
            .as_ref()
            .map(CompilationDatabase::include_dirs)
            .unwrap_or_default();

        let model = Self {
            id,
            root,
            tree,
            include_dirs,
            scanned_at: Utc::now(),
        };
        debug!(
            "Scanned project {} at {}: {} translation units",
            model.id,
            model.root.display(),
            model.unit_count()
        );
        Ok(model)
    }

    pub fn id(&self) -> &ProjectId {
        &self.id
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn tree(&self) -> &ProjectElement {
        &self.tree
    }

    /// Include directories declared by the build configuration
    pub fn include_dirs(&self) -> &[PathBuf] {
        &self.include_dirs
    }

    pub fn scanned_at(&self) -> DateTime<Utc> {
        self.scanned_at
    }

    /// Look up the element for a path
    pub fn find(&self, path: &Path) -> Option<&ProjectElement> {
        self.tree.find(path)
    }

    pub fn contains(&self, path: &Path) -> bool {
        path.starts_with(&self.root)
    }

    /// Number of translation units in the tree
    pub fn unit_count(&self) -> usize {
        let mut count = 0;
        count_units(&self.tree, &mut count);
        count
    }

    /// All files (units and other resources) whose path ends with `suffix`
    pub fn files_matching(&self, suffix: &Path, ignore_case: bool) -> Vec<PathBuf> {
        let mut found = Vec::new();
        collect_matching(&self.tree, suffix, ignore_case, &mut found);
        found
    }
}

/// Pop folders off the stack until the top is an ancestor of `path`
fn close_finished_folders(stack: &mut Vec<ProjectElement>, path: &Path) {
    while stack.len() > 1 {
        let is_ancestor = stack
            .last()
            .map(|top| path != top.path() && path.starts_with(top.path()))
            .unwrap_or(false);
        if is_ancestor {
            break;
        }
        if let Some(done) = stack.pop()
            && let Some(parent) = stack.last_mut()
        {
            parent.push_child(done);
        }
    }
}

fn count_units(element: &ProjectElement, count: &mut usize) {
    if matches!(element.kind(), ElementKind::TranslationUnit { .. }) {
        *count += 1;
    }
    for child in element.children() {
        count_units(child, count);
    }
}

fn collect_matching(
    element: &ProjectElement,
    suffix: &Path,
    ignore_case: bool,
    found: &mut Vec<PathBuf>,
) {
    if element.is_container() {
        for child in element.children() {
            collect_matching(child, suffix, ignore_case, found);
        }
    } else if path_ends_with(element.path(), suffix, ignore_case) {
        found.push(element.path().to_path_buf());
    }
}

/// Component-wise suffix match, optionally ignoring ASCII case
pub(crate) fn path_ends_with(path: &Path, suffix: &Path, ignore_case: bool) -> bool {
    let mut path_components = path.components().rev();
    for wanted in suffix.components().rev() {
        let Some(actual) = path_components.next() else {
            return false;
        };
        let (actual, wanted) = (actual.as_os_str(), wanted.as_os_str());
        let matches = if ignore_case {
            actual.eq_ignore_ascii_case(wanted)
        } else {
            actual == wanted
        };
        if !matches {
            return false;
        }
    }
    true
}
