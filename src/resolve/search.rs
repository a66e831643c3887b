use std::path::{Path, PathBuf};

use crate::project::model::ProjectId;

/// Workspace queries needed to resolve includes across projects
#[cfg_attr(test, mockall::automock)]
pub trait ProjectSearch: Send + Sync {
    /// Canonical location of a file, or None when it is not part of the workspace
    fn canonical_location(&self, path: &Path) -> Option<PathBuf>;

    /// Project owning a location
    fn project_of(&self, path: &Path) -> Option<ProjectId>;

    /// Projects directly referenced by `project`
    fn referenced_projects(&self, project: &ProjectId) -> Vec<ProjectId>;

    /// Whether a project exists and is open
    fn is_accessible(&self, project: &ProjectId) -> bool;

    /// Files in `projects` whose path ends with `name`, component-wise
    fn find_files_by_name(
        &self,
        projects: &[ProjectId],
        name: &Path,
        ignore_case: bool,
    ) -> Vec<PathBuf>;
}
