use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::io::FileSystemTrait;
use crate::project::error::ProjectError;
use crate::project::model::{ProjectId, ProjectModel};
use crate::resolve::ProjectSearch;

/// One project registered in a workspace
#[derive(Debug, Clone)]
pub struct WorkspaceProject {
    pub model: Arc<ProjectModel>,

    /// Projects this project depends on for headers
    pub references: Vec<ProjectId>,

    /// Closed projects are not searched by the include heuristic
    pub open: bool,
}

/// Collection of projects indexed together
///
/// The workspace answers the location queries the include heuristic needs:
/// which project owns a file, which projects a project references, and where a
/// header with a given name lives.
pub struct Workspace {
    projects: BTreeMap<ProjectId, WorkspaceProject>,
    fs: Arc<dyn FileSystemTrait>,
    created_at: DateTime<Utc>,
}

impl Workspace {
    pub fn new(fs: Arc<dyn FileSystemTrait>) -> Self {
        Self {
            projects: BTreeMap::new(),
            fs,
            created_at: Utc::now(),
        }
    }

    /// Register a project, replacing any earlier model with the same id
    pub fn add_project(&mut self, model: Arc<ProjectModel>, references: Vec<ProjectId>) {
        let id = model.id().clone();
        self.projects.insert(
            id,
            WorkspaceProject {
                model,
                references,
                open: true,
            },
        );
    }

    /// Replace the model of an already registered project
    pub fn update_model(&mut self, model: Arc<ProjectModel>) -> Result<(), ProjectError> {
        let entry = self
            .projects
            .get_mut(model.id())
            .ok_or_else(|| ProjectError::UnknownProject {
                name: model.id().to_string(),
            })?;
        entry.model = model;
        Ok(())
    }

    pub fn set_open(&mut self, id: &ProjectId, open: bool) -> Result<(), ProjectError> {
        let entry = self
            .projects
            .get_mut(id)
            .ok_or_else(|| ProjectError::UnknownProject {
                name: id.to_string(),
            })?;
        entry.open = open;
        Ok(())
    }

    pub fn project(&self, id: &ProjectId) -> Option<&WorkspaceProject> {
        self.projects.get(id)
    }

    pub fn project_count(&self) -> usize {
        self.projects.len()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Project whose root is the longest prefix of `path`
    fn owning_project(&self, path: &Path) -> Option<&WorkspaceProject> {
        self.projects
            .values()
            .filter(|p| p.model.contains(path))
            .max_by_key(|p| p.model.root().components().count())
    }
}

impl ProjectSearch for Workspace {
    fn canonical_location(&self, path: &Path) -> Option<PathBuf> {
        let location = self
            .fs
            .canonicalize(path)
            .unwrap_or_else(|_| path.to_path_buf());
        self.owning_project(&location)?;
        Some(location)
    }

    fn project_of(&self, path: &Path) -> Option<ProjectId> {
        self.owning_project(path).map(|p| p.model.id().clone())
    }

    fn referenced_projects(&self, project: &ProjectId) -> Vec<ProjectId> {
        self.projects
            .get(project)
            .map(|p| p.references.clone())
            .unwrap_or_default()
    }

    fn is_accessible(&self, project: &ProjectId) -> bool {
        self.projects.get(project).is_some_and(|p| p.open)
    }

    fn find_files_by_name(
        &self,
        projects: &[ProjectId],
        name: &Path,
        ignore_case: bool,
    ) -> Vec<PathBuf> {
        let mut found = Vec::new();
        for id in projects {
            if let Some(project) = self.projects.get(id) {
                found.extend(project.model.files_matching(name, ignore_case));
            }
        }
        found
    }
}
