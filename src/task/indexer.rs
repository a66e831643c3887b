//! Indexer: per-project context shared by every task it creates

use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use tracing::debug;

use crate::cache::FileExistenceCache;
use crate::config::{IndexerConfig, IndexerMode};
use crate::delta::{ChangeClassification, ElementDelta};
use crate::engine::{ParseContext, ParseEngine};
use crate::index::SharedIndex;
use crate::io::{FileSystemTrait, RealFileSystem};
use crate::project::element::CompilationInput;
use crate::project::model::{ProjectId, ProjectModel};
use crate::project::workspace::Workspace;
use crate::resolve::{IncludeHeuristics, IncludeResolver, ProjectSearch};
use crate::task::task::{IndexerTask, TaskKind};
use crate::task::update::{UpdateOptions, UpdateScope};

/// Indexing setup of one project
pub struct Indexer {
    project: RwLock<Arc<ProjectModel>>,
    search: Arc<dyn ProjectSearch>,
    config: IndexerConfig,
    mode: IndexerMode,
    index: SharedIndex,
    engine: Arc<dyn ParseEngine>,
    fs: Arc<dyn FileSystemTrait>,
}

impl Indexer {
    pub fn builder(
        project: Arc<ProjectModel>,
        index: SharedIndex,
        engine: Arc<dyn ParseEngine>,
    ) -> IndexerBuilder {
        IndexerBuilder {
            project,
            index,
            engine,
            search: None,
            config: IndexerConfig::default(),
            mode: IndexerMode::Fast,
            fs: None,
        }
    }

    /// Current project model
    pub fn project(&self) -> Arc<ProjectModel> {
        let project = self.project.read().unwrap_or_else(|e| e.into_inner());
        Arc::clone(&project)
    }

    /// Swap in a rescanned model; running tasks keep the one they started with
    pub fn set_project(&self, model: Arc<ProjectModel>) {
        let mut project = self.project.write().unwrap_or_else(|e| e.into_inner());
        debug!("Indexer for {}: project model replaced", model.id());
        *project = model;
    }

    pub fn project_id(&self) -> ProjectId {
        self.project().id().clone()
    }

    pub fn config(&self) -> &IndexerConfig {
        &self.config
    }

    pub fn mode(&self) -> IndexerMode {
        self.mode
    }

    pub fn index(&self) -> &SharedIndex {
        &self.index
    }

    pub(crate) fn engine(&self) -> &Arc<dyn ParseEngine> {
        &self.engine
    }

    pub(crate) fn file_system(&self) -> &Arc<dyn FileSystemTrait> {
        &self.fs
    }

    /// Concrete task for the given sets, flavored by the indexer mode
    pub fn create_task(
        self: &Arc<Self>,
        forced: Vec<CompilationInput>,
        changed: Vec<CompilationInput>,
        removed: Vec<CompilationInput>,
    ) -> Arc<IndexerTask> {
        let inputs = ChangeClassification::from_lists(forced, changed, removed);
        Arc::new(IndexerTask::new(self.concrete_kind(inputs), Arc::clone(self)))
    }

    pub fn rebuild_task(self: &Arc<Self>) -> Arc<IndexerTask> {
        Arc::new(IndexerTask::new(TaskKind::Rebuild, Arc::clone(self)))
    }

    pub fn import_task(self: &Arc<Self>) -> Arc<IndexerTask> {
        Arc::new(IndexerTask::new(TaskKind::Import, Arc::clone(self)))
    }

    pub fn notify_task(self: &Arc<Self>) -> Arc<IndexerTask> {
        Arc::new(IndexerTask::new(TaskKind::Notify, Arc::clone(self)))
    }

    pub fn update_task(
        self: &Arc<Self>,
        scope: UpdateScope,
        options: UpdateOptions,
    ) -> Arc<IndexerTask> {
        Arc::new(IndexerTask::new(
            TaskKind::Update { scope, options },
            Arc::clone(self),
        ))
    }

    /// Task for a change notification; the delta is analyzed before returning
    pub async fn resource_delta_task(self: &Arc<Self>, delta: ElementDelta) -> Arc<IndexerTask> {
        let task = Arc::new(IndexerTask::new(
            TaskKind::ResourceDelta(Box::new(delta)),
            Arc::clone(self),
        ));
        task.prepare().await;
        task
    }

    pub(crate) fn concrete_kind(&self, inputs: ChangeClassification) -> TaskKind {
        match self.mode {
            IndexerMode::Fast => TaskKind::Fast(inputs),
            IndexerMode::Full => TaskKind::Full(inputs),
        }
    }

    /// Fresh resolver for one run; caches are never shared between runs
    pub(crate) fn new_resolver(&self, mode: IndexerMode) -> IncludeResolver {
        let ignore_case = !self.config.is_case_sensitive();
        let cache = FileExistenceCache::new(Arc::clone(&self.fs), ignore_case)
            .with_bypass(self.config.bypass_file_exists_cache);
        let heuristics = (mode == IndexerMode::Full).then(|| {
            IncludeHeuristics::new(
                Arc::clone(&self.search),
                self.config.include_heuristics,
                ignore_case,
            )
        });
        IncludeResolver::new(cache, heuristics)
    }

    pub(crate) fn include_paths(&self) -> Vec<PathBuf> {
        let mut paths = self.config.include_paths.clone();
        for dir in self.project().include_dirs() {
            if !paths.contains(dir) {
                paths.push(dir.clone());
            }
        }
        paths
    }

    pub(crate) fn parse_context(&self, mode: IndexerMode, resolver: Arc<IncludeResolver>) -> ParseContext {
        ParseContext {
            mode,
            index: self.index.clone(),
            resolver,
            skip_references: self.config.skip_references,
            include_paths: self.include_paths(),
            file_size_limit: self.config.file_size_limit,
        }
    }
}

pub struct IndexerBuilder {
    project: Arc<ProjectModel>,
    index: SharedIndex,
    engine: Arc<dyn ParseEngine>,
    search: Option<Arc<dyn ProjectSearch>>,
    config: IndexerConfig,
    mode: IndexerMode,
    fs: Option<Arc<dyn FileSystemTrait>>,
}

impl IndexerBuilder {
    pub fn config(mut self, config: IndexerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn mode(mut self, mode: IndexerMode) -> Self {
        self.mode = mode;
        self
    }

    /// Workspace used by the include heuristic; defaults to this project alone
    pub fn search(mut self, search: Arc<dyn ProjectSearch>) -> Self {
        self.search = Some(search);
        self
    }

    pub fn file_system(mut self, fs: Arc<dyn FileSystemTrait>) -> Self {
        self.fs = Some(fs);
        self
    }

    pub fn build(self) -> Arc<Indexer> {
        let fs = self
            .fs
            .unwrap_or_else(|| Arc::new(RealFileSystem) as Arc<dyn FileSystemTrait>);
        let search = self.search.unwrap_or_else(|| {
            let mut workspace = Workspace::new(Arc::clone(&fs));
            workspace.add_project(Arc::clone(&self.project), Vec::new());
            Arc::new(workspace) as Arc<dyn ProjectSearch>
        });
        let index = self.index.with_lock_timeout(self.config.lock_timeout);

        debug!(
            "Created {} indexer for project {}",
            self.mode,
            self.project.id()
        );
        Arc::new(Indexer {
            project: RwLock::new(self.project),
            search,
            config: self.config,
            mode: self.mode,
            index,
            engine: self.engine,
            fs,
        })
    }
}
