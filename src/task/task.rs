//! Indexer tasks
//!
//! Fast and Full tasks index an explicit set of files. Update, ResourceDelta,
//! Rebuild and Import tasks are composites: they work out the file sets first
//! and hand them to a concrete delegate created with a child cancellation
//! token. Notify only tells listeners to reload.

use chrono::{DateTime, Utc};
use std::collections::{HashSet, VecDeque};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Instant;
use tokio::sync::{OnceCell, watch};
use tokio_util::sync::CancellationToken;
use tracing::{Level, debug, info, trace, warn};
use uuid::Uuid;

use crate::cache::CacheReclaimer;
use crate::config::IndexerMode;
use crate::delta::{ChangeClassification, Classification, DeltaAnalyzer, ElementDelta};
use crate::engine::digest::content_hash;
use crate::engine::ParseContext;
use crate::index::{FileRecord, IndexEvent, IndexStore};
use crate::io::FileSystemTrait;
use crate::project::element::CompilationInput;
use crate::project::model::ProjectId;
use crate::project::{HeaderSink, TranslationUnitCollector};
use crate::resolve::IncludeResolver;
use crate::task::indexer::Indexer;
use crate::task::monitor::{TaskEvent, TaskMonitor};
use crate::task::progress::{IndexerProgress, ProgressCounters};
use crate::task::state::{TaskError, TaskState};
use crate::task::update::{UpdateOptions, UpdateScope};

/// What a task does
#[derive(Debug, Clone)]
pub enum TaskKind {
    Fast(ChangeClassification),
    Full(ChangeClassification),
    Update {
        scope: UpdateScope,
        options: UpdateOptions,
    },
    ResourceDelta(Box<ElementDelta>),
    Rebuild,
    Import,
    Notify,
}

impl TaskKind {
    pub fn name(&self) -> &'static str {
        match self {
            TaskKind::Fast(_) => "fast",
            TaskKind::Full(_) => "full",
            TaskKind::Update { .. } => "update",
            TaskKind::ResourceDelta(_) => "resource-delta",
            TaskKind::Rebuild => "rebuild",
            TaskKind::Import => "import",
            TaskKind::Notify => "notify",
        }
    }

    /// Whether the task delegates its work to a concrete task
    pub fn is_composite(&self) -> bool {
        matches!(
            self,
            TaskKind::Update { .. } | TaskKind::ResourceDelta(_) | TaskKind::Rebuild | TaskKind::Import
        )
    }

    fn concrete(&self) -> Option<(IndexerMode, &ChangeClassification)> {
        match self {
            TaskKind::Fast(inputs) => Some((IndexerMode::Fast, inputs)),
            TaskKind::Full(inputs) => Some((IndexerMode::Full, inputs)),
            _ => None,
        }
    }
}

/// Files merged in from tasks that arrived while this one was queued or running
#[derive(Default)]
struct UrgentQueue {
    removed: VecDeque<CompilationInput>,
    forced: VecDeque<CompilationInput>,
    changed: VecDeque<CompilationInput>,
    /// Set once the run loop stops taking work; nothing is accepted after that
    closed: bool,
}

enum Work {
    Remove(CompilationInput),
    Parse(CompilationInput, bool),
}

pub struct IndexerTask {
    id: Uuid,
    kind: TaskKind,
    indexer: Arc<Indexer>,
    cancel: CancellationToken,
    state: watch::Sender<TaskState>,
    delegate: OnceLock<Arc<IndexerTask>>,
    prepared: OnceCell<Result<(), TaskError>>,
    counters: ProgressCounters,
    urgent: Mutex<UrgentQueue>,
    reclaimer: Mutex<Option<CacheReclaimer>>,
    created_at: DateTime<Utc>,
}

impl IndexerTask {
    pub fn new(kind: TaskKind, indexer: Arc<Indexer>) -> Self {
        Self::with_token(kind, indexer, CancellationToken::new())
    }

    fn with_token(kind: TaskKind, indexer: Arc<Indexer>, cancel: CancellationToken) -> Self {
        let (state, _) = watch::channel(TaskState::Created);
        Self {
            id: Uuid::new_v4(),
            kind,
            indexer,
            cancel,
            state,
            delegate: OnceLock::new(),
            prepared: OnceCell::new(),
            counters: ProgressCounters::default(),
            urgent: Mutex::new(UrgentQueue::default()),
            reclaimer: Mutex::new(None),
            created_at: Utc::now(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn kind(&self) -> &TaskKind {
        &self.kind
    }

    pub fn indexer(&self) -> &Arc<Indexer> {
        &self.indexer
    }

    pub fn project_id(&self) -> ProjectId {
        self.indexer.project_id()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn state(&self) -> TaskState {
        *self.state.borrow()
    }

    /// Watch state transitions
    pub fn subscribe(&self) -> watch::Receiver<TaskState> {
        self.state.subscribe()
    }

    /// Token observed by this task and its delegate
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn cancel(&self) {
        debug!("Cancelling {} task {}", self.kind.name(), self.id);
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Concrete task the composite handed its work to, once derived
    pub fn delegate(&self) -> Option<&Arc<IndexerTask>> {
        self.delegate.get()
    }

    /// File sets of a concrete task
    pub fn inputs(&self) -> Option<&ChangeClassification> {
        self.kind.concrete().map(|(_, inputs)| inputs)
    }

    /// Progress of the task, or of its delegate for composites
    pub fn progress(&self) -> IndexerProgress {
        match &self.kind {
            TaskKind::Fast(_) | TaskKind::Full(_) => self.counters.snapshot(),
            TaskKind::Notify => IndexerProgress::placeholder(),
            _ => self
                .delegate
                .get()
                .map(|delegate| delegate.progress())
                .unwrap_or_else(IndexerProgress::placeholder),
        }
    }

    /// Merge the files of `other` into this task's queue
    ///
    /// Only a concrete task (or a composite through its delegate) that has not
    /// stopped taking work absorbs a concrete task of the same flavor for the
    /// same project. `other` must not have started yet.
    pub fn accept_urgent_task(&self, other: &IndexerTask) -> bool {
        if self.kind.is_composite() {
            return self
                .delegate
                .get()
                .is_some_and(|delegate| delegate.accept_urgent_task(other));
        }
        let Some((mode, _)) = self.kind.concrete() else {
            return false;
        };
        let Some((other_mode, inputs)) = other.concrete_work() else {
            return false;
        };
        if other_mode != mode || other.state() != TaskState::Created {
            return false;
        }
        if !Arc::ptr_eq(&self.indexer, &other.indexer) && self.project_id() != other.project_id() {
            trace!(
                "Task {} refuses work for project {}",
                self.id,
                other.project_id()
            );
            return false;
        }

        let mut urgent = self.urgent.lock().unwrap_or_else(|e| e.into_inner());
        if urgent.closed || self.cancel.is_cancelled() {
            return false;
        }
        urgent.removed.extend(inputs.removed().iter().cloned());
        for input in inputs.forced().iter() {
            self.counters.add_remaining(input.is_header(), 1);
            urgent.forced.push_back(input.clone());
        }
        for input in inputs.changed().iter() {
            self.counters.add_remaining(input.is_header(), 1);
            urgent.changed.push_back(input.clone());
        }
        debug!(
            "Task {} absorbed {} files from task {}",
            self.id,
            inputs.len(),
            other.id
        );
        true
    }

    /// Concrete file sets of this task or of its delegate
    fn concrete_work(&self) -> Option<(IndexerMode, &ChangeClassification)> {
        match self.kind.concrete() {
            Some(work) => Some(work),
            None => self.delegate.get()?.concrete_work(),
        }
    }

    /// Work out a composite's delegate; runs at most once
    ///
    /// Returns false when the file sets could not be derived, in which case
    /// the task finishes as failed without a delegate.
    pub async fn prepare(&self) -> bool {
        self.prepared
            .get_or_init(|| self.derive_delegate())
            .await
            .is_ok()
    }

    /// Drop the file-existence cache of the current run
    pub fn reclaim_memory(&self) -> bool {
        let reclaimed = self
            .reclaimer
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .is_some_and(CacheReclaimer::reclaim);
        let delegated = self
            .delegate
            .get()
            .is_some_and(|delegate| delegate.reclaim_memory());
        reclaimed || delegated
    }

    /// Run the task to completion; a second call only returns the state
    pub fn run<'a>(
        &'a self,
        monitor: &'a TaskMonitor,
    ) -> Pin<Box<dyn Future<Output = TaskState> + Send + 'a>> {
        Box::pin(async move {
            let started = self.state.send_if_modified(|state| {
                if *state == TaskState::Created {
                    *state = TaskState::Running;
                    true
                } else {
                    false
                }
            });
            if !started {
                warn!("Task {} has already been run", self.id);
                return self.state();
            }

            let project = self.project_id();
            info!("Starting {} task {} for {}", self.kind.name(), self.id, project);
            monitor.emit(TaskEvent::Started {
                task_id: self.id,
                kind: self.kind.name(),
                project,
            });

            let start = Instant::now();
            let mut state = match &self.kind {
                TaskKind::Fast(inputs) => self.run_concrete(IndexerMode::Fast, inputs, monitor).await,
                TaskKind::Full(inputs) => self.run_concrete(IndexerMode::Full, inputs, monitor).await,
                TaskKind::Notify => {
                    self.indexer.index().notify(IndexEvent::Reloaded);
                    TaskState::Completed
                }
                _ => self.run_composite(monitor).await,
            };
            if state == TaskState::Completed && self.cancel.is_cancelled() {
                state = TaskState::Cancelled;
            }
            self.state.send_replace(state);
            crate::log_timing!(Level::DEBUG, self.kind.name(), start.elapsed());

            let progress = self.progress();
            info!(
                "{} task {} {}: {} indexed, {} skipped, {} remaining",
                self.kind.name(),
                self.id,
                state,
                progress.completed(),
                progress.skipped,
                progress.remaining()
            );
            monitor.emit(TaskEvent::Finished {
                task_id: self.id,
                state,
                progress,
            });
            state
        })
    }

    async fn run_composite(&self, monitor: &TaskMonitor) -> TaskState {
        if !self.prepare().await {
            return TaskState::Failed;
        }
        match self.delegate.get() {
            Some(delegate) => {
                monitor.emit(TaskEvent::DelegateCreated {
                    task_id: self.id,
                    delegate_id: delegate.id,
                    files: delegate.inputs().map_or(0, ChangeClassification::len),
                });
                delegate.run(monitor).await
            }
            None if self.cancel.is_cancelled() => TaskState::Cancelled,
            None => TaskState::Completed,
        }
    }

    async fn derive_delegate(&self) -> Result<(), TaskError> {
        if self.cancel.is_cancelled() {
            return Ok(());
        }

        let derived = match &self.kind {
            TaskKind::Update { scope, options } => self.derive_update(scope, *options).await,
            TaskKind::ResourceDelta(delta) => self.derive_resource_delta(delta).await,
            TaskKind::Rebuild => self.derive_rebuild().await,
            TaskKind::Import => {
                debug!("Import task {}: no stored index to import, rebuilding", self.id);
                self.derive_rebuild().await
            }
            _ => return Ok(()),
        };

        match derived {
            Ok(inputs) if inputs.is_empty() => {
                debug!("{} task {}: nothing to index", self.kind.name(), self.id);
                Ok(())
            }
            Ok(inputs) => {
                let files = inputs.len();
                let delegate = IndexerTask::with_token(
                    self.indexer.concrete_kind(inputs),
                    Arc::clone(&self.indexer),
                    self.cancel.child_token(),
                );
                debug!(
                    "{} task {} delegates {} files to {} task {}",
                    self.kind.name(),
                    self.id,
                    files,
                    delegate.kind.name(),
                    delegate.id
                );
                let _ = self.delegate.set(Arc::new(delegate));
                Ok(())
            }
            Err(e) => {
                warn!(
                    "{} task {} produced no work: {}",
                    self.kind.name(),
                    self.id,
                    e
                );
                Err(e)
            }
        }
    }

    async fn derive_resource_delta(&self, delta: &ElementDelta) -> Result<ChangeClassification, TaskError> {
        let config = self.indexer.config();
        let index = self.indexer.index().read().await?;

        let mut analyzer = DeltaAnalyzer::new()
            .suppress_raw_delta(config.suppress_raw_delta)
            .with_cancellation(self.cancel.clone());
        analyzer.analyze_delta(delta)?;
        let mut inputs = analyzer.into_classification();

        inputs.removed_mut().retain(|input| index.contains(input.path()));
        inputs.changed_mut().retain(|input| {
            input.is_member()
                || config.index_all_files
                || (input.is_header() && config.index_unused_headers)
                || index.contains(input.path())
                || !index.includers_of(input.path()).is_empty()
        });
        drop(index);

        trace!(
            "Delta for {}: {} forced, {} changed, {} removed",
            self.project_id(),
            inputs.forced().len(),
            inputs.changed().len(),
            inputs.removed().len()
        );
        Ok(inputs)
    }

    async fn derive_rebuild(&self) -> Result<ChangeClassification, TaskError> {
        let project = self.indexer.project();
        let root = project.root().to_path_buf();

        let removed = self.indexer.index().write().await?.clear_below(&root);
        info!("Cleared {} index records below {:?}", removed, root);
        self.indexer
            .index()
            .notify(IndexEvent::Cleared { root, removed });

        let mut sources = Vec::new();
        let mut headers = Vec::new();
        TranslationUnitCollector::new(&mut sources, HeaderSink::Separate(&mut headers), &self.cancel)
            .collect(project.tree());
        sources.append(&mut headers);
        Ok(ChangeClassification::from_lists(Vec::new(), sources, Vec::new()))
    }

    async fn derive_update(
        &self,
        scope: &UpdateScope,
        options: UpdateOptions,
    ) -> Result<ChangeClassification, TaskError> {
        let project = self.indexer.project();
        let fs = self.indexer.file_system();

        let mut candidates = Vec::new();
        let mut roots = Vec::new();
        match scope {
            UpdateScope::Project => {
                TranslationUnitCollector::new(&mut candidates, HeaderSink::Merged, &self.cancel)
                    .collect(project.tree());
                roots.push(project.root().to_path_buf());
            }
            UpdateScope::Selection(paths) => {
                for path in paths {
                    match project.find(path) {
                        Some(element) if element.is_container() => {
                            TranslationUnitCollector::new(&mut candidates, HeaderSink::Merged, &self.cancel)
                                .collect(element);
                            roots.push(path.clone());
                        }
                        Some(element) => candidates.extend(element.as_input()),
                        None => roots.push(path.clone()),
                    }
                }
            }
        }

        let resolver = options
            .unresolved_includes
            .then(|| self.indexer.new_resolver(self.indexer.mode()));
        let include_paths = self.indexer.include_paths();

        // Snapshot the records so that stat, hashing and resolution run unlocked
        let (records, indexed_below) = {
            let index = self.indexer.index().read().await?;
            let records: Vec<Option<FileRecord>> = candidates
                .iter()
                .map(|input| index.get(input.path()).cloned())
                .collect();
            let indexed_below: Vec<CompilationInput> = roots
                .iter()
                .flat_map(|root| index.files_below(root))
                .filter_map(|path| {
                    let record = index.get(&path)?;
                    Some(CompilationInput::new(path, record.kind, record.membership))
                })
                .collect();
            (records, indexed_below)
        };

        let mut inputs = ChangeClassification::new();
        for (input, record) in candidates.into_iter().zip(records) {
            if self.cancel.is_cancelled() {
                break;
            }
            if options.update_all {
                inputs.classify(input, Classification::Forced);
                continue;
            }
            let stale = match &record {
                None => true,
                Some(record) => {
                    is_stale(record, options, fs.as_ref())
                        || resolver
                            .as_ref()
                            .is_some_and(|r| resolves_now(record, r, &include_paths))
                }
            };
            if stale {
                inputs.classify(input, Classification::Changed);
            }
        }

        for input in indexed_below {
            if !fs.exists(input.path()) {
                inputs.classify(input, Classification::Removed);
            }
        }
        Ok(inputs)
    }

    async fn run_concrete(
        &self,
        mode: IndexerMode,
        inputs: &ChangeClassification,
        monitor: &TaskMonitor,
    ) -> TaskState {
        let resolver = Arc::new(self.indexer.new_resolver(mode));
        *self.reclaimer.lock().unwrap_or_else(|e| e.into_inner()) = Some(resolver.reclaimer());
        let ctx = self.indexer.parse_context(mode, Arc::clone(&resolver));

        self.counters.start();
        for input in inputs.forced().iter().chain(inputs.changed().iter()) {
            self.counters.add_remaining(input.is_header(), 1);
        }

        for input in inputs.removed().iter() {
            if self.cancel.is_cancelled() {
                break;
            }
            self.remove_one(input, &ctx, monitor).await;
        }

        let mut processed = HashSet::new();
        let mut forced = inputs.forced().iter();
        let mut changed = inputs.changed().iter();
        while !self.cancel.is_cancelled() {
            match self.next_work(&mut forced, &mut changed) {
                Some(Work::Remove(input)) => self.remove_one(&input, &ctx, monitor).await,
                Some(Work::Parse(input, is_forced)) => {
                    self.index_one(&input, is_forced, &ctx, &mut processed, monitor)
                        .await
                }
                None => break,
            }
        }
        self.urgent.lock().unwrap_or_else(|e| e.into_inner()).closed = true;
        *self.reclaimer.lock().unwrap_or_else(|e| e.into_inner()) = None;

        if self.cancel.is_cancelled() {
            TaskState::Cancelled
        } else {
            TaskState::Completed
        }
    }

    /// Urgent removals, forced and changed files go first, then the task's own
    fn next_work<'i>(
        &self,
        forced: &mut impl Iterator<Item = &'i CompilationInput>,
        changed: &mut impl Iterator<Item = &'i CompilationInput>,
    ) -> Option<Work> {
        let mut urgent = self.urgent.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(input) = urgent.removed.pop_front() {
            return Some(Work::Remove(input));
        }
        if let Some(input) = urgent.forced.pop_front() {
            return Some(Work::Parse(input, true));
        }
        if let Some(input) = urgent.changed.pop_front() {
            return Some(Work::Parse(input, false));
        }
        if let Some(input) = forced.next() {
            return Some(Work::Parse(input.clone(), true));
        }
        if let Some(input) = changed.next() {
            return Some(Work::Parse(input.clone(), false));
        }
        urgent.closed = true;
        None
    }

    async fn remove_one(&self, input: &CompilationInput, ctx: &ParseContext, monitor: &TaskMonitor) {
        let path = input.path().to_path_buf();
        match self.indexer.engine().remove_file(&path, ctx).await {
            Ok(_) => monitor.emit(TaskEvent::FileRemoved {
                task_id: self.id,
                path,
            }),
            Err(e) => {
                warn!("Failed to remove {:?} from the index: {}", path, e);
                monitor.emit(TaskEvent::FileFailed {
                    task_id: self.id,
                    path,
                    error: e.to_string(),
                });
            }
        }
    }

    async fn index_one(
        &self,
        input: &CompilationInput,
        forced: bool,
        ctx: &ParseContext,
        processed: &mut HashSet<PathBuf>,
        monitor: &TaskMonitor,
    ) {
        let header = input.is_header();
        if !processed.insert(input.path().to_path_buf()) {
            self.counters.drop_remaining(header);
            return;
        }

        let config = self.indexer.config();
        if input.is_source() && !input.is_member() && !config.index_all_files && !forced {
            self.skip(input.path(), header, "not part of the build", monitor);
            return;
        }

        // Unused headers are indexed in the context of a file including them
        let mut target = input.clone();
        let mut parse_forced = forced;
        if header && !forced && !config.index_unused_headers {
            match self.includer_of(input.path(), ctx).await {
                Some(includer) if processed.contains(includer.path()) => {
                    trace!("{:?} already indexed through its includer", input.path());
                    self.counters.complete(header);
                    return;
                }
                Some(includer) => {
                    processed.insert(includer.path().to_path_buf());
                    target = includer;
                    parse_forced = true;
                }
                None => {
                    self.skip(input.path(), header, "header is not included by an indexed file", monitor);
                    return;
                }
            }
        }

        if let Ok(metadata) = self.indexer.file_system().metadata(target.path())
            && metadata.size > config.file_size_limit
        {
            self.skip(target.path(), header, "file exceeds the size limit", monitor);
            return;
        }

        match self.indexer.engine().parse_file(&target, parse_forced, ctx).await {
            Ok(outcome) => {
                trace!("{:?}: {:?}", target.path(), outcome);
                monitor.emit(TaskEvent::FileIndexed {
                    task_id: self.id,
                    path: target.path().to_path_buf(),
                });
            }
            Err(e) => {
                warn!("Failed to index {:?}: {}", target.path(), e);
                monitor.emit(TaskEvent::FileFailed {
                    task_id: self.id,
                    path: target.path().to_path_buf(),
                    error: e.to_string(),
                });
            }
        }
        self.counters.complete(header);
    }

    async fn includer_of(&self, header: &Path, ctx: &ParseContext) -> Option<CompilationInput> {
        let index = match ctx.index.read().await {
            Ok(index) => index,
            Err(e) => {
                warn!("Cannot look up includers of {:?}: {}", header, e);
                return None;
            }
        };
        index.includers_of(header).into_iter().find_map(|path| {
            let record = index.get(&path)?;
            Some(CompilationInput::new(path, record.kind, record.membership))
        })
    }

    fn skip(&self, path: &Path, header: bool, reason: &str, monitor: &TaskMonitor) {
        debug!("Skipping {:?}: {}", path, reason);
        self.counters.skip(header);
        monitor.emit(TaskEvent::FileSkipped {
            task_id: self.id,
            path: path.to_path_buf(),
            reason: reason.to_string(),
        });
    }
}

impl std::fmt::Debug for IndexerTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexerTask")
            .field("id", &self.id)
            .field("kind", &self.kind.name())
            .field("state", &self.state())
            .finish()
    }
}

/// Whether the file on disk no longer matches its record
fn is_stale(record: &FileRecord, options: UpdateOptions, fs: &dyn FileSystemTrait) -> bool {
    let Ok(metadata) = fs.metadata(&record.path) else {
        return false;
    };
    if options.check_timestamps && record.is_outdated(&metadata) {
        return true;
    }
    if options.check_content_hash {
        return match fs.read(&record.path) {
            Ok(content) => content_hash(&content) != record.content_hash,
            Err(_) => false,
        };
    }
    false
}

/// Whether an include that failed before would resolve today
fn resolves_now(record: &FileRecord, resolver: &IncludeResolver, include_paths: &[PathBuf]) -> bool {
    record
        .includes
        .iter()
        .filter(|include| !include.is_resolved())
        .any(|include| {
            resolver
                .resolve_include(&include.name, include.system, &record.path, include_paths)
                .is_some()
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IndexerConfig;
    use crate::delta::{ChangeFlags, DeltaKind, ResourceDelta};
    use crate::engine::{DigestEngine, EngineError, MockParseEngine, ParseEngine, ParseOutcome};
    use crate::index::{INDEX_EVENT_CHANNEL_BUFFER_SIZE, IncludeDirective, MemoryIndex, SharedIndex};
    use crate::io::TestFileSystem;
    use crate::project::element::{Membership, ProjectElement, UnitKind};
    use crate::project::model::ProjectModel;
    use mockall::Sequence;
    use std::time::{Duration, SystemTime, UNIX_EPOCH};
    use tokio::sync::mpsc;

    #[cfg(feature = "test-logging")]
    crate::setup_test_logging!();

    fn member(path: &str) -> CompilationInput {
        CompilationInput::new(path, UnitKind::Source, Membership::Member)
    }

    fn indexed() -> Result<ParseOutcome, EngineError> {
        Ok(ParseOutcome::Indexed {
            includes: 0,
            unresolved: 0,
        })
    }

    fn model(id: &str, root: &str, units: Vec<ProjectElement>) -> Arc<ProjectModel> {
        Arc::new(ProjectModel::from_tree(
            ProjectId::new(id),
            ProjectElement::project(root, units),
        ))
    }

    fn indexer(
        project: Arc<ProjectModel>,
        engine: impl ParseEngine + 'static,
        fs: &TestFileSystem,
        index: SharedIndex,
        config: IndexerConfig,
    ) -> Arc<Indexer> {
        Indexer::builder(project, index, Arc::new(engine))
            .config(config)
            .file_system(Arc::new(fs.clone()))
            .build()
    }

    fn record(path: &str, modified: SystemTime, size: u64) -> FileRecord {
        FileRecord {
            path: PathBuf::from(path),
            kind: UnitKind::Source,
            membership: Membership::Member,
            modified,
            size,
            content_hash: String::new(),
            includes: Vec::new(),
            mode: IndexerMode::Fast,
            indexed_at: Utc::now(),
        }
    }

    fn parses(path: &'static str, forced: bool) -> impl Fn(&CompilationInput, &bool, &ParseContext) -> bool {
        move |input, f, _| input.path() == Path::new(path) && *f == forced
    }

    #[tokio::test]
    async fn test_concrete_task_order() {
        let mut engine = MockParseEngine::new();
        let mut seq = Sequence::new();
        engine
            .expect_remove_file()
            .withf(|path, _| path == Path::new("/p/gone.c"))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(true));
        engine
            .expect_parse_file()
            .withf(parses("/p/forced.c", true))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _| indexed());
        engine
            .expect_parse_file()
            .withf(parses("/p/changed.c", false))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _| indexed());

        let fs = TestFileSystem::new();
        let indexer = indexer(
            model("p", "/p", vec![]),
            engine,
            &fs,
            SharedIndex::new(MemoryIndex::new()),
            IndexerConfig::default(),
        );
        let task = indexer.create_task(
            vec![member("/p/forced.c")],
            vec![member("/p/changed.c")],
            vec![member("/p/gone.c")],
        );

        let state = task.run(&TaskMonitor::new()).await;
        assert_eq!(state, TaskState::Completed);
        let progress = task.progress();
        assert_eq!(progress.completed_sources, 2);
        assert_eq!(progress.remaining(), 0);
    }

    #[tokio::test]
    async fn test_policy_skips_potential_sources_and_large_files() {
        let mut engine = MockParseEngine::new();
        engine
            .expect_parse_file()
            .withf(parses("/p/ok.c", false))
            .times(1)
            .returning(|_, _, _| indexed());

        let fs = TestFileSystem::new();
        fs.add_file("/p/ok.c", "int a;");
        fs.add_file("/p/big.c", "int big_enough;");
        fs.add_file("/p/loose.c", "int b;");
        let config = IndexerConfig::builder().file_size_limit(8).build().unwrap();
        let indexer = indexer(
            model("p", "/p", vec![]),
            engine,
            &fs,
            SharedIndex::new(MemoryIndex::new()),
            config,
        );
        let task = indexer.create_task(
            vec![],
            vec![
                CompilationInput::new("/p/loose.c", UnitKind::Source, Membership::Potential),
                member("/p/big.c"),
                member("/p/ok.c"),
            ],
            vec![],
        );

        let (tx, mut rx) = mpsc::channel(crate::task::monitor::TASK_EVENT_CHANNEL_BUFFER_SIZE);
        assert_eq!(task.run(&TaskMonitor::with_sender(tx)).await, TaskState::Completed);

        let progress = task.progress();
        assert_eq!(progress.skipped, 2);
        assert_eq!(progress.completed_sources, 1);

        let mut skipped = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let TaskEvent::FileSkipped { path, .. } = event {
                skipped.push(path);
            }
        }
        assert_eq!(skipped, vec![PathBuf::from("/p/loose.c"), PathBuf::from("/p/big.c")]);
    }

    #[tokio::test]
    async fn test_rebuild_of_empty_project_clears_index_without_delegate() {
        let (tx, mut rx) = mpsc::channel(INDEX_EVENT_CHANNEL_BUFFER_SIZE);
        let mut store = MemoryIndex::new();
        store.put(record("/p/a.c", UNIX_EPOCH, 1));
        store.put(record("/p/b.c", UNIX_EPOCH, 1));
        store.put(record("/q/c.c", UNIX_EPOCH, 1));
        let index = SharedIndex::new(store).with_events(tx);

        let fs = TestFileSystem::new();
        let indexer = indexer(
            model("p", "/p", vec![]),
            MockParseEngine::new(),
            &fs,
            index.clone(),
            IndexerConfig::default(),
        );
        let task = indexer.rebuild_task();

        assert_eq!(task.run(&TaskMonitor::new()).await, TaskState::Completed);
        assert!(task.delegate().is_none());
        assert_eq!(task.progress(), IndexerProgress::placeholder());
        assert_eq!(index.read().await.unwrap().len(), 1);
        assert_eq!(
            rx.recv().await,
            Some(IndexEvent::Cleared {
                root: PathBuf::from("/p"),
                removed: 2
            })
        );
    }

    #[tokio::test]
    async fn test_rebuild_indexes_headers_through_includers() {
        let fs = TestFileSystem::new();
        fs.add_file("/p/src/main.c", "#include \"util.h\"\n");
        fs.add_file("/p/src/util.h", "int util(void);\n");
        fs.add_file("/p/src/lonely.h", "");
        let project = model(
            "p",
            "/p",
            vec![ProjectElement::folder(
                "/p/src",
                vec![
                    ProjectElement::unit("/p/src/lonely.h", UnitKind::Header, Membership::Potential),
                    ProjectElement::unit("/p/src/main.c", UnitKind::Source, Membership::Member),
                    ProjectElement::unit("/p/src/util.h", UnitKind::Header, Membership::Potential),
                ],
            )],
        );
        let index = SharedIndex::new(MemoryIndex::new());
        let engine = DigestEngine::new(Arc::new(fs.clone())).unwrap();
        let indexer = indexer(project, engine, &fs, index.clone(), IndexerConfig::default());

        let task = indexer.rebuild_task();
        assert_eq!(task.run(&TaskMonitor::new()).await, TaskState::Completed);

        let delegate = task.delegate().unwrap();
        assert_eq!(delegate.state(), TaskState::Completed);
        let progress = task.progress();
        assert_eq!(progress.completed_sources, 1);
        assert_eq!(progress.completed_headers, 1);
        assert_eq!(progress.skipped, 1);
        assert_eq!(progress.remaining(), 0);

        let index = index.read().await.unwrap();
        assert!(index.contains(Path::new("/p/src/main.c")));
        assert_eq!(
            index.includers_of(Path::new("/p/src/util.h")),
            vec![PathBuf::from("/p/src/main.c")]
        );
    }

    #[tokio::test]
    async fn test_cancellation_keeps_counters() {
        let fs = TestFileSystem::new();
        let token = Arc::new(OnceLock::<CancellationToken>::new());
        let mut engine = MockParseEngine::new();
        let cancel = Arc::clone(&token);
        engine.expect_parse_file().times(1).returning(move |_, _, _| {
            if let Some(token) = cancel.get() {
                token.cancel();
            }
            indexed()
        });
        let indexer = indexer(
            model("p", "/p", vec![]),
            engine,
            &fs,
            SharedIndex::new(MemoryIndex::new()),
            IndexerConfig::default(),
        );
        let task = indexer.create_task(
            vec![],
            vec![member("/p/a.c"), member("/p/b.c"), member("/p/c.c")],
            vec![],
        );
        token.set(task.cancellation_token()).unwrap();

        assert_eq!(task.run(&TaskMonitor::new()).await, TaskState::Cancelled);
        let progress = task.progress();
        assert_eq!(progress.completed_sources, 1);
        assert_eq!(progress.remaining_sources, 2);
        assert_eq!(task.run(&TaskMonitor::new()).await, TaskState::Cancelled);
    }

    #[tokio::test]
    async fn test_cancelled_composite_cancels_delegate() {
        let fs = TestFileSystem::new();
        let project = model(
            "p",
            "/p",
            vec![ProjectElement::unit("/p/a.c", UnitKind::Source, Membership::Member)],
        );
        let indexer = indexer(
            project,
            MockParseEngine::new(),
            &fs,
            SharedIndex::new(MemoryIndex::new()),
            IndexerConfig::default(),
        );
        let delta = ElementDelta::changed(
            ProjectElement::unit("/p/a.c", UnitKind::Source, Membership::Member),
            ChangeFlags::content(),
        );
        let task = indexer.resource_delta_task(delta).await;
        let delegate = task.delegate().unwrap();

        task.cancel();
        assert!(delegate.is_cancelled());
        assert_eq!(task.run(&TaskMonitor::new()).await, TaskState::Cancelled);
        assert_eq!(task.progress().completed(), 0);
    }

    #[tokio::test]
    async fn test_lock_timeout_degrades_to_failed_task() {
        let fs = TestFileSystem::new();
        let config = IndexerConfig::builder()
            .lock_timeout(Duration::from_millis(20))
            .build()
            .unwrap();
        let indexer = indexer(
            model("p", "/p", vec![]),
            MockParseEngine::new(),
            &fs,
            SharedIndex::new(MemoryIndex::new()),
            config,
        );
        let delta = ElementDelta::changed(
            ProjectElement::unit("/p/a.c", UnitKind::Source, Membership::Member),
            ChangeFlags::content(),
        );

        let guard = indexer.index().write().await.unwrap();
        let task = indexer.resource_delta_task(delta).await;
        drop(guard);

        assert!(task.delegate().is_none());
        assert!(!task.prepare().await);
        assert_eq!(task.run(&TaskMonitor::new()).await, TaskState::Failed);
    }

    #[tokio::test]
    async fn test_notify_emits_reload() {
        let (tx, mut rx) = mpsc::channel(INDEX_EVENT_CHANNEL_BUFFER_SIZE);
        let fs = TestFileSystem::new();
        let indexer = indexer(
            model("p", "/p", vec![]),
            MockParseEngine::new(),
            &fs,
            SharedIndex::new(MemoryIndex::new()).with_events(tx),
            IndexerConfig::default(),
        );
        let task = indexer.notify_task();
        let other = indexer.create_task(vec![], vec![member("/p/a.c")], vec![]);

        assert!(!task.accept_urgent_task(&other));
        assert_eq!(task.run(&TaskMonitor::new()).await, TaskState::Completed);
        assert_eq!(rx.recv().await, Some(IndexEvent::Reloaded));
    }

    #[tokio::test]
    async fn test_preemption_rules() {
        let fs = TestFileSystem::new();
        let index = SharedIndex::new(MemoryIndex::new());

        let mut engine = MockParseEngine::new();
        let mut seq = Sequence::new();
        engine
            .expect_parse_file()
            .withf(parses("/a/urgent.c", false))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _| indexed());
        engine
            .expect_parse_file()
            .withf(parses("/a/x.c", false))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _| indexed());

        let project_a = model(
            "a",
            "/a",
            vec![ProjectElement::unit("/a/x.c", UnitKind::Source, Membership::Member)],
        );
        let indexer_a = indexer(project_a, engine, &fs, index.clone(), IndexerConfig::default());
        let indexer_b = indexer(
            model("b", "/b", vec![]),
            MockParseEngine::new(),
            &fs,
            index.clone(),
            IndexerConfig::default(),
        );

        let delta = ElementDelta::changed(
            ProjectElement::unit("/a/x.c", UnitKind::Source, Membership::Member),
            ChangeFlags::content(),
        );
        let running = indexer_a.resource_delta_task(delta).await;
        assert!(running.delegate().is_some());

        let same_project = indexer_a.create_task(vec![], vec![member("/a/urgent.c")], vec![]);
        let other_project = indexer_b.create_task(vec![], vec![member("/b/y.c")], vec![]);
        assert!(running.accept_urgent_task(&same_project));
        assert!(!running.accept_urgent_task(&other_project));
        assert_eq!(running.progress().remaining_sources, 1);

        let idle = indexer_a.resource_delta_task(ElementDelta::changed(
            ProjectElement::project("/a", vec![]),
            ChangeFlags::default(),
        ))
        .await;
        assert!(idle.delegate().is_none());
        assert!(!idle.accept_urgent_task(&same_project));

        assert_eq!(running.run(&TaskMonitor::new()).await, TaskState::Completed);
        assert_eq!(running.progress().completed_sources, 2);
        assert!(!running.accept_urgent_task(&indexer_a.create_task(vec![], vec![member("/a/late.c")], vec![])));
    }

    #[tokio::test]
    async fn test_resource_delta_keeps_only_relevant_files() {
        let fs = TestFileSystem::new();
        let mut store = MemoryIndex::new();
        store.put(record("/p/old.c", UNIX_EPOCH, 1));
        let indexer = indexer(
            model("p", "/p", vec![]),
            MockParseEngine::new(),
            &fs,
            SharedIndex::new(store),
            IndexerConfig::default(),
        );

        let delta = ElementDelta::changed(ProjectElement::project("/p", vec![]), ChangeFlags::children())
            .with_resource_delta(
                ResourceDelta::folder("/p", DeltaKind::Changed)
                    .with_child(ResourceDelta::file("/p/gen.h", DeltaKind::Changed))
                    .with_child(ResourceDelta::file("/p/never.c", DeltaKind::Removed))
                    .with_child(ResourceDelta::file("/p/old.c", DeltaKind::Removed)),
            );
        let task = indexer.resource_delta_task(delta).await;

        let inputs = task.delegate().unwrap().inputs().unwrap();
        assert!(inputs.changed().is_empty());
        assert_eq!(inputs.removed().len(), 1);
        assert!(inputs.removed().contains(Path::new("/p/old.c")));
    }

    #[tokio::test]
    async fn test_resource_delta_keeps_new_headers_when_indexing_unused_headers() {
        let delta = || {
            ElementDelta::changed(ProjectElement::project("/p", vec![]), ChangeFlags::children())
                .with_child(ElementDelta::added(ProjectElement::unit(
                    "/p/new.h",
                    UnitKind::Header,
                    Membership::Potential,
                )))
        };

        let fs = TestFileSystem::new();
        let default = indexer(
            model("p", "/p", vec![]),
            MockParseEngine::new(),
            &fs,
            SharedIndex::new(MemoryIndex::new()),
            IndexerConfig::default(),
        );
        assert!(default.resource_delta_task(delta()).await.delegate().is_none());

        let mut engine = MockParseEngine::new();
        engine
            .expect_parse_file()
            .withf(parses("/p/new.h", false))
            .times(1)
            .returning(|_, _, _| indexed());
        let config = IndexerConfig::builder()
            .index_unused_headers(true)
            .build()
            .unwrap();
        let indexer = indexer(
            model("p", "/p", vec![]),
            engine,
            &fs,
            SharedIndex::new(MemoryIndex::new()),
            config,
        );

        let task = indexer.resource_delta_task(delta()).await;
        let inputs = task.delegate().unwrap().inputs().unwrap();
        assert!(inputs.changed().contains(Path::new("/p/new.h")));
        assert_eq!(task.run(&TaskMonitor::new()).await, TaskState::Completed);
        assert_eq!(task.progress().completed_headers, 1);
    }

    #[tokio::test]
    async fn test_update_finds_stale_new_and_removed_files() {
        let fs = TestFileSystem::new();
        fs.set_file_content("/p/a.c", "int a2;", UNIX_EPOCH + Duration::from_secs(5));
        fs.set_file_content("/p/b.c", "int b;", UNIX_EPOCH + Duration::from_secs(5));
        fs.set_file_content("/p/c.c", "int c;", UNIX_EPOCH + Duration::from_secs(5));

        let mut store = MemoryIndex::new();
        store.put(record("/p/a.c", UNIX_EPOCH + Duration::from_secs(1), 6));
        store.put(record("/p/b.c", UNIX_EPOCH + Duration::from_secs(5), 6));
        store.put(record("/p/gone.c", UNIX_EPOCH, 1));

        let project = model(
            "p",
            "/p",
            vec![
                ProjectElement::unit("/p/a.c", UnitKind::Source, Membership::Member),
                ProjectElement::unit("/p/b.c", UnitKind::Source, Membership::Member),
                ProjectElement::unit("/p/c.c", UnitKind::Source, Membership::Member),
            ],
        );
        let indexer = indexer(
            project,
            MockParseEngine::new(),
            &fs,
            SharedIndex::new(store),
            IndexerConfig::default(),
        );

        let task = indexer.update_task(UpdateScope::Project, UpdateOptions::default());
        assert!(task.prepare().await);
        let inputs = task.delegate().unwrap().inputs().unwrap();
        let changed: Vec<_> = inputs.changed().iter().map(|i| i.path().to_path_buf()).collect();
        assert_eq!(changed, vec![PathBuf::from("/p/a.c"), PathBuf::from("/p/c.c")]);
        assert!(inputs.removed().contains(Path::new("/p/gone.c")));
        assert!(inputs.forced().is_empty());

        let all = indexer.update_task(
            UpdateScope::Selection(vec![PathBuf::from("/p/b.c")]),
            UpdateOptions {
                update_all: true,
                ..UpdateOptions::default()
            },
        );
        assert!(all.prepare().await);
        let inputs = all.delegate().unwrap().inputs().unwrap();
        assert!(inputs.forced().contains(Path::new("/p/b.c")));
        assert_eq!(inputs.len(), 1);
    }

    #[tokio::test]
    async fn test_update_reparses_files_with_newly_resolvable_includes() {
        let fs = TestFileSystem::new();
        let modified = UNIX_EPOCH + Duration::from_secs(5);
        fs.set_file_content("/p/a.c", "#include \"gen.h\"\n", modified);
        fs.add_file("/p/gen.h", "");

        let mut stored = record("/p/a.c", modified, 17);
        stored.includes.push(IncludeDirective {
            name: "gen.h".to_string(),
            system: false,
            resolved: None,
        });
        let mut store = MemoryIndex::new();
        store.put(stored);

        let project = model(
            "p",
            "/p",
            vec![ProjectElement::unit("/p/a.c", UnitKind::Source, Membership::Member)],
        );
        let indexer = indexer(
            project,
            MockParseEngine::new(),
            &fs,
            SharedIndex::new(store),
            IndexerConfig::default(),
        );

        let plain = indexer.update_task(UpdateScope::Project, UpdateOptions::default());
        assert!(plain.prepare().await);
        assert!(plain.delegate().is_none());

        let task = indexer.update_task(
            UpdateScope::Project,
            UpdateOptions {
                unresolved_includes: true,
                ..UpdateOptions::default()
            },
        );
        assert!(task.prepare().await);
        let inputs = task.delegate().unwrap().inputs().unwrap();
        assert!(inputs.changed().contains(Path::new("/p/a.c")));
    }

    /// Delegates to an in-memory file system; every read blocks for `delay`
    struct SlowReads {
        inner: TestFileSystem,
        delay: Duration,
    }

    impl FileSystemTrait for SlowReads {
        fn exists(&self, path: &Path) -> bool {
            self.inner.exists(path)
        }

        fn is_file(&self, path: &Path) -> bool {
            self.inner.is_file(path)
        }

        fn read(&self, path: &Path) -> Result<Vec<u8>, std::io::Error> {
            std::thread::sleep(self.delay);
            self.inner.read(path)
        }

        fn metadata(&self, path: &Path) -> Result<crate::io::FileMetadata, std::io::Error> {
            self.inner.metadata(path)
        }

        fn list_dir(&self, path: &Path) -> Result<Vec<String>, std::io::Error> {
            self.inner.list_dir(path)
        }

        fn canonicalize(&self, path: &Path) -> Result<PathBuf, std::io::Error> {
            self.inner.canonicalize(path)
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_update_hashing_leaves_index_writable() {
        let fs = TestFileSystem::new();
        let mut store = MemoryIndex::new();
        let mut units = Vec::new();
        for name in ["a", "b", "c", "d", "e"] {
            let path = format!("/p/{name}.c");
            fs.set_file_content(path.as_str(), "int x;", UNIX_EPOCH);
            store.put(record(&path, UNIX_EPOCH, 6));
            units.push(ProjectElement::unit(path, UnitKind::Source, Membership::Member));
        }
        let config = IndexerConfig::builder()
            .lock_timeout(Duration::from_millis(200))
            .build()
            .unwrap();
        let indexer = Indexer::builder(
            model("p", "/p", units),
            SharedIndex::new(store),
            Arc::new(MockParseEngine::new()),
        )
        .config(config)
        .file_system(Arc::new(SlowReads {
            inner: fs,
            delay: Duration::from_millis(100),
        }))
        .build();

        let task = indexer.update_task(
            UpdateScope::Project,
            UpdateOptions {
                check_timestamps: false,
                check_content_hash: true,
                ..UpdateOptions::default()
            },
        );
        let preparing = tokio::spawn({
            let task = Arc::clone(&task);
            async move { task.prepare().await }
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        let written = indexer
            .index()
            .write()
            .await
            .map(|mut index| index.put(record("/q/other.c", UNIX_EPOCH, 1)));
        assert!(written.is_ok());

        assert!(preparing.await.unwrap());
        let inputs = task.delegate().unwrap().inputs().unwrap();
        assert_eq!(inputs.changed().len(), 5);
    }

    #[tokio::test]
    async fn test_state_subscription_sees_completion() {
        let fs = TestFileSystem::new();
        let indexer = indexer(
            model("p", "/p", vec![]),
            MockParseEngine::new(),
            &fs,
            SharedIndex::new(MemoryIndex::new()),
            IndexerConfig::default(),
        );
        let task = indexer.notify_task();
        let mut states = task.subscribe();
        assert_eq!(*states.borrow(), TaskState::Created);

        task.run(&TaskMonitor::new()).await;
        states.changed().await.unwrap();
        assert_eq!(*states.borrow_and_update(), TaskState::Completed);
        assert!(!task.reclaim_memory());
    }
}
