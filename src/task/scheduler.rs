//! Per-project task scheduling
//!
//! One task runs per project at a time. A task enqueued while another one of
//! the same project is running is first offered to the running task (and to
//! the queued ones) via `accept_urgent_task`; if nobody absorbs it, it waits
//! in a FIFO queue.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;
use tracing::{debug, info};

use crate::project::model::ProjectId;
use crate::task::monitor::TaskMonitor;
use crate::task::task::IndexerTask;

/// What happened to an enqueued task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// A worker was started for the task
    Started,
    /// The task waits behind the running one
    Queued,
    /// Its files were merged into an existing task; it will never run itself
    Absorbed,
}

#[derive(Default)]
struct ProjectQueue {
    running: Option<Arc<IndexerTask>>,
    pending: VecDeque<Arc<IndexerTask>>,
}

struct SchedulerInner {
    queues: Mutex<HashMap<ProjectId, ProjectQueue>>,
    monitor: TaskMonitor,
    workers: watch::Sender<usize>,
}

impl SchedulerInner {
    fn lock(&self) -> MutexGuard<'_, HashMap<ProjectId, ProjectQueue>> {
        self.queues.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[derive(Clone)]
pub struct IndexScheduler {
    inner: Arc<SchedulerInner>,
}

impl IndexScheduler {
    pub fn new(monitor: TaskMonitor) -> Self {
        let (workers, _) = watch::channel(0);
        Self {
            inner: Arc::new(SchedulerInner {
                queues: Mutex::new(HashMap::new()),
                monitor,
                workers,
            }),
        }
    }

    pub fn enqueue(&self, task: Arc<IndexerTask>) -> EnqueueOutcome {
        let project = task.project_id();
        let mut queues = self.inner.lock();
        let queue = queues.entry(project.clone()).or_default();

        if let Some(running) = &queue.running {
            let absorbed = running.accept_urgent_task(&task)
                || queue.pending.iter().any(|pending| pending.accept_urgent_task(&task));
            if absorbed {
                debug!("Task {} merged into queued work for {}", task.id(), project);
                return EnqueueOutcome::Absorbed;
            }
            debug!(
                "Task {} queued for {} behind {} others",
                task.id(),
                project,
                queue.pending.len() + 1
            );
            queue.pending.push_back(task);
            return EnqueueOutcome::Queued;
        }

        queue.running = Some(Arc::clone(&task));
        drop(queues);

        self.inner.workers.send_modify(|n| *n += 1);
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            drive(inner, project, task).await;
        });
        EnqueueOutcome::Started
    }

    /// Task currently running for a project
    pub fn running_task(&self, project: &ProjectId) -> Option<Arc<IndexerTask>> {
        self.inner
            .lock()
            .get(project)
            .and_then(|queue| queue.running.clone())
    }

    pub fn pending_count(&self, project: &ProjectId) -> usize {
        self.inner
            .lock()
            .get(project)
            .map_or(0, |queue| queue.pending.len())
    }

    /// Cancel the running task of a project and drop its queued ones
    pub fn cancel_project(&self, project: &ProjectId) -> usize {
        let mut queues = self.inner.lock();
        let Some(queue) = queues.get_mut(project) else {
            return 0;
        };
        let mut cancelled = 0;
        if let Some(running) = &queue.running {
            running.cancel();
            cancelled += 1;
        }
        for pending in queue.pending.drain(..) {
            pending.cancel();
            cancelled += 1;
        }
        info!("Cancelled {} tasks for {}", cancelled, project);
        cancelled
    }

    pub fn cancel_all(&self) -> usize {
        let projects: Vec<ProjectId> = self.inner.lock().keys().cloned().collect();
        projects
            .iter()
            .map(|project| self.cancel_project(project))
            .sum()
    }

    /// Wait until every worker has drained its queue
    pub async fn wait_idle(&self) {
        let mut workers = self.inner.workers.subscribe();
        let _ = workers.wait_for(|n| *n == 0).await;
    }

    /// Drop the file-existence caches of all running tasks
    pub fn reclaim_memory(&self) -> usize {
        let running: Vec<Arc<IndexerTask>> = self
            .inner
            .lock()
            .values()
            .filter_map(|queue| queue.running.clone())
            .collect();
        running.iter().filter(|task| task.reclaim_memory()).count()
    }
}

async fn drive(inner: Arc<SchedulerInner>, project: ProjectId, mut task: Arc<IndexerTask>) {
    loop {
        let state = task.run(&inner.monitor).await;
        debug!("Worker for {}: task {} {}", project, task.id(), state);

        let next = {
            let mut queues = inner.lock();
            let next = queues
                .get_mut(&project)
                .and_then(|queue| queue.pending.pop_front());
            match &next {
                Some(next) => {
                    if let Some(queue) = queues.get_mut(&project) {
                        queue.running = Some(Arc::clone(next));
                    }
                }
                None => {
                    queues.remove(&project);
                }
            }
            next
        };

        match next {
            Some(next) => task = next,
            None => break,
        }
    }
    inner.workers.send_modify(|n| *n = n.saturating_sub(1));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IndexerConfig;
    use crate::engine::{EngineError, ParseContext, ParseEngine, ParseOutcome};
    use crate::index::{MemoryIndex, SharedIndex};
    use crate::io::TestFileSystem;
    use crate::project::element::{CompilationInput, Membership, ProjectElement, UnitKind};
    use crate::project::model::ProjectModel;
    use crate::task::indexer::Indexer;
    use crate::task::state::TaskState;
    use async_trait::async_trait;
    use std::path::{Path, PathBuf};
    use tokio::sync::Semaphore;

    #[cfg(feature = "test-logging")]
    crate::setup_test_logging!();

    /// Engine whose parses wait for a permit each
    #[derive(Clone)]
    struct GatedEngine {
        gate: Arc<Semaphore>,
        parsed: Arc<Mutex<Vec<PathBuf>>>,
    }

    impl GatedEngine {
        fn new() -> Self {
            Self {
                gate: Arc::new(Semaphore::new(0)),
                parsed: Arc::new(Mutex::new(Vec::new())),
            }
        }

        fn parsed(&self) -> Vec<PathBuf> {
            self.parsed.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ParseEngine for GatedEngine {
        async fn parse_file(
            &self,
            input: &CompilationInput,
            _forced: bool,
            _ctx: &ParseContext,
        ) -> Result<ParseOutcome, EngineError> {
            if let Ok(permit) = self.gate.acquire().await {
                permit.forget();
            }
            self.parsed.lock().unwrap().push(input.path().to_path_buf());
            Ok(ParseOutcome::Indexed {
                includes: 0,
                unresolved: 0,
            })
        }

        async fn remove_file(&self, _path: &Path, _ctx: &ParseContext) -> Result<bool, EngineError> {
            Ok(false)
        }
    }

    fn indexer(id: &str, engine: &GatedEngine) -> Arc<Indexer> {
        let root = format!("/{}", id);
        let project = ProjectModel::from_tree(ProjectId::new(id), ProjectElement::project(root, vec![]));
        Indexer::builder(
            Arc::new(project),
            SharedIndex::new(MemoryIndex::new()),
            Arc::new(engine.clone()),
        )
        .config(IndexerConfig::default())
        .file_system(Arc::new(TestFileSystem::new()))
        .build()
    }

    fn member(path: &str) -> CompilationInput {
        CompilationInput::new(path, UnitKind::Source, Membership::Member)
    }

    #[tokio::test]
    async fn test_running_task_absorbs_same_project_work() {
        let engine = GatedEngine::new();
        let indexer = indexer("a", &engine);
        let scheduler = IndexScheduler::new(TaskMonitor::new());

        let first = indexer.create_task(vec![], vec![member("/a/one.c")], vec![]);
        let second = indexer.create_task(vec![], vec![member("/a/two.c")], vec![]);
        assert_eq!(scheduler.enqueue(Arc::clone(&first)), EnqueueOutcome::Started);
        assert_eq!(scheduler.enqueue(Arc::clone(&second)), EnqueueOutcome::Absorbed);

        engine.gate.add_permits(2);
        scheduler.wait_idle().await;

        assert_eq!(first.state(), TaskState::Completed);
        assert_eq!(second.state(), TaskState::Created);
        let mut parsed = engine.parsed();
        parsed.sort();
        assert_eq!(parsed, vec![PathBuf::from("/a/one.c"), PathBuf::from("/a/two.c")]);
        assert_eq!(first.progress().completed_sources, 2);
    }

    #[tokio::test]
    async fn test_unabsorbable_tasks_queue_in_order() {
        let engine = GatedEngine::new();
        let indexer = indexer("a", &engine);
        let scheduler = IndexScheduler::new(TaskMonitor::new());

        let notify = indexer.notify_task();
        let concrete = indexer.create_task(vec![], vec![member("/a/one.c")], vec![]);
        let rebuild = indexer.rebuild_task();

        assert_eq!(scheduler.enqueue(Arc::clone(&notify)), EnqueueOutcome::Started);
        assert_eq!(scheduler.enqueue(Arc::clone(&concrete)), EnqueueOutcome::Queued);
        assert_eq!(scheduler.enqueue(Arc::clone(&rebuild)), EnqueueOutcome::Queued);
        assert_eq!(scheduler.pending_count(&ProjectId::new("a")), 2);

        engine.gate.add_permits(1);
        scheduler.wait_idle().await;

        assert_eq!(notify.state(), TaskState::Completed);
        assert_eq!(concrete.state(), TaskState::Completed);
        assert_eq!(rebuild.state(), TaskState::Completed);
        assert!(scheduler.running_task(&ProjectId::new("a")).is_none());
    }

    #[tokio::test]
    async fn test_projects_run_independently() {
        let engine = GatedEngine::new();
        let a = indexer("a", &engine);
        let b = indexer("b", &engine);
        let scheduler = IndexScheduler::new(TaskMonitor::new());

        let task_a = a.create_task(vec![], vec![member("/a/one.c")], vec![]);
        let task_b = b.create_task(vec![], vec![member("/b/one.c")], vec![]);
        assert_eq!(scheduler.enqueue(task_a), EnqueueOutcome::Started);
        assert_eq!(scheduler.enqueue(task_b), EnqueueOutcome::Started);

        engine.gate.add_permits(2);
        scheduler.wait_idle().await;
        assert_eq!(engine.parsed().len(), 2);
    }

    #[tokio::test]
    async fn test_cancel_project_drops_queued_tasks() {
        let engine = GatedEngine::new();
        let indexer = indexer("a", &engine);
        let scheduler = IndexScheduler::new(TaskMonitor::new());

        let running = indexer.create_task(vec![], vec![member("/a/one.c"), member("/a/two.c")], vec![]);
        let queued = indexer.notify_task();
        scheduler.enqueue(Arc::clone(&running));
        assert_eq!(scheduler.enqueue(Arc::clone(&queued)), EnqueueOutcome::Queued);

        assert_eq!(scheduler.cancel_project(&ProjectId::new("a")), 2);
        engine.gate.add_permits(2);
        scheduler.wait_idle().await;

        assert_eq!(running.state(), TaskState::Cancelled);
        assert!(engine.parsed().len() <= 1);
        assert!(queued.is_cancelled());
        assert_eq!(queued.state(), TaskState::Created);
        assert_eq!(scheduler.cancel_all(), 0);
    }
}
