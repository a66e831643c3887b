//! Task lifecycle events
//!
//! A [`TaskMonitor`] is handed to `run()` and forwards what the task does to
//! an optional mpsc channel, for progress displays and tests.

use std::path::PathBuf;
use tokio::sync::mpsc;
use tracing::warn;
use uuid::Uuid;

use crate::project::model::ProjectId;
use crate::task::progress::IndexerProgress;
use crate::task::state::TaskState;

/// Buffer size for task event channels
pub const TASK_EVENT_CHANNEL_BUFFER_SIZE: usize = 1024;

/// Events emitted while a task runs
#[derive(Debug, Clone, PartialEq)]
pub enum TaskEvent {
    Started {
        task_id: Uuid,
        kind: &'static str,
        project: ProjectId,
    },
    DelegateCreated {
        task_id: Uuid,
        delegate_id: Uuid,
        files: usize,
    },
    FileIndexed {
        task_id: Uuid,
        path: PathBuf,
    },
    FileRemoved {
        task_id: Uuid,
        path: PathBuf,
    },
    FileSkipped {
        task_id: Uuid,
        path: PathBuf,
        reason: String,
    },
    FileFailed {
        task_id: Uuid,
        path: PathBuf,
        error: String,
    },
    Finished {
        task_id: Uuid,
        state: TaskState,
        progress: IndexerProgress,
    },
}

#[derive(Debug, Clone, Default)]
pub struct TaskMonitor {
    sender: Option<mpsc::Sender<TaskEvent>>,
}

impl TaskMonitor {
    pub fn new() -> Self {
        Self { sender: None }
    }

    pub fn with_sender(sender: mpsc::Sender<TaskEvent>) -> Self {
        Self {
            sender: Some(sender),
        }
    }

    pub fn emit(&self, event: TaskEvent) {
        if let Some(sender) = &self.sender
            && sender.try_send(event).is_err()
        {
            warn!("TaskMonitor: Failed to send task event");
        }
    }
}
