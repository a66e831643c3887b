use serde::Serialize;
use thiserror::Error;

use crate::delta::DeltaError;
use crate::index::IndexError;

/// Lifecycle of a task: Created → Running → Completed | Cancelled | Failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    Created,
    Running,
    Completed,
    Cancelled,
    Failed,
}

impl TaskState {
    pub fn is_finished(&self) -> bool {
        matches!(
            self,
            TaskState::Completed | TaskState::Cancelled | TaskState::Failed
        )
    }
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            TaskState::Created => "created",
            TaskState::Running => "running",
            TaskState::Completed => "completed",
            TaskState::Cancelled => "cancelled",
            TaskState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Reasons a composite task could not work out its file sets
#[derive(Debug, Error)]
pub enum TaskError {
    #[error("Index unavailable: {0}")]
    Index(#[from] IndexError),

    #[error("Delta analysis failed: {0}")]
    Delta(#[from] DeltaError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_finished_states() {
        assert!(!TaskState::Created.is_finished());
        assert!(!TaskState::Running.is_finished());
        assert!(TaskState::Completed.is_finished());
        assert!(TaskState::Cancelled.is_finished());
        assert!(TaskState::Failed.is_finished());
    }

    #[test]
    fn test_task_error_wraps_lock_timeout() {
        let error: TaskError = IndexError::read_timeout(Duration::from_secs(1)).into();
        assert!(error.to_string().starts_with("Index unavailable"));
    }
}
