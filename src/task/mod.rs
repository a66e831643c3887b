//! Indexer tasks and their scheduling

pub mod indexer;
pub mod monitor;
pub mod progress;
pub mod scheduler;
pub mod state;
pub mod task;
pub mod update;

pub use indexer::{Indexer, IndexerBuilder};
pub use monitor::{TASK_EVENT_CHANNEL_BUFFER_SIZE, TaskEvent, TaskMonitor};
pub use progress::IndexerProgress;
pub use scheduler::{EnqueueOutcome, IndexScheduler};
pub use state::{TaskError, TaskState};
pub use task::{IndexerTask, TaskKind};
pub use update::{UpdateOptions, UpdateScope};
