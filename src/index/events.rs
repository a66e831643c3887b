//! Change events emitted by the persisted index

use std::path::PathBuf;

/// Buffer size for index event channels
pub const INDEX_EVENT_CHANNEL_BUFFER_SIZE: usize = 256;

/// Notification that the content of the index changed
#[derive(Debug, Clone, PartialEq)]
pub enum IndexEvent {
    /// A persisted index was swapped in without parsing
    Reloaded,
    /// Records for these files were written
    FilesUpdated { paths: Vec<PathBuf> },
    /// Records for these files were dropped
    FilesRemoved { paths: Vec<PathBuf> },
    /// All records below a project root were cleared
    Cleared { root: PathBuf, removed: usize },
}
