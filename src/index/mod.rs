//! Persisted index interface and the in-memory store

pub mod error;
pub mod events;
pub mod memory;
pub mod store;

pub use error::IndexError;
pub use events::{INDEX_EVENT_CHANNEL_BUFFER_SIZE, IndexEvent};
pub use memory::MemoryIndex;
pub use store::{
    FileRecord, IncludeDirective, IndexReadGuard, IndexStatistics, IndexStore, IndexWriteGuard,
    SharedIndex,
};
