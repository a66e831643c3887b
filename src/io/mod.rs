//! I/O layer - file system abstraction used by caches, tasks and engines
//!
//! - **FileSystemTrait**: injectable file system queries (stat, listing, reads)
//! - **RealFileSystem**: std::fs backed implementation

pub mod file_system;

pub use file_system::{FileMetadata, FileSystemTrait, RealFileSystem};

#[cfg(test)]
pub use file_system::{MockFileSystemTrait, TestFileSystem};
