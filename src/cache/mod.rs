//! Per-run caches used while resolving includes

pub mod file_exists;

pub use file_exists::{CacheReclaimer, FileExistenceCache};
