//! Persisted index interface
//!
//! The index keeps one [`FileRecord`] per indexed file. Tasks only read it to
//! decide what needs work; records are written by the parse engine. All access
//! goes through [`SharedIndex`], whose lock acquisition is bounded by a timeout.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard, mpsc};
use tracing::{trace, warn};

use crate::config::{DEFAULT_LOCK_TIMEOUT_SECS, IndexerMode};
use crate::index::error::IndexError;
use crate::index::events::IndexEvent;
use crate::io::FileMetadata;
use crate::project::element::{Membership, UnitKind};

/// One `#include` directive seen in a file
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IncludeDirective {
    /// Name as written between the quotes or angle brackets
    pub name: String,
    /// `<name>` form
    pub system: bool,
    /// File the name resolved to, if any
    pub resolved: Option<PathBuf>,
}

impl IncludeDirective {
    pub fn is_resolved(&self) -> bool {
        self.resolved.is_some()
    }
}

/// Index record of one file
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileRecord {
    pub path: PathBuf,
    pub kind: UnitKind,
    pub membership: Membership,
    /// Modification time of the file when it was indexed
    pub modified: SystemTime,
    pub size: u64,
    /// SHA-256 of the content, lowercase hex
    pub content_hash: String,
    pub includes: Vec<IncludeDirective>,
    /// Task flavor that produced the record
    pub mode: IndexerMode,
    pub indexed_at: DateTime<Utc>,
}

impl FileRecord {
    /// Whether the on-disk metadata differs from what was indexed
    pub fn is_outdated(&self, metadata: &FileMetadata) -> bool {
        self.modified != metadata.modified || self.size != metadata.size
    }

    pub fn has_unresolved_includes(&self) -> bool {
        self.includes.iter().any(|include| !include.is_resolved())
    }

    pub fn includes_file(&self, path: &Path) -> bool {
        self.includes
            .iter()
            .any(|include| include.resolved.as_deref() == Some(path))
    }
}

/// Summary statistics of an index
#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct IndexStatistics {
    /// Total number of indexed files
    pub total_files: usize,
    /// Number of indexed sources
    pub sources: usize,
    /// Number of indexed headers
    pub headers: usize,
    /// Files that are build configuration members
    pub members: usize,
    /// Include directives recorded across all files
    pub includes: usize,
    /// Include directives that could not be resolved
    pub unresolved_includes: usize,
}

impl IndexStatistics {
    /// Get human-readable summary
    pub fn summary(&self) -> String {
        format!(
            "Index: {} files ({} sources, {} headers), {} includes, {} unresolved",
            self.total_files, self.sources, self.headers, self.includes, self.unresolved_includes
        )
    }
}

/// Storage backend of the persisted index
pub trait IndexStore: Send + Sync {
    fn get(&self, path: &Path) -> Option<&FileRecord>;

    fn contains(&self, path: &Path) -> bool {
        self.get(path).is_some()
    }

    fn put(&mut self, record: FileRecord);

    fn remove(&mut self, path: &Path) -> Option<FileRecord>;

    /// Drop every record below `root`; returns the number removed
    fn clear_below(&mut self, root: &Path) -> usize;

    /// Indexed files below `root`, sorted
    fn files_below(&self, root: &Path) -> Vec<PathBuf>;

    /// Files whose resolved includes contain `path`, sorted
    fn includers_of(&self, path: &Path) -> Vec<PathBuf>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn statistics(&self) -> IndexStatistics;
}

pub type IndexReadGuard<'a> = RwLockReadGuard<'a, Box<dyn IndexStore>>;
pub type IndexWriteGuard<'a> = RwLockWriteGuard<'a, Box<dyn IndexStore>>;

/// Shared handle to the persisted index
#[derive(Clone)]
pub struct SharedIndex {
    store: Arc<RwLock<Box<dyn IndexStore>>>,
    lock_timeout: Duration,
    events: Option<mpsc::Sender<IndexEvent>>,
}

impl SharedIndex {
    pub fn new(store: impl IndexStore + 'static) -> Self {
        Self {
            store: Arc::new(RwLock::new(Box::new(store))),
            lock_timeout: Duration::from_secs(DEFAULT_LOCK_TIMEOUT_SECS),
            events: None,
        }
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    /// Send change events to `sender`
    pub fn with_events(mut self, sender: mpsc::Sender<IndexEvent>) -> Self {
        self.events = Some(sender);
        self
    }

    pub fn lock_timeout(&self) -> Duration {
        self.lock_timeout
    }

    /// Acquire the read lock, giving up after the lock timeout
    pub async fn read(&self) -> Result<IndexReadGuard<'_>, IndexError> {
        trace!("Acquiring index read lock");
        tokio::time::timeout(self.lock_timeout, self.store.read())
            .await
            .map_err(|_| IndexError::read_timeout(self.lock_timeout))
    }

    /// Acquire the write lock, giving up after the lock timeout
    pub async fn write(&self) -> Result<IndexWriteGuard<'_>, IndexError> {
        trace!("Acquiring index write lock");
        tokio::time::timeout(self.lock_timeout, self.store.write())
            .await
            .map_err(|_| IndexError::write_timeout(self.lock_timeout))
    }

    /// Publish a change event; dropped with a warning when nobody keeps up
    pub fn notify(&self, event: IndexEvent) {
        if let Some(sender) = &self.events
            && sender.try_send(event).is_err()
        {
            warn!("SharedIndex: Failed to send index event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::memory::MemoryIndex;

    fn record(path: &str, includes: Vec<IncludeDirective>) -> FileRecord {
        FileRecord {
            path: PathBuf::from(path),
            kind: UnitKind::Source,
            membership: Membership::Member,
            modified: SystemTime::UNIX_EPOCH,
            size: 10,
            content_hash: "abc".to_string(),
            includes,
            mode: IndexerMode::Fast,
            indexed_at: Utc::now(),
        }
    }

    #[test]
    fn test_record_staleness() {
        let rec = record("/p/a.c", vec![]);
        assert!(!rec.is_outdated(&FileMetadata::new(SystemTime::UNIX_EPOCH, 10)));
        assert!(rec.is_outdated(&FileMetadata::new(SystemTime::UNIX_EPOCH, 11)));
        assert!(rec.is_outdated(&FileMetadata::new(
            SystemTime::UNIX_EPOCH + Duration::from_secs(1),
            10
        )));
    }

    #[test]
    fn test_unresolved_includes() {
        let rec = record(
            "/p/a.c",
            vec![
                IncludeDirective {
                    name: "a.h".to_string(),
                    system: false,
                    resolved: Some(PathBuf::from("/p/a.h")),
                },
                IncludeDirective {
                    name: "gen.h".to_string(),
                    system: false,
                    resolved: None,
                },
            ],
        );
        assert!(rec.has_unresolved_includes());
        assert!(rec.includes_file(Path::new("/p/a.h")));
        assert!(!rec.includes_file(Path::new("/p/gen.h")));
    }

    #[tokio::test]
    async fn test_write_lock_times_out_while_read_held() {
        let index = SharedIndex::new(MemoryIndex::new()).with_lock_timeout(Duration::from_millis(20));
        let _reader = index.read().await.unwrap();

        let result = index.write().await;
        assert!(matches!(
            result,
            Err(IndexError::LockTimeout { access: "write", .. })
        ));
    }

    #[tokio::test]
    async fn test_events_are_delivered() {
        let (tx, mut rx) = mpsc::channel(4);
        let index = SharedIndex::new(MemoryIndex::new()).with_events(tx);

        index.notify(IndexEvent::Reloaded);
        assert_eq!(rx.recv().await, Some(IndexEvent::Reloaded));
    }

    #[tokio::test]
    async fn test_clones_share_the_store() {
        let index = SharedIndex::new(MemoryIndex::new());
        let other = index.clone();

        index.write().await.unwrap().put(record("/p/a.c", vec![]));
        assert!(other.read().await.unwrap().contains(Path::new("/p/a.c")));
    }
}
