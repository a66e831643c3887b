//! In-process index store

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

use crate::index::store::{FileRecord, IndexStatistics, IndexStore};
use crate::project::element::{Membership, UnitKind};

/// Index store kept entirely in memory, ordered by path
#[derive(Debug, Default, Clone)]
pub struct MemoryIndex {
    records: BTreeMap<PathBuf, FileRecord>,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> impl Iterator<Item = &FileRecord> {
        self.records.values()
    }
}

impl IndexStore for MemoryIndex {
    fn get(&self, path: &Path) -> Option<&FileRecord> {
        self.records.get(path)
    }

    fn put(&mut self, record: FileRecord) {
        trace!("Storing index record for {:?}", record.path);
        self.records.insert(record.path.clone(), record);
    }

    fn remove(&mut self, path: &Path) -> Option<FileRecord> {
        self.records.remove(path)
    }

    fn clear_below(&mut self, root: &Path) -> usize {
        let before = self.records.len();
        self.records.retain(|path, _| !path.starts_with(root));
        let removed = before - self.records.len();
        debug!("Cleared {} index records below {:?}", removed, root);
        removed
    }

    fn files_below(&self, root: &Path) -> Vec<PathBuf> {
        self.records
            .keys()
            .filter(|path| path.starts_with(root))
            .cloned()
            .collect()
    }

    fn includers_of(&self, path: &Path) -> Vec<PathBuf> {
        self.records
            .values()
            .filter(|record| record.includes_file(path))
            .map(|record| record.path.clone())
            .collect()
    }

    fn len(&self) -> usize {
        self.records.len()
    }

    fn statistics(&self) -> IndexStatistics {
        let mut stats = IndexStatistics {
            total_files: self.records.len(),
            ..Default::default()
        };

        for record in self.records.values() {
            match record.kind {
                UnitKind::Source => stats.sources += 1,
                UnitKind::Header => stats.headers += 1,
            }
            if record.membership == Membership::Member {
                stats.members += 1;
            }
            stats.includes += record.includes.len();
            stats.unresolved_includes += record
                .includes
                .iter()
                .filter(|include| !include.is_resolved())
                .count();
        }

        stats
    }
}
