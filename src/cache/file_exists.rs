//! Directory-listing cache for "is this path a regular file?" queries
//!
//! Each parent directory is listed once; sibling lookups are then a binary
//! search over the sorted names. Whether an entry is a regular file is stat'ed
//! at most once per entry and remembered in a two-bit-per-entry set.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use tracing::{debug, trace};

use crate::io::FileSystemTrait;

type ListingMap = HashMap<PathBuf, DirectoryListing>;

const FILE_BIT: u64 = 0b01;
const NON_FILE_BIT: u64 = 0b10;

/// What the cache knows about one entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntryState {
    Unknown,
    File,
    NonFile,
}

/// Sorted, case-normalized names of one directory plus per-entry file bits
#[derive(Debug)]
struct DirectoryListing {
    /// Sorted normalized names, unique
    names: Vec<String>,
    /// Original on-disk names, parallel to `names`
    originals: Vec<String>,
    bits: Vec<u64>,
}

impl DirectoryListing {
    fn load(fs: &dyn FileSystemTrait, dir: &Path, case_insensitive: bool) -> Self {
        let entries = match fs.list_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                trace!("Treating {} as empty: {}", dir.display(), e);
                Vec::new()
            }
        };

        let mut pairs: Vec<(String, String)> = entries
            .into_iter()
            .map(|name| (normalize(&name, case_insensitive), name))
            .collect();
        pairs.sort();
        pairs.dedup_by(|a, b| a.0 == b.0);

        let (names, originals): (Vec<_>, Vec<_>) = pairs.into_iter().unzip();
        let words = (names.len() * 2).div_ceil(64);
        Self {
            names,
            originals,
            bits: vec![0; words],
        }
    }

    fn lookup(&self, name: &str) -> Option<usize> {
        self.names.binary_search_by(|probe| probe.as_str().cmp(name)).ok()
    }

    fn state(&self, index: usize) -> EntryState {
        let bit = index * 2;
        let word = self.bits[bit / 64] >> (bit % 64);
        if word & FILE_BIT != 0 {
            EntryState::File
        } else if word & NON_FILE_BIT != 0 {
            EntryState::NonFile
        } else {
            EntryState::Unknown
        }
    }

    /// Record the stat result; bits are only ever set, never cleared
    fn record(&mut self, index: usize, is_file: bool) {
        let bit = index * 2;
        let mask = if is_file { FILE_BIT } else { NON_FILE_BIT };
        self.bits[bit / 64] |= mask << (bit % 64);
    }
}

fn normalize(name: &str, case_insensitive: bool) -> String {
    if case_insensitive {
        name.to_lowercase()
    } else {
        name.to_string()
    }
}

/// Existence cache owned by one indexing run
///
/// The backing map may be emptied at any time through a [`CacheReclaimer`];
/// the next query simply lists the directory again.
pub struct FileExistenceCache {
    fs: Arc<dyn FileSystemTrait>,
    store: Arc<Mutex<ListingMap>>,
    case_insensitive: bool,
    bypass: bool,
}

impl FileExistenceCache {
    pub fn new(fs: Arc<dyn FileSystemTrait>, case_insensitive: bool) -> Self {
        Self {
            fs,
            store: Arc::new(Mutex::new(HashMap::new())),
            case_insensitive,
            bypass: false,
        }
    }

    /// Query the file system on every call instead of caching
    pub fn with_bypass(mut self, bypass: bool) -> Self {
        self.bypass = bypass;
        self
    }

    pub fn is_case_insensitive(&self) -> bool {
        self.case_insensitive
    }

    /// Whether `path` names an existing regular file; I/O errors count as "no"
    pub fn is_file(&self, path: &Path) -> bool {
        if self.bypass {
            return self.fs.is_file(path);
        }
        let (Some(parent), Some(name)) = (path.parent(), path.file_name()) else {
            return self.fs.is_file(path);
        };
        let name = normalize(&name.to_string_lossy(), self.case_insensitive);

        let mut store = self.lock();
        let listing = store.entry(parent.to_path_buf()).or_insert_with(|| {
            trace!("Listing {}", parent.display());
            DirectoryListing::load(self.fs.as_ref(), parent, self.case_insensitive)
        });

        let Some(index) = listing.lookup(&name) else {
            return false;
        };
        match listing.state(index) {
            EntryState::File => true,
            EntryState::NonFile => false,
            EntryState::Unknown => {
                let is_file = self.fs.is_file(&parent.join(&listing.originals[index]));
                listing.record(index, is_file);
                is_file
            }
        }
    }

    /// Number of directories currently listed
    pub fn cached_directories(&self) -> usize {
        self.lock().len()
    }

    /// Drop every cached listing
    pub fn evict(&self) {
        evict_store(&self.store);
    }

    /// Handle that can empty this cache from another thread
    pub fn reclaimer(&self) -> CacheReclaimer {
        CacheReclaimer {
            store: Arc::downgrade(&self.store),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ListingMap> {
        self.store.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn evict_store(store: &Mutex<ListingMap>) {
    let mut guard = store.lock().unwrap_or_else(|e| e.into_inner());
    let dropped = std::mem::take(&mut *guard);
    debug!(
        "Evicted file existence cache ({} directories)",
        dropped.len()
    );
}

/// Memory-pressure hook for a [`FileExistenceCache`]
///
/// Holds only a weak reference, so it never keeps a finished run's cache alive.
#[derive(Debug, Clone)]
pub struct CacheReclaimer {
    store: Weak<Mutex<ListingMap>>,
}

impl CacheReclaimer {
    /// Empty the cache; returns false when the cache is already gone
    pub fn reclaim(&self) -> bool {
        match self.store.upgrade() {
            Some(store) => {
                evict_store(&store);
                true
            }
            None => false,
        }
    }
}
