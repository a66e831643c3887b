use serde::Serialize;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

/// Snapshot of a task's progress
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IndexerProgress {
    pub completed_sources: usize,
    pub completed_headers: usize,
    pub remaining_sources: usize,
    pub remaining_headers: usize,
    /// Files left out by policy or the size limit
    pub skipped: usize,
    /// Estimated time until the remaining files are done
    pub time_estimate: Duration,
}

impl IndexerProgress {
    /// Estimate reported before a composite task knows its work
    pub fn placeholder() -> Self {
        Self::default()
    }

    pub fn completed(&self) -> usize {
        self.completed_sources + self.completed_headers
    }

    pub fn remaining(&self) -> usize {
        self.remaining_sources + self.remaining_headers
    }
}

/// Lock-free progress counters updated by the running task
#[derive(Debug, Default)]
pub(crate) struct ProgressCounters {
    completed_sources: AtomicUsize,
    completed_headers: AtomicUsize,
    remaining_sources: AtomicUsize,
    remaining_headers: AtomicUsize,
    skipped: AtomicUsize,
    started: Mutex<Option<Instant>>,
}

impl ProgressCounters {
    pub(crate) fn start(&self) {
        let mut started = self.started.lock().unwrap_or_else(|e| e.into_inner());
        started.get_or_insert_with(Instant::now);
    }

    pub(crate) fn add_remaining(&self, header: bool, count: usize) {
        self.remaining(header).fetch_add(count, Ordering::SeqCst);
    }

    /// A file left the queue without completing
    pub(crate) fn drop_remaining(&self, header: bool) {
        let counter = self.remaining(header);
        let _ = counter.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
    }

    pub(crate) fn complete(&self, header: bool) {
        let completed = if header {
            &self.completed_headers
        } else {
            &self.completed_sources
        };
        completed.fetch_add(1, Ordering::SeqCst);
        self.drop_remaining(header);
    }

    pub(crate) fn skip(&self, header: bool) {
        self.skipped.fetch_add(1, Ordering::SeqCst);
        self.drop_remaining(header);
    }

    pub(crate) fn snapshot(&self) -> IndexerProgress {
        let mut progress = IndexerProgress {
            completed_sources: self.completed_sources.load(Ordering::SeqCst),
            completed_headers: self.completed_headers.load(Ordering::SeqCst),
            remaining_sources: self.remaining_sources.load(Ordering::SeqCst),
            remaining_headers: self.remaining_headers.load(Ordering::SeqCst),
            skipped: self.skipped.load(Ordering::SeqCst),
            time_estimate: Duration::ZERO,
        };

        let started = *self.started.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(started) = started {
            progress.time_estimate = estimate_remaining(
                started.elapsed(),
                progress.completed() + progress.skipped,
                progress.remaining(),
            );
        }
        progress
    }

    fn remaining(&self, header: bool) -> &AtomicUsize {
        if header {
            &self.remaining_headers
        } else {
            &self.remaining_sources
        }
    }
}

/// Time left at the average pace so far; saturates instead of overflowing
fn estimate_remaining(elapsed: Duration, done: usize, remaining: usize) -> Duration {
    if done == 0 || remaining == 0 {
        return Duration::ZERO;
    }
    let seconds = elapsed.as_secs_f64() / done as f64 * remaining as f64;
    Duration::try_from_secs_f64(seconds).unwrap_or(Duration::MAX)
}
