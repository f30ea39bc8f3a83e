use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;
use serde::{Serialize, Deserialize};
use crate::cache::row_cache::CacheStats;

/// Commit counters, updated without taking the commit lock.
#[derive(Debug)]
pub struct CommitStats {
    start_time: SystemTime,
    commits: AtomicU64,
    failed_commits: AtomicU64,
    conflicts: AtomicU64,
    ids_allocated: AtomicU64,
    rows_written: AtomicU64,
    patches_applied: AtomicU64,
}

impl Default for CommitStats {
    fn default() -> Self {
        CommitStats {
            start_time: SystemTime::now(),
            commits: AtomicU64::new(0),
            failed_commits: AtomicU64::new(0),
            conflicts: AtomicU64::new(0),
            ids_allocated: AtomicU64::new(0),
            rows_written: AtomicU64::new(0),
            patches_applied: AtomicU64::new(0),
        }
    }
}

impl CommitStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_commit(&self, ids: usize, rows: usize, patches: usize) {
        self.commits.fetch_add(1, Ordering::Relaxed);
        self.ids_allocated.fetch_add(ids as u64, Ordering::Relaxed);
        self.rows_written.fetch_add(rows as u64, Ordering::Relaxed);
        self.patches_applied.fetch_add(patches as u64, Ordering::Relaxed);
    }

    pub fn record_failure(&self, conflict: bool) {
        if conflict {
            self.conflicts.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failed_commits.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn snapshot(&self, row_cache: Option<CacheStats>) -> DatabaseStats {
        DatabaseStats {
            uptime_secs: self.start_time.elapsed().map(|d| d.as_secs()).unwrap_or(0),
            start_time: self.start_time,
            commits: self.commits.load(Ordering::Relaxed),
            failed_commits: self.failed_commits.load(Ordering::Relaxed),
            conflicts: self.conflicts.load(Ordering::Relaxed),
            ids_allocated: self.ids_allocated.load(Ordering::Relaxed),
            rows_written: self.rows_written.load(Ordering::Relaxed),
            patches_applied: self.patches_applied.load(Ordering::Relaxed),
            row_cache,
        }
    }
}

/// Database statistics for monitoring
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseStats {
    // General info
    pub uptime_secs: u64,
    pub start_time: SystemTime,

    // Commit metrics
    pub commits: u64,
    pub failed_commits: u64,
    pub conflicts: u64,               // long-term lock conflicts, not counted as failures
    pub ids_allocated: u64,
    pub rows_written: u64,
    pub patches_applied: u64,

    #[serde(skip_deserializing)]
    pub row_cache: Option<CacheStats>,
}
