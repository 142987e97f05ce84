use serde::Serialize;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::types::SyncSummary;

/// Counters across every library sync of this process.
#[derive(Clone)]
pub struct Metrics {
    pub syncs_started: Arc<AtomicUsize>,
    pub syncs_completed: Arc<AtomicUsize>,
    pub syncs_failed: Arc<AtomicUsize>,
    pub syncs_cancelled: Arc<AtomicUsize>,
    pub titles_changed: Arc<AtomicU64>,
    pub books_changed: Arc<AtomicU64>,
    pub pages_scanned: Arc<AtomicU64>,
    pub warnings_count: Arc<AtomicU64>,
    pub start_time: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            syncs_started: Arc::new(AtomicUsize::new(0)),
            syncs_completed: Arc::new(AtomicUsize::new(0)),
            syncs_failed: Arc::new(AtomicUsize::new(0)),
            syncs_cancelled: Arc::new(AtomicUsize::new(0)),
            titles_changed: Arc::new(AtomicU64::new(0)),
            books_changed: Arc::new(AtomicU64::new(0)),
            pages_scanned: Arc::new(AtomicU64::new(0)),
            warnings_count: Arc::new(AtomicU64::new(0)),
            start_time: Instant::now(),
        }
    }

    pub fn inc_syncs_started(&self) {
        self.syncs_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_syncs_failed(&self) {
        self.syncs_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_syncs_cancelled(&self) {
        self.syncs_cancelled.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a completed sync and folds its summary into the totals.
    pub fn record_completed(&self, summary: &SyncSummary) {
        self.syncs_completed.fetch_add(1, Ordering::Relaxed);
        self.titles_changed.fetch_add(
            summary.titles_added + summary.titles_updated + summary.titles_removed,
            Ordering::Relaxed,
        );
        self.books_changed.fetch_add(
            summary.books_added + summary.books_updated + summary.books_removed,
            Ordering::Relaxed,
        );
        self.pages_scanned.fetch_add(summary.pages_inserted, Ordering::Relaxed);
        self.warnings_count.fetch_add(summary.warnings, Ordering::Relaxed);
    }

    pub fn get_snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            syncs_started: self.syncs_started.load(Ordering::Relaxed),
            syncs_completed: self.syncs_completed.load(Ordering::Relaxed),
            syncs_failed: self.syncs_failed.load(Ordering::Relaxed),
            syncs_cancelled: self.syncs_cancelled.load(Ordering::Relaxed),
            titles_changed: self.titles_changed.load(Ordering::Relaxed),
            books_changed: self.books_changed.load(Ordering::Relaxed),
            pages_scanned: self.pages_scanned.load(Ordering::Relaxed),
            warnings_count: self.warnings_count.load(Ordering::Relaxed),
            uptime_seconds: self.start_time.elapsed().as_secs(),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Serialize)]
pub struct MetricsSnapshot {
    pub syncs_started: usize,
    pub syncs_completed: usize,
    pub syncs_failed: usize,
    pub syncs_cancelled: usize,
    pub titles_changed: u64,
    pub books_changed: u64,
    pub pages_scanned: u64,
    pub warnings_count: u64,
    pub uptime_seconds: u64,
}
