//! Retention Metrics
//!
//! Thread-safe counters for monitoring retention runs.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Thread-safe metrics for tracking retention runs
#[derive(Debug, Clone)]
pub struct RetentionMetrics {
    inner: Arc<MetricsInner>,
}

#[derive(Debug, Default)]
struct MetricsInner {
    /// Number of service passes completed (including failed ones)
    services_processed: AtomicUsize,
    /// Number of service passes skipped because one was already running
    services_skipped: AtomicUsize,
    /// Expired records returned by the store
    records_selected: AtomicUsize,
    records_archived: AtomicUsize,
    records_deleted: AtomicUsize,
    archive_failures: AtomicUsize,
    delete_failures: AtomicUsize,
    /// Total duration in milliseconds
    total_duration_ms: AtomicU64,
}

impl Default for RetentionMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl RetentionMetrics {
    /// Create a new metrics tracker
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MetricsInner::default()),
        }
    }

    pub fn record_service_processed(&self) {
        self.inner.services_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_service_skipped(&self) {
        self.inner.services_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_selected(&self, count: usize) {
        self.inner
            .records_selected
            .fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_archived(&self) {
        self.inner.records_archived.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_deleted(&self) {
        self.inner.records_deleted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_archive_failure(&self) {
        self.inner.archive_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_delete_failure(&self) {
        self.inner.delete_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Record operation duration
    pub fn record_duration_ms(&self, duration_ms: u64) {
        self.inner
            .total_duration_ms
            .fetch_add(duration_ms, Ordering::Relaxed);
    }

    pub fn services_processed(&self) -> usize {
        self.inner.services_processed.load(Ordering::Relaxed)
    }

    pub fn services_skipped(&self) -> usize {
        self.inner.services_skipped.load(Ordering::Relaxed)
    }

    pub fn records_selected(&self) -> usize {
        self.inner.records_selected.load(Ordering::Relaxed)
    }

    pub fn records_archived(&self) -> usize {
        self.inner.records_archived.load(Ordering::Relaxed)
    }

    pub fn records_deleted(&self) -> usize {
        self.inner.records_deleted.load(Ordering::Relaxed)
    }

    pub fn archive_failures(&self) -> usize {
        self.inner.archive_failures.load(Ordering::Relaxed)
    }

    pub fn delete_failures(&self) -> usize {
        self.inner.delete_failures.load(Ordering::Relaxed)
    }

    /// Get total duration in milliseconds
    pub fn total_duration_ms(&self) -> u64 {
        self.inner.total_duration_ms.load(Ordering::Relaxed)
    }
}
