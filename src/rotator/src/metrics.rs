//! Rotation metrics
//!
//! Thread-safe counters shared by every table owner.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Thread-safe metrics for tracking partition rotation
#[derive(Debug, Clone)]
pub struct RotationMetrics {
    inner: Arc<MetricsInner>,
}

#[derive(Debug, Default)]
struct MetricsInner {
    /// Ticks observed across all tables
    ticks: AtomicUsize,
    /// Ticks answered by the ceiling fast path
    ticks_skipped: AtomicUsize,
    /// Planning passes run against a fresh read
    reconciliations: AtomicUsize,
    read_failures: AtomicUsize,
    partitions_created: AtomicUsize,
    partitions_dropped: AtomicUsize,
    create_failures: AtomicUsize,
    drop_failures: AtomicUsize,
}

impl Default for RotationMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl RotationMetrics {
    /// Create a new metrics tracker
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MetricsInner::default()),
        }
    }

    pub fn record_tick(&self) {
        self.inner.ticks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_tick_skipped(&self) {
        self.inner.ticks_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_reconciliation(&self) {
        self.inner.reconciliations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_read_failure(&self) {
        self.inner.read_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_partitions_created(&self, count: usize) {
        self.inner
            .partitions_created
            .fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_partitions_dropped(&self, count: usize) {
        self.inner
            .partitions_dropped
            .fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_create_failures(&self, count: usize) {
        self.inner.create_failures.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_drop_failures(&self, count: usize) {
        self.inner.drop_failures.fetch_add(count, Ordering::Relaxed);
    }

    pub fn ticks(&self) -> usize {
        self.inner.ticks.load(Ordering::Relaxed)
    }

    pub fn ticks_skipped(&self) -> usize {
        self.inner.ticks_skipped.load(Ordering::Relaxed)
    }

    pub fn reconciliations(&self) -> usize {
        self.inner.reconciliations.load(Ordering::Relaxed)
    }

    pub fn read_failures(&self) -> usize {
        self.inner.read_failures.load(Ordering::Relaxed)
    }

    pub fn partitions_created(&self) -> usize {
        self.inner.partitions_created.load(Ordering::Relaxed)
    }

    pub fn partitions_dropped(&self) -> usize {
        self.inner.partitions_dropped.load(Ordering::Relaxed)
    }

    pub fn create_failures(&self) -> usize {
        self.inner.create_failures.load(Ordering::Relaxed)
    }

    pub fn drop_failures(&self) -> usize {
        self.inner.drop_failures.load(Ordering::Relaxed)
    }

    /// Snapshot of all counters
    pub fn summary(&self) -> MetricsSummary {
        MetricsSummary {
            ticks: self.ticks(),
            ticks_skipped: self.ticks_skipped(),
            reconciliations: self.reconciliations(),
            read_failures: self.read_failures(),
            partitions_created: self.partitions_created(),
            partitions_dropped: self.partitions_dropped(),
            create_failures: self.create_failures(),
            drop_failures: self.drop_failures(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricsSummary {
    pub ticks: usize,
    pub ticks_skipped: usize,
    pub reconciliations: usize,
    pub read_failures: usize,
    pub partitions_created: usize,
    pub partitions_dropped: usize,
    pub create_failures: usize,
    pub drop_failures: usize,
}

impl MetricsSummary {
    /// Log the metrics summary
    pub fn log(&self) {
        log::info!("=== Rotation Metrics Summary ===");
        log::info!(
            "Ticks: {} total, {} skipped, {} reconciled, {} read failures",
            self.ticks,
            self.ticks_skipped,
            self.reconciliations,
            self.read_failures
        );
        log::info!(
            "Partitions: {} created ({} failed), {} dropped ({} failed)",
            self.partitions_created,
            self.create_failures,
            self.partitions_dropped,
            self.drop_failures
        );
    }
}
