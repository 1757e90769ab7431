//! Atomic counters for hot-path metrics
//!
//! Lock-free counters that can be safely updated from any thread.

use std::sync::atomic::{AtomicU64, Ordering};

/// Process-wide counters for guarded reads
pub static METRICS: Metrics = Metrics::new();

/// Counters that are not tied to a single pool
pub struct Metrics {
    pub reads_total: AtomicU64,
    pub read_errors: AtomicU64,
    pub read_faults: AtomicU64,
    pub bytes_read: AtomicU64,
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            reads_total: AtomicU64::new(0),
            read_errors: AtomicU64::new(0),
            read_faults: AtomicU64::new(0),
            bytes_read: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn read_ok(&self, bytes: u64) {
        self.reads_total.fetch_add(1, Ordering::Relaxed);
        self.bytes_read.fetch_add(bytes, Ordering::Relaxed);
    }

    #[inline]
    pub fn read_error(&self) {
        self.reads_total.fetch_add(1, Ordering::Relaxed);
        self.read_errors.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn read_fault(&self) {
        self.reads_total.fetch_add(1, Ordering::Relaxed);
        self.read_faults.fetch_add(1, Ordering::Relaxed);
    }

    /// Get snapshot of all metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            reads_total: self.reads_total.load(Ordering::Relaxed),
            read_errors: self.read_errors.load(Ordering::Relaxed),
            read_faults: self.read_faults.load(Ordering::Relaxed),
            bytes_read: self.bytes_read.load(Ordering::Relaxed),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of metrics for reporting
#[derive(Debug, Clone, Default)]
pub struct MetricsSnapshot {
    pub reads_total: u64,
    pub read_errors: u64,
    pub read_faults: u64,
    pub bytes_read: u64,
}

/// Lifecycle counters owned by a single buffer manager
///
/// Every release lands in exactly one of `recycled`, `overflow_drops`,
/// `discarded` or `wrapped_releases`.
#[derive(Default)]
pub struct PoolCounters {
    acquires: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    releases: AtomicU64,
    recycled: AtomicU64,
    overflow_drops: AtomicU64,
    discarded: AtomicU64,
    wrapped_releases: AtomicU64,
}

impl PoolCounters {
    #[inline]
    pub fn hit(&self) {
        self.acquires.fetch_add(1, Ordering::Relaxed);
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn miss(&self) {
        self.acquires.fetch_add(1, Ordering::Relaxed);
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn recycled(&self) {
        self.releases.fetch_add(1, Ordering::Relaxed);
        self.recycled.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn overflow(&self) {
        self.releases.fetch_add(1, Ordering::Relaxed);
        self.overflow_drops.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn discarded(&self) {
        self.releases.fetch_add(1, Ordering::Relaxed);
        self.discarded.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn wrapped_released(&self) {
        self.releases.fetch_add(1, Ordering::Relaxed);
        self.wrapped_releases.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> PoolCountersSnapshot {
        PoolCountersSnapshot {
            acquires: self.acquires.load(Ordering::Relaxed),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            releases: self.releases.load(Ordering::Relaxed),
            recycled: self.recycled.load(Ordering::Relaxed),
            overflow_drops: self.overflow_drops.load(Ordering::Relaxed),
            discarded: self.discarded.load(Ordering::Relaxed),
            wrapped_releases: self.wrapped_releases.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`PoolCounters`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolCountersSnapshot {
    pub acquires: u64,
    pub hits: u64,
    pub misses: u64,
    pub releases: u64,
    pub recycled: u64,
    pub overflow_drops: u64,
    pub discarded: u64,
    pub wrapped_releases: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_release_outcomes_partition_releases() {
        let counters = PoolCounters::default();
        counters.hit();
        counters.miss();
        counters.miss();
        counters.recycled();
        counters.overflow();
        counters.discarded();
        counters.wrapped_released();

        let snap = counters.snapshot();
        assert_eq!(snap.acquires, 3);
        assert_eq!(snap.hits + snap.misses, snap.acquires);
        assert_eq!(
            snap.recycled + snap.overflow_drops + snap.discarded + snap.wrapped_releases,
            snap.releases
        );
    }

    #[test]
    fn test_read_counters() {
        let metrics = Metrics::new();
        metrics.read_ok(10);
        metrics.read_error();
        metrics.read_fault();

        let snap = metrics.snapshot();
        assert_eq!(snap.reads_total, 3);
        assert_eq!(snap.bytes_read, 10);
        assert_eq!(snap.read_errors, 1);
        assert_eq!(snap.read_faults, 1);
    }
}
