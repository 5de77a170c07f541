//! Ingestion-wide counters, exposed for diagnostics and tests.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters tracking sampling drops, permanent batch failures, and
/// retry-queue overflow drops across all streams.
#[derive(Debug, Default)]
pub struct IngestionCounters {
    /// Items dropped at the sampling boundary (spec §4.1).
    pub sampled: AtomicU64,
    /// Items whose batch was permanently dropped (serialization failure
    /// or retry exhaustion).
    pub failed: AtomicU64,
    /// Retry-queue entries dropped due to the queue being at capacity.
    pub retry_dropped: AtomicU64,
}

impl IngestionCounters {
    pub fn bump_sampled(&self) {
        self.sampled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn bump_failed(&self, count: u64) {
        self.failed.fetch_add(count, Ordering::Relaxed);
    }

    pub fn bump_retry_dropped(&self, count: u64) {
        self.retry_dropped.fetch_add(count, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            sampled: self.sampled.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            retry_dropped: self.retry_dropped.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time read of [`IngestionCounters`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterSnapshot {
    pub sampled: u64,
    pub failed: u64,
    pub retry_dropped: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_start_at_zero() {
        let counters = IngestionCounters::default();
        let snap = counters.snapshot();
        assert_eq!(snap.sampled, 0);
        assert_eq!(snap.failed, 0);
        assert_eq!(snap.retry_dropped, 0);
    }

    #[test]
    fn bumps_accumulate() {
        let counters = IngestionCounters::default();
        counters.bump_sampled();
        counters.bump_sampled();
        counters.bump_failed(3);
        let snap = counters.snapshot();
        assert_eq!(snap.sampled, 2);
        assert_eq!(snap.failed, 3);
    }
}
