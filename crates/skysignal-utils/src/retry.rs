//! Retry policy with exponential backoff, adapted from the teacher's
//! `riptide-utils::retry::RetryPolicy` for the Ingestion Client's
//! `RetryEntry` model (spec §3, §4.1): here the caller tracks its own
//! `retry_count` per entry rather than looping inside one call, since
//! retries are scheduled independently per stream via timers rather than
//! awaited inline.

use std::time::Duration;

/// Backoff policy: `min(base_delay * 2^retry_count, max_delay)`.
#[derive(Debug, Clone, Copy)]
pub struct BackoffPolicy {
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub max_retries: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base_delay_ms: 1_000,
            max_delay_ms: 30_000,
            max_retries: 3,
        }
    }
}

impl BackoffPolicy {
    pub fn new(base_delay_ms: u64, max_delay_ms: u64, max_retries: u32) -> Self {
        Self {
            base_delay_ms,
            max_delay_ms,
            max_retries,
        }
    }

    /// Backoff duration for the given retry count, capped at `max_delay_ms`.
    pub fn backoff_duration(&self, retry_count: u32) -> Duration {
        let millis = (self.base_delay_ms as f64) * 2f64.powi(retry_count as i32);
        let capped = millis.min(self.max_delay_ms as f64) as u64;
        Duration::from_millis(capped)
    }

    /// Whether an entry at `retry_count` has exhausted its retries and
    /// should be dropped permanently (spec §4.1: `retryCount > maxRetries`).
    pub fn exhausted(&self, retry_count: u32) -> bool {
        retry_count > self.max_retries
    }
}

/// An entry awaiting retry: the batch items (opaque to this module) plus
/// how many attempts have already been made.
#[derive(Debug, Clone)]
pub struct RetryEntry<T> {
    pub items: T,
    pub retry_count: u32,
}

impl<T> RetryEntry<T> {
    pub fn new(items: T) -> Self {
        Self { items, retry_count: 0 }
    }

    /// Bump the retry count, as happens each time a dispatch fails again.
    pub fn bumped(mut self) -> Self {
        self.retry_count += 1;
        self
    }
}

/// Bounded FIFO queue of [`RetryEntry`]s. Overflow drops the oldest
/// entry (spec §3: cap 100, drop-oldest).
#[derive(Debug)]
pub struct RetryQueue<T> {
    capacity: usize,
    entries: std::collections::VecDeque<RetryEntry<T>>,
}

impl<T> RetryQueue<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: std::collections::VecDeque::new(),
        }
    }

    /// Push an entry; drops the oldest if the queue is at capacity.
    pub fn push(&mut self, entry: RetryEntry<T>) {
        if self.entries.len() >= self.capacity {
            self.entries.pop_front();
            tracing::warn!(capacity = self.capacity, "retry queue full; dropped oldest entry");
        }
        self.entries.push_back(entry);
    }

    pub fn pop_front(&mut self) -> Option<RetryEntry<T>> {
        self.entries.pop_front()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Default cap on a stream's retry queue (spec §3).
pub const MAX_RETRY_QUEUE_SIZE: usize = 100;
