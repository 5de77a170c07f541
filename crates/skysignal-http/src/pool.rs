//! Fixed-size request-record object pool (spec §4.5 "Object pool").
//!
//! A small ring of pre-allocated [`HttpRequestRecord`]s is rotated
//! circularly so the hot request path doesn't allocate a fresh record
//! per request; callers take a shallow clone when enqueuing to the
//! ingestion client so the slot is free to be reused immediately.

use skysignal_types::HttpRequestRecord;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Pool size (spec §4.5: "fixed-size pool (50)").
pub const POOL_SIZE: usize = 50;

pub struct RequestRecordPool {
    slots: Mutex<Vec<HttpRequestRecord>>,
    next: AtomicUsize,
}

impl Default for RequestRecordPool {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestRecordPool {
    pub fn new() -> Self {
        Self {
            slots: Mutex::new(vec![HttpRequestRecord::default(); POOL_SIZE]),
            next: AtomicUsize::new(0),
        }
    }

    /// Fill the next slot in the rotation with `record` and return a
    /// shallow clone for the caller to enqueue.
    pub fn record(&self, record: HttpRequestRecord) -> HttpRequestRecord {
        let idx = self.next.fetch_add(1, Ordering::Relaxed) % POOL_SIZE;
        let mut slots = self.slots.lock().unwrap();
        slots[idx] = record.clone();
        record
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rotates_through_fixed_capacity() {
        let pool = RequestRecordPool::new();
        for i in 0..(POOL_SIZE * 3) {
            let mut record = HttpRequestRecord::default();
            record.path = format!("/req/{i}");
            let out = pool.record(record);
            assert_eq!(out.path, format!("/req/{i}"));
        }
    }
}
