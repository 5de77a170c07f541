//! Per-stream batch accumulation (spec §4.1).
//!
//! A [`BatchState`] tracks the items queued for one stream along with a
//! running byte-size estimate, so the flush trigger (`batchSize` items OR
//! `batchSizeBytes` bytes) can be checked without re-walking every
//! accumulated item on each push.

use serde_json::Value;
use skysignal_utils::estimate_size;
use std::collections::HashSet;

/// Items are boxed so their heap address stays fixed as the batch grows
/// — `seen` keys off that address to honor spec §4.8's "shared
/// subgraphs across a batch are counted once" requirement, which a
/// fresh per-push cycle set (discarded as soon as the call returns)
/// cannot do.
#[derive(Debug, Default)]
pub struct BatchState {
    items: Vec<Box<Value>>,
    size_bytes: usize,
    seen: HashSet<*const Value>,
}

impl BatchState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, item: Value) {
        let boxed = Box::new(item);
        self.size_bytes += estimate_size(&boxed, &mut self.seen);
        self.items.push(boxed);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn size_bytes(&self) -> usize {
        self.size_bytes
    }

    /// Whether this batch has reached either flush threshold.
    pub fn exceeds(&self, max_items: usize, max_bytes: usize) -> bool {
        self.items.len() >= max_items || self.size_bytes >= max_bytes
    }

    /// Drain all accumulated items, resetting the batch to empty.
    pub fn take(&mut self) -> Vec<Box<Value>> {
        self.size_bytes = 0;
        self.seen.clear();
        std::mem::take(&mut self.items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_batch_does_not_exceed() {
        let batch = BatchState::new();
        assert!(!batch.exceeds(1, 1));
    }

    #[test]
    fn exceeds_triggers_on_item_count() {
        let mut batch = BatchState::new();
        batch.push(json!({"a": 1}));
        assert!(batch.exceeds(1, usize::MAX));
    }

    #[test]
    fn exceeds_triggers_on_byte_size() {
        let mut batch = BatchState::new();
        batch.push(json!("x".repeat(1000)));
        assert!(batch.exceeds(usize::MAX, 100));
    }

    #[test]
    fn take_drains_and_resets_size() {
        let mut batch = BatchState::new();
        batch.push(json!(1));
        batch.push(json!(2));
        let items = batch.take();
        assert_eq!(items.len(), 2);
        assert!(batch.is_empty());
        assert_eq!(batch.size_bytes(), 0);
    }
}
