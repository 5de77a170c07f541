//! Stale call-stack pruning (spec §4.2).
//!
//! A secondary, append-only call-stack list used for cross-cutting
//! correlation outside the primary [`TraceContext`](crate::context::TraceContext)
//! lifecycle. Entries older than the TTL (5 minutes by default) are
//! evicted lazily on each access rather than by a background sweep.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{Duration, Instant};

const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Clone)]
struct Entry {
    method_name: String,
    pushed_at: Instant,
}

/// Registry of recently-entered method names, pruned of anything older
/// than `ttl` whenever it's accessed.
#[derive(Debug)]
pub struct CallStackRegistry {
    entries: Mutex<VecDeque<Entry>>,
    ttl: Duration,
}

impl Default for CallStackRegistry {
    fn default() -> Self {
        Self::with_ttl(DEFAULT_TTL)
    }
}

impl CallStackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(VecDeque::new()),
            ttl,
        }
    }

    pub fn push(&self, method_name: impl Into<String>) {
        let mut entries = self.entries.lock().unwrap();
        self.prune(&mut entries);
        entries.push_back(Entry {
            method_name: method_name.into(),
            pushed_at: Instant::now(),
        });
    }

    pub fn snapshot(&self) -> Vec<String> {
        let mut entries = self.entries.lock().unwrap();
        self.prune(&mut entries);
        entries.iter().map(|e| e.method_name.clone()).collect()
    }

    pub fn len(&self) -> usize {
        let mut entries = self.entries.lock().unwrap();
        self.prune(&mut entries);
        entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn prune(&self, entries: &mut VecDeque<Entry>) {
        let now = Instant::now();
        while let Some(front) = entries.front() {
            if now.duration_since(front.pushed_at) > self.ttl {
                entries.pop_front();
            } else {
                break;
            }
        }
    }
}
