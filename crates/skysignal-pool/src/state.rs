//! `PoolState` (spec §3): the event-maintained model of one connection
//! pool's live connections, in-flight checkouts and error counters.

use dashmap::DashMap;
use skysignal_types::pool::{CheckOutFailureReason, PoolConfig};
use skysignal_utils::RingBuffer;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Instant;

/// Cap on the per-address FIFO of in-flight checkout start times (spec
/// §4.3: "cap 500, drop oldest on overflow").
pub const MAX_CHECKOUT_QUEUE_SIZE: usize = 500;
/// Capacity of the checkout-latency ring (spec §3, §8 property 10).
pub const CHECKOUT_LATENCY_RING_SIZE: usize = 1000;

#[derive(Debug, Clone)]
struct ConnectionInfo {
    address: String,
    in_use: bool,
}

/// Event-driven model of a single connection pool.
pub struct PoolState {
    config: Mutex<PoolConfig>,
    connections: DashMap<String, ConnectionInfo>,
    peak_connections: AtomicU64,
    checkout_queues: DashMap<String, Mutex<VecDeque<Instant>>>,
    checkout_latency: Mutex<RingBuffer>,
    timeout_errors: AtomicU64,
    connection_errors: AtomicU64,
}

impl Default for PoolState {
    fn default() -> Self {
        Self::new()
    }
}

impl PoolState {
    pub fn new() -> Self {
        Self {
            config: Mutex::new(PoolConfig::default()),
            connections: DashMap::new(),
            peak_connections: AtomicU64::new(0),
            checkout_queues: DashMap::new(),
            checkout_latency: Mutex::new(RingBuffer::new(CHECKOUT_LATENCY_RING_SIZE)),
            timeout_errors: AtomicU64::new(0),
            connection_errors: AtomicU64::new(0),
        }
    }

    pub fn set_config(&self, config: PoolConfig) {
        *self.config.lock().unwrap() = config;
    }

    pub fn config(&self) -> PoolConfig {
        self.config.lock().unwrap().clone()
    }

    pub fn connection_created(&self, id: String, address: String) {
        self.connections.insert(id, ConnectionInfo { address, in_use: false });
        let total = self.connections.len() as u64;
        self.peak_connections.fetch_max(total, Ordering::Relaxed);
    }

    pub fn connection_closed(&self, id: &str) {
        self.connections.remove(id);
    }

    pub fn checked_in(&self, id: &str) {
        if let Some(mut entry) = self.connections.get_mut(id) {
            entry.in_use = false;
        }
    }

    /// Push `now` onto the matching address's FIFO, dropping the oldest
    /// entry once at capacity.
    pub fn checkout_started(&self, address: &str) {
        let queue = self.checkout_queues.entry(address.to_string()).or_insert_with(|| Mutex::new(VecDeque::new()));
        let mut queue = queue.lock().unwrap();
        if queue.len() >= MAX_CHECKOUT_QUEUE_SIZE {
            queue.pop_front();
        }
        queue.push_back(Instant::now());
    }

    /// Pop the oldest matching checkout start time, mark the connection
    /// in-use, and record the wait in the latency ring. Returns the wait
    /// time in milliseconds, or `None` if no matching start was queued
    /// (the `checkOutStarted` event was missed).
    pub fn checked_out(&self, id: &str, address: &str) -> Option<f64> {
        if let Some(mut entry) = self.connections.get_mut(id) {
            entry.in_use = true;
        }

        let started_at = self
            .checkout_queues
            .get(address)
            .and_then(|queue| queue.lock().unwrap().pop_front())?;

        let wait_ms = started_at.elapsed().as_secs_f64() * 1000.0;
        self.checkout_latency.lock().unwrap().push(wait_ms);
        Some(wait_ms)
    }

    /// Pop the matching address's oldest checkout start (FIFO discard)
    /// and bump the reason-appropriate error counter.
    pub fn checkout_failed(&self, address: &str, reason: CheckOutFailureReason) {
        if let Some(queue) = self.checkout_queues.get(address) {
            queue.lock().unwrap().pop_front();
        }
        match reason {
            CheckOutFailureReason::Timeout => {
                self.timeout_errors.fetch_add(1, Ordering::Relaxed);
            }
            CheckOutFailureReason::ConnectionError => {
                self.connection_errors.fetch_add(1, Ordering::Relaxed);
            }
            CheckOutFailureReason::Other => {}
        }
    }

    pub fn total_connections(&self) -> u64 {
        self.connections.len() as u64
    }

    pub fn in_use_connections(&self) -> u64 {
        self.connections.iter().filter(|c| c.in_use).count() as u64
    }

    pub fn available_connections(&self) -> u64 {
        self.total_connections().saturating_sub(self.in_use_connections())
    }

    pub fn peak_connections(&self) -> u64 {
        self.peak_connections.load(Ordering::Relaxed)
    }

    /// `(avg, max, p95)` over the checkout-latency ring.
    pub fn checkout_stats(&self) -> (f64, f64, f64) {
        let ring = self.checkout_latency.lock().unwrap();
        if ring.is_empty() {
            return (0.0, 0.0, 0.0);
        }
        (ring.avg(), ring.max(), ring.p95())
    }

    pub fn error_counters(&self) -> (u64, u64) {
        (self.timeout_errors.load(Ordering::Relaxed), self.connection_errors.load(Ordering::Relaxed))
    }
}
