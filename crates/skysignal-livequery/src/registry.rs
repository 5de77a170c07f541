//! The Live-Query Observer Registry (spec §4.4): tracks every live
//! observer the host creates, rates its performance, and periodically
//! snapshots the registry to the `liveQueries` stream.

use crate::classify::{classify_driver, HandleIntrospection};
use crate::performance;
use dashmap::DashMap;
use serde_json::Value;
use skysignal_ingestion::IngestionClient;
use skysignal_types::{AgentConfig, DriverKind, LiveQueryObserver, ObserverStatus};
use skysignal_utils::sanitize_selector;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::task::JoinHandle;
use tracing::debug;

/// Registry cap (spec §4.4: `maxObservers = 5000`).
pub const MAX_OBSERVERS: usize = 5000;
/// Fraction of capacity evicted once the cap is reached (spec §4.4: 10%).
const EVICTION_FRACTION: f64 = 0.1;

/// What kind of document-level update was observed on a live query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateKind {
    Added,
    Changed,
    Removed,
}

struct Entry {
    observer: LiveQueryObserver,
    last_sample_at: Instant,
    last_sample_update_total: u64,
    processing_samples: u64,
}

impl Entry {
    fn update_total(&self) -> u64 {
        self.observer.added_count + self.observer.changed_count + self.observer.removed_count
    }
}

pub struct LiveQueryRegistry {
    config: Arc<AgentConfig>,
    ingestion: Arc<IngestionClient>,
    observers: DashMap<String, Mutex<Entry>>,
    stopped: AtomicBool,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl LiveQueryRegistry {
    pub fn new(config: Arc<AgentConfig>, ingestion: Arc<IngestionClient>) -> Arc<Self> {
        Arc::new(Self {
            config,
            ingestion,
            observers: DashMap::new(),
            stopped: AtomicBool::new(false),
            task: Mutex::new(None),
        })
    }

    /// Register a newly created observer handle, classifying its driver
    /// kind and evicting if the registry is at capacity. The oplog-URL
    /// fallback (spec §6 `MONGO_OPLOG_URL`) is read from the process
    /// environment here rather than threaded in by the caller.
    pub fn register(
        &self,
        id: impl Into<String>,
        collection: impl Into<String>,
        selector: Value,
        options: Value,
        intro: &HandleIntrospection,
        created_at_ms: i64,
    ) {
        if self.observers.len() >= MAX_OBSERVERS {
            self.evict();
        }

        let driver_kind = classify_driver(intro, skysignal_types::env::mongo_oplog_url().is_some());
        let observer = LiveQueryObserver {
            id: id.into(),
            collection: collection.into(),
            selector,
            options,
            driver_kind,
            created_at_ms,
            status: ObserverStatus::Active,
            added_count: 0,
            changed_count: 0,
            removed_count: 0,
            avg_processing_time_ms: 0.0,
            backlog_size: 0,
            updates_per_minute: 0.0,
            performance_rating: performance::rate(driver_kind, 0.0, 0, 0.0),
        };
        self.observers.insert(
            observer.id.clone(),
            Mutex::new(Entry { observer, last_sample_at: Instant::now(), last_sample_update_total: 0, processing_samples: 0 }),
        );
    }

    /// Record one document-level update (spec §3 `addedCount`/
    /// `changedCount`/`removedCount`, backlog growth).
    pub fn record_update(&self, id: &str, kind: UpdateKind) {
        let Some(entry) = self.observers.get(id) else { return };
        let mut entry = entry.lock().unwrap();
        match kind {
            UpdateKind::Added => entry.observer.added_count += 1,
            UpdateKind::Changed => entry.observer.changed_count += 1,
            UpdateKind::Removed => entry.observer.removed_count += 1,
        }
        entry.observer.backlog_size += 1;
    }

    /// Record that `items` buffered updates were processed in
    /// `duration_ms`, updating the running average processing time and
    /// draining the backlog.
    pub fn record_processed_batch(&self, id: &str, duration_ms: f64, items: u64) {
        let Some(entry) = self.observers.get(id) else { return };
        let mut entry = entry.lock().unwrap();
        entry.processing_samples += 1;
        let n = entry.processing_samples as f64;
        entry.observer.avg_processing_time_ms += (duration_ms - entry.observer.avg_processing_time_ms) / n;
        entry.observer.backlog_size = entry.observer.backlog_size.saturating_sub(items);
    }

    pub fn stop_observer(&self, id: &str) {
        if let Some(entry) = self.observers.get(id) {
            entry.lock().unwrap().observer.status = ObserverStatus::Stopped;
        }
    }

    /// Evict 10% of capacity, preferring stopped observers then the
    /// oldest-by-`createdAt` (spec §4.4, §8 property 12).
    fn evict(&self) {
        let evict_count = ((MAX_OBSERVERS as f64) * EVICTION_FRACTION).floor() as usize;
        let mut candidates: Vec<(String, bool, i64)> = self
            .observers
            .iter()
            .map(|kv| {
                let entry = kv.value().lock().unwrap();
                (kv.key().clone(), entry.observer.status == ObserverStatus::Stopped, entry.observer.created_at_ms)
            })
            .collect();

        candidates.sort_by(|a, b| b.1.cmp(&a.1).then(a.2.cmp(&b.2)));

        for (id, _, _) in candidates.into_iter().take(evict_count) {
            self.observers.remove(&id);
        }
        debug!(evicted = evict_count, "live-query registry evicted to stay under capacity");
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }

    /// Start the periodic rating/snapshot loop on
    /// `config.live_queries_interval_ms`.
    pub fn start(self: &Arc<Self>) {
        let registry = Arc::clone(self);
        let interval = std::time::Duration::from_millis(registry.config.live_queries_interval_ms);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if registry.stopped.load(Ordering::Relaxed) {
                    break;
                }
                registry.sample_and_emit();
            }
        });
        *self.task.lock().unwrap() = Some(handle);
    }

    /// Recompute `updatesPerMinute`/`performanceRating` for every
    /// observer and submit one sanitized snapshot per observer.
    pub fn sample_and_emit(&self) {
        let now = Instant::now();
        for kv in self.observers.iter() {
            let mut entry = kv.value().lock().unwrap();
            let elapsed_minutes = now.duration_since(entry.last_sample_at).as_secs_f64() / 60.0;
            let new_updates = entry.update_total().saturating_sub(entry.last_sample_update_total);
            entry.observer.updates_per_minute = if elapsed_minutes > 0.0 { new_updates as f64 / elapsed_minutes } else { 0.0 };
            entry.last_sample_at = now;
            entry.last_sample_update_total = entry.update_total();

            entry.observer.performance_rating = performance::rate(
                entry.observer.driver_kind,
                entry.observer.avg_processing_time_ms,
                entry.observer.backlog_size,
                entry.observer.updates_per_minute,
            );

            let mut sanitized = entry.observer.clone();
            sanitized.selector = sanitize_selector(&sanitized.selector);
            match serde_json::to_value(&sanitized) {
                Ok(value) => self.ingestion.submit("liveQueries", value),
                Err(e) => tracing::warn!(error = %e, "failed to serialize live-query snapshot"),
            }
        }
    }

    pub fn stop(&self) {
        self.stopped.store(true, Ordering::Relaxed);
        if let Some(handle) = self.task.lock().unwrap().take() {
            handle.abort();
        }
    }
}

impl std::fmt::Debug for LiveQueryRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveQueryRegistry").field("observers", &self.observers.len()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn test_registry() -> Arc<LiveQueryRegistry> {
        let mut cfg = AgentConfig::default();
        cfg.api_key = "sk_test".to_string();
        let cfg = Arc::new(cfg);
        let ingestion = IngestionClient::new((*cfg).clone()).unwrap();
        LiveQueryRegistry::new(cfg, ingestion)
    }

    fn change_stream_intro() -> HandleIntrospection {
        HandleIntrospection { constructor_name: Some("ChangeStreamHandle".into()), marker_fields: vec![] }
    }

    #[test]
    fn register_and_update_tracks_counts() {
        let registry = test_registry();
        registry.register("obs1", "posts", json!({"a": 1}), json!({}), &change_stream_intro(), 0);
        registry.record_update("obs1", UpdateKind::Added);
        registry.record_update("obs1", UpdateKind::Changed);
        let entry = registry.observers.get("obs1").unwrap();
        let entry = entry.lock().unwrap();
        assert_eq!(entry.observer.added_count, 1);
        assert_eq!(entry.observer.changed_count, 1);
        assert_eq!(entry.observer.backlog_size, 2);
    }

    #[test]
    fn processed_batch_drains_backlog_and_updates_average() {
        let registry = test_registry();
        registry.register("obs1", "posts", json!({}), json!({}), &change_stream_intro(), 0);
        registry.record_update("obs1", UpdateKind::Added);
        registry.record_processed_batch("obs1", 10.0, 1);
        let entry = registry.observers.get("obs1").unwrap();
        let entry = entry.lock().unwrap();
        assert_eq!(entry.observer.backlog_size, 0);
        assert_eq!(entry.observer.avg_processing_time_ms, 10.0);
    }

    #[test]
    fn stop_observer_marks_stopped() {
        let registry = test_registry();
        registry.register("obs1", "posts", json!({}), json!({}), &change_stream_intro(), 0);
        registry.stop_observer("obs1");
        let entry = registry.observers.get("obs1").unwrap();
        assert_eq!(entry.lock().unwrap().observer.status, ObserverStatus::Stopped);
    }

    #[test]
    fn eviction_prefers_stopped_then_oldest() {
        let registry = test_registry();
        for i in 0..MAX_OBSERVERS {
            registry.register(format!("obs{i}"), "posts", json!({}), json!({}), &change_stream_intro(), i as i64);
        }
        registry.stop_observer("obs4000");
        registry.register("new-one", "posts", json!({}), json!({}), &change_stream_intro(), 999_999);

        assert!(!registry.observers.contains_key("obs4000"), "stopped observer should be evicted first");
        assert!(registry.observers.contains_key("new-one"));
        assert_eq!(registry.len(), MAX_OBSERVERS - 500 + 1);
    }
}
