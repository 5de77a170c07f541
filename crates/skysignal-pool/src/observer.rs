//! The Pool Observer (spec §4.3): folds connection-pool events into
//! [`PoolState`] and periodically emits a `mongoPoolMetrics` snapshot.

use crate::events::PoolEvent;
use crate::state::PoolState;
use skysignal_ingestion::IngestionClient;
use skysignal_tracer::Tracer;
use skysignal_types::pool::{CheckOutFailureReason, MongoPoolMetrics, PoolConfig};
use skysignal_types::AgentConfig;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::task::JoinHandle;
use tracing::debug;

/// Consumes the host connection-pool's event stream and ships periodic
/// `mongoPoolMetrics` snapshots to the ingestion client.
pub struct PoolObserver {
    config: Arc<AgentConfig>,
    ingestion: Arc<IngestionClient>,
    tracer: Option<Arc<Tracer>>,
    state: PoolState,
    stopped: Arc<AtomicBool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl PoolObserver {
    pub fn new(config: Arc<AgentConfig>, ingestion: Arc<IngestionClient>, tracer: Option<Arc<Tracer>>) -> Arc<Self> {
        let observer = Arc::new(Self {
            config,
            ingestion,
            tracer,
            state: PoolState::new(),
            stopped: Arc::new(AtomicBool::new(false)),
            task: Mutex::new(None),
        });

        // Bootstrap fallback (spec §4.3, §6 `MONGO_URL`): a real
        // `PoolCreated` event, if one ever arrives, overwrites this via
        // `handle()`. This only covers the case where it doesn't.
        if let Some(url) = skysignal_types::env::mongo_url() {
            observer.bootstrap_from_url(&url);
        }

        observer
    }

    /// Recover pool configuration from the connection URL when a
    /// `poolCreated` event was missed (spec §4.3 "Bootstrap fallback").
    pub fn bootstrap_from_url(&self, connection_url: &str) {
        self.state.set_config(crate::bootstrap::parse_pool_config(connection_url));
    }

    /// Fold one event into the pool's state.
    pub fn handle(&self, event: PoolEvent) {
        match event {
            PoolEvent::PoolCreated { config } => self.state.set_config(config),
            PoolEvent::ConnectionCreated { id, address } => self.state.connection_created(id, address),
            PoolEvent::ConnectionClosed { id } => self.state.connection_closed(&id),
            PoolEvent::CheckOutStarted { address } => self.state.checkout_started(&address),
            PoolEvent::CheckedOut { id, address } => {
                if let Some(wait_ms) = self.state.checked_out(&id, &address) {
                    if let Some(tracer) = &self.tracer {
                        let start = Instant::now() - std::time::Duration::from_secs_f64(wait_ms / 1000.0);
                        tracer.track_wait_time("mongo.checkout", start);
                    }
                }
            }
            PoolEvent::CheckOutFailed { address, reason } => {
                self.state.checkout_failed(&address, CheckOutFailureReason::classify(&reason))
            }
            PoolEvent::CheckedIn { id } => self.state.checked_in(&id),
        }
    }

    /// Start the periodic snapshot loop on `config.mongo_pool_interval_ms`.
    pub fn start(self: &Arc<Self>) {
        let observer = Arc::clone(self);
        let interval = std::time::Duration::from_millis(observer.config.mongo_pool_interval_ms);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await; // first tick fires immediately
            loop {
                ticker.tick().await;
                if observer.stopped.load(Ordering::Relaxed) {
                    break;
                }
                observer.emit_snapshot();
            }
        });
        *self.task.lock().unwrap() = Some(handle);
    }

    /// Build and submit one `mongoPoolMetrics` snapshot.
    pub fn emit_snapshot(&self) {
        let snapshot = self.snapshot();
        match serde_json::to_value(&snapshot) {
            Ok(value) => self.ingestion.submit("mongoPoolMetrics", value),
            Err(e) => tracing::warn!(error = %e, "failed to serialize pool snapshot"),
        }
    }

    /// The current snapshot, independent of the emission cadence (used
    /// directly by tests and by `emit_snapshot`).
    pub fn snapshot(&self) -> MongoPoolMetrics {
        let (avg, max, p95) = self.state.checkout_stats();
        let (timeout_errors, connection_errors) = self.state.error_counters();
        let total = self.state.total_connections();

        MongoPoolMetrics {
            timestamp_ms: chrono::Utc::now().timestamp_millis(),
            config: self.state.config(),
            total_connections: total,
            available_connections: self.state.available_connections(),
            in_use_connections: self.state.in_use_connections(),
            peak_connections: self.state.peak_connections(),
            checkout_avg_ms: avg,
            checkout_max_ms: max,
            checkout_p95_ms: p95,
            estimated_memory_bytes: self.estimated_memory_bytes(total),
            timeout_errors,
            connection_errors,
        }
    }

    /// Fixed per-connection estimate if configured; else 10% of the
    /// process's resident memory divided across live connections (spec
    /// §4.3 "Snapshot").
    fn estimated_memory_bytes(&self, total_connections: u64) -> u64 {
        if let Some(fixed) = self.config.mongo_pool_fixed_connection_memory {
            return fixed.saturating_mul(total_connections);
        }
        if total_connections == 0 {
            return 0;
        }
        skysignal_utils::resident_memory_bytes() / 10 / total_connections
    }

    pub fn stop(&self) {
        self.stopped.store(true, Ordering::Relaxed);
        if let Some(handle) = self.task.lock().unwrap().take() {
            handle.abort();
        }
        debug!("pool observer stopped");
    }

    pub fn state(&self) -> &PoolState {
        &self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_observer() -> Arc<PoolObserver> {
        let mut cfg = AgentConfig::default();
        cfg.api_key = "sk_test".to_string();
        cfg.mongo_pool_interval_ms = 50;
        let cfg = Arc::new(cfg);
        let ingestion = IngestionClient::new((*cfg).clone()).unwrap();
        PoolObserver::new(cfg, ingestion, None)
    }

    #[test]
    fn bootstrap_fallback_recovers_config_from_url() {
        let observer = test_observer();
        observer.bootstrap_from_url("mongodb://localhost/db?minPoolSize=5&maxPoolSize=20");
        assert_eq!(observer.state().config().min_pool_size, Some(5));
    }

    #[test]
    fn pool_created_event_captures_config() {
        let observer = test_observer();
        observer.handle(PoolEvent::PoolCreated {
            config: PoolConfig {
                min_pool_size: Some(1),
                max_pool_size: Some(10),
                max_idle_time_ms: None,
                wait_queue_timeout_ms: None,
            },
        });
        assert_eq!(observer.state().config().max_pool_size, Some(10));
    }

    #[test]
    fn checkout_round_trip_updates_snapshot() {
        let observer = test_observer();
        observer.handle(PoolEvent::ConnectionCreated { id: "c1".into(), address: "a:1".into() });
        observer.handle(PoolEvent::CheckOutStarted { address: "a:1".into() });
        observer.handle(PoolEvent::CheckedOut { id: "c1".into(), address: "a:1".into() });
        let snapshot = observer.snapshot();
        assert_eq!(snapshot.total_connections, 1);
        assert_eq!(snapshot.in_use_connections, 1);
    }

    #[test]
    fn checkout_failed_bumps_error_counters_in_snapshot() {
        let observer = test_observer();
        observer.handle(PoolEvent::CheckOutStarted { address: "a:1".into() });
        observer.handle(PoolEvent::CheckOutFailed { address: "a:1".into(), reason: "timeout".into() });
        let snapshot = observer.snapshot();
        assert_eq!(snapshot.timeout_errors, 1);
    }

    #[test]
    fn fixed_connection_memory_overrides_heap_estimate() {
        let mut cfg = AgentConfig::default();
        cfg.api_key = "sk_test".to_string();
        cfg.mongo_pool_fixed_connection_memory = Some(1024);
        let cfg = Arc::new(cfg);
        let ingestion = IngestionClient::new((*cfg).clone()).unwrap();
        let observer = PoolObserver::new(cfg, ingestion, None);
        observer.handle(PoolEvent::ConnectionCreated { id: "c1".into(), address: "a:1".into() });
        observer.handle(PoolEvent::ConnectionCreated { id: "c2".into(), address: "a:1".into() });
        assert_eq!(observer.snapshot().estimated_memory_bytes, 2048);
    }

}
