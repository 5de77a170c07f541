//! Top-level facade and collector supervisor (spec §4.9).
//!
//! [`Agent::new`] validates configuration and wires every collector in
//! dependency order (ingestion first, since every other collector
//! submits through it; the tracer next, since the pool observer takes
//! it optionally). [`Agent::start`]/[`Agent::stop`] are idempotent,
//! mirroring the teacher's worker service: a `running` guard on start,
//! and an unconditional-but-safe stop of every sub-component.

use crate::snapshot;
use anyhow::Result;
use skysignal_http::SkySignalHttpLayer;
use skysignal_ingestion::IngestionClient;
use skysignal_livequery::LiveQueryRegistry;
use skysignal_pool::PoolObserver;
use skysignal_session::SessionRegistry;
use skysignal_system::{JobCollector, SystemSampler};
use skysignal_tracer::{Tracer, TracerConfig};
use skysignal_types::AgentConfig;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

/// Owns every collector and the shared ingestion pipeline. Construct
/// once per host process; clone the `Arc` wherever a collector handle
/// (e.g. the HTTP layer, or the tracer for manual instrumentation) is
/// needed.
pub struct Agent {
    config: Arc<AgentConfig>,
    ingestion: Arc<IngestionClient>,
    tracer: Arc<Tracer>,
    pool: Arc<PoolObserver>,
    live_queries: Arc<LiveQueryRegistry>,
    sessions: Arc<SessionRegistry>,
    system: Arc<SystemSampler>,
    jobs: Arc<JobCollector>,
    http_layer: SkySignalHttpLayer,
    running: AtomicBool,
}

impl Agent {
    /// Validate `config` and wire every collector. Returns before
    /// anything is started — call [`Agent::start`] to begin emitting.
    pub fn new(config: AgentConfig) -> Result<Arc<Self>> {
        config.validate()?;
        let config = Arc::new(config);

        let ingestion = IngestionClient::new((*config).clone())?;
        let tracer = Tracer::new(Arc::clone(&ingestion), TracerConfig::from_agent_config(&config));
        let pool = PoolObserver::new(Arc::clone(&config), Arc::clone(&ingestion), Some(Arc::clone(&tracer)));
        let live_queries = LiveQueryRegistry::new(Arc::clone(&config), Arc::clone(&ingestion));
        let sessions = SessionRegistry::new(Arc::clone(&config), Arc::clone(&ingestion));
        let system = SystemSampler::new(Arc::clone(&config), Arc::clone(&ingestion));
        let jobs = JobCollector::new(Arc::clone(&config), Arc::clone(&ingestion));
        let http_layer = SkySignalHttpLayer::new(Arc::clone(&config), Arc::clone(&ingestion));

        Ok(Arc::new(Self {
            config,
            ingestion,
            tracer,
            pool,
            live_queries,
            sessions,
            system,
            jobs,
            http_layer,
            running: AtomicBool::new(false),
        }))
    }

    /// Start the ingestion pipeline and every enabled collector. A
    /// second call is a no-op.
    pub fn start(self: &Arc<Self>) {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("agent already started, ignoring duplicate start");
            return;
        }

        self.ingestion.start();

        if self.config.collector_enabled("pool") {
            self.pool.start();
        }
        if self.config.collector_enabled("liveQueries") {
            self.live_queries.start();
        }
        if self.config.collector_enabled("sessions") {
            self.sessions.start();
        }
        if self.config.collector_enabled("systemMetrics") {
            self.system.start();
        }
        if self.config.collector_enabled("jobs") {
            self.jobs.start();
        }
        if self.config.collector_enabled("dependencies") {
            snapshot::emit_startup_snapshots(&self.config, &self.ingestion);
        }

        info!("skysignal agent started");
    }

    /// Stop every collector and the ingestion pipeline, flushing any
    /// buffered batches. Safe to call more than once, and safe to call
    /// without a preceding [`Agent::start`].
    pub fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }

        self.pool.stop();
        self.live_queries.stop();
        self.sessions.stop();
        self.system.stop();
        self.jobs.stop();
        self.ingestion.stop();

        info!("skysignal agent stopped");
    }

    /// `tower::Layer` for instrumenting inbound HTTP requests. Clone
    /// onto an `axum` router with `.layer(agent.http_layer())`.
    pub fn http_layer(&self) -> SkySignalHttpLayer {
        self.http_layer.clone()
    }

    /// Method tracer, for manual instrumentation call sites.
    pub fn tracer(&self) -> Arc<Tracer> {
        Arc::clone(&self.tracer)
    }

    /// Connection-pool event sink; feed driver pool events into this.
    pub fn pool(&self) -> Arc<PoolObserver> {
        Arc::clone(&self.pool)
    }

    /// Live-query observer registry.
    pub fn live_queries(&self) -> Arc<LiveQueryRegistry> {
        Arc::clone(&self.live_queries)
    }

    /// DDP session registry; feed raw inbound/outbound frames into this.
    pub fn sessions(&self) -> Arc<SessionRegistry> {
        Arc::clone(&self.sessions)
    }

    /// System sampler, for host adapters reporting GC/heap stats.
    pub fn system(&self) -> Arc<SystemSampler> {
        Arc::clone(&self.system)
    }

    /// Job-queue collector; register a host backend via
    /// `jobs().register_backend(..)` before calling [`Agent::start`].
    pub fn jobs(&self) -> Arc<JobCollector> {
        Arc::clone(&self.jobs)
    }

    /// The validated configuration this agent was constructed from.
    pub fn config(&self) -> &Arc<AgentConfig> {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> AgentConfig {
        let mut cfg = AgentConfig::default();
        cfg.api_key = "sk_test".to_string();
        cfg.system_metrics_interval_ms = 60_000;
        cfg.mongo_pool_interval_ms = 60_000;
        cfg.live_queries_interval_ms = 60_000;
        cfg
    }

    #[test]
    fn invalid_config_rejected_before_any_wiring() {
        let cfg = AgentConfig::default(); // empty api_key, enabled
        assert!(Agent::new(cfg).is_err());
    }

    #[tokio::test]
    async fn start_is_idempotent() {
        let agent = Agent::new(test_config()).unwrap();
        agent.start();
        agent.start();
        assert!(agent.running.load(Ordering::SeqCst));
        agent.stop();
    }

    #[tokio::test]
    async fn stop_without_start_is_a_safe_no_op() {
        let agent = Agent::new(test_config()).unwrap();
        agent.stop();
        assert!(!agent.running.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn stop_after_start_clears_running_flag() {
        let agent = Agent::new(test_config()).unwrap();
        agent.start();
        agent.stop();
        assert!(!agent.running.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn collector_toggle_skips_disabled_collector_start() {
        let mut cfg = test_config();
        cfg.collectors_enabled.insert("pool".to_string(), false);
        let agent = Agent::new(cfg).unwrap();
        agent.start();
        // No direct observable without a running task list accessor;
        // this at minimum exercises the toggle path without panicking.
        agent.stop();
    }
}
