//! Job Collector (spec §11): periodic queue-depth reporting for a
//! host-registered job-queue backend, gated by `collectJobs`/
//! `jobsInterval`/`jobsPackage`. Modeled on the teacher's
//! `riptide-workers::job`/`queue` job-lifecycle structures, narrowed to
//! observation: this agent never enqueues or mutates host jobs.

use skysignal_ingestion::IngestionClient;
use skysignal_types::{AgentConfig, JobBackendKind, JobCollectorBackend, JobSnapshot};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tracing::debug;

struct RegisteredBackend {
    kind: JobBackendKind,
    backend: Arc<dyn JobCollectorBackend>,
}

/// Periodically polls a host-registered job-queue backend and submits
/// its queue depth on the `jobs` stream.
pub struct JobCollector {
    config: Arc<AgentConfig>,
    ingestion: Arc<IngestionClient>,
    backend: Mutex<Option<RegisteredBackend>>,
    stopped: Arc<AtomicBool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl JobCollector {
    pub fn new(config: Arc<AgentConfig>, ingestion: Arc<IngestionClient>) -> Arc<Self> {
        Arc::new(Self {
            config,
            ingestion,
            backend: Mutex::new(None),
            stopped: Arc::new(AtomicBool::new(false)),
            task: Mutex::new(None),
        })
    }

    /// Register (or replace) the backend this collector reports on.
    /// The agent has no generic way to introspect an arbitrary job
    /// queue, so a host adapter supplies this.
    pub fn register_backend(&self, kind: JobBackendKind, backend: Arc<dyn JobCollectorBackend>) {
        *self.backend.lock().unwrap() = Some(RegisteredBackend { kind, backend });
    }

    /// Spawn the polling loop. A no-op if `collectJobs` is off or no
    /// backend has been registered yet (registering later will still
    /// be picked up by subsequent ticks).
    pub fn start(self: &Arc<Self>) {
        if !self.config.collect_jobs {
            debug!("job collector disabled via collectJobs config");
            return;
        }

        let this = Arc::clone(self);
        let interval = std::time::Duration::from_millis(this.config.jobs_interval_ms);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                if this.stopped.load(Ordering::Relaxed) {
                    break;
                }
                this.tick();
            }
        });
        *self.task.lock().unwrap() = Some(handle);
    }

    fn tick(&self) {
        let guard = self.backend.lock().unwrap();
        let Some(registered) = guard.as_ref() else { return };

        if let Some(wanted) = &self.config.jobs_package {
            if wanted != registered.backend.package_name() {
                return;
            }
        }
        if !registered.backend.is_available() {
            return;
        }
        let Some(stats) = registered.backend.queue_stats() else { return };

        let snapshot = JobSnapshot {
            timestamp_ms: chrono::Utc::now().timestamp_millis(),
            backend_kind: registered.kind,
            package_name: registered.backend.package_name().to_string(),
            stats,
        };

        match serde_json::to_value(&snapshot) {
            Ok(value) => self.ingestion.submit("jobs", value),
            Err(e) => tracing::warn!(error = %e, "failed to serialize job snapshot"),
        }
    }

    pub fn stop(&self) {
        self.stopped.store(true, Ordering::Relaxed);
        if let Some(handle) = self.task.lock().unwrap().take() {
            handle.abort();
        }
        debug!("job collector stopped");
    }
}
