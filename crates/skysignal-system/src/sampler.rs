//! The System Sampler (spec §4.7): periodic CPU/memory/disk/network
//! sampling plus an event-loop-lag measurement loop, emitted on the
//! `systemMetrics` stream. The first sample taken is a baseline and is
//! never emitted.

use skysignal_ingestion::IngestionClient;
use skysignal_types::{AgentConfig, CpuProfileSample, GcStats, HeapStats, ProcessMemory, SystemMetricsSample};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use sysinfo::{Disks, Networks, ProcessesToUpdate, System};
use tokio::task::JoinHandle;
use tracing::debug;

/// How long a disk-usage measurement is reused before re-running the
/// (relatively expensive) `du` pass (spec §4.7: "cached 5 minutes").
const DISK_CACHE_TTL: Duration = Duration::from_secs(300);
/// Smoothing factor for the event-loop-lag EWMA (spec §4.7: α = 0.3).
const LAG_EWMA_ALPHA: f64 = 0.3;
/// Cadence of the lag-measuring timer itself (spec §4.7: "a 1s timer").
const LAG_TICK: Duration = Duration::from_secs(1);

struct DiskCache {
    sampled_at: Instant,
    bytes: u64,
}

/// Accumulates GC activity and the most recent runtime heap snapshot
/// reported by a host adapter between samples (spec §9 "monkey-patching
/// of host methods → explicit interception point": this agent cannot
/// introspect another runtime's heap or GC pauses on its own, so a host
/// adapter reports them through [`SystemSampler::record_gc_event`] and
/// [`SystemSampler::report_heap_stats`]).
#[derive(Default)]
struct HostReported {
    gc: GcStats,
    heap_stats: Option<HeapStats>,
}

pub struct SystemSampler {
    config: Arc<AgentConfig>,
    ingestion: Arc<IngestionClient>,
    system: Mutex<System>,
    networks: Mutex<Networks>,
    disk_cache: Mutex<Option<DiskCache>>,
    host_reported: Mutex<HostReported>,
    baseline_taken: AtomicBool,
    last_sample_at: Mutex<Option<Instant>>,
    lag_ewma_millis: AtomicU64,
    stopped: Arc<AtomicBool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl SystemSampler {
    pub fn new(config: Arc<AgentConfig>, ingestion: Arc<IngestionClient>) -> Arc<Self> {
        Arc::new(Self {
            config,
            ingestion,
            system: Mutex::new(System::new_all()),
            networks: Mutex::new(Networks::new_with_refreshed_list()),
            disk_cache: Mutex::new(None),
            host_reported: Mutex::new(HostReported::default()),
            baseline_taken: AtomicBool::new(false),
            last_sample_at: Mutex::new(None),
            lag_ewma_millis: AtomicU64::new(0),
            stopped: Arc::new(AtomicBool::new(false)),
            tasks: Mutex::new(Vec::new()),
        })
    }

    /// Spawn the sampling loop (`config.system_metrics_interval_ms`) and
    /// the independent 1s event-loop-lag measuring loop.
    pub fn start(self: &Arc<Self>) {
        let sample_handle = {
            let this = Arc::clone(self);
            let interval = Duration::from_millis(this.config.system_metrics_interval_ms);
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(interval);
                loop {
                    ticker.tick().await;
                    if this.stopped.load(Ordering::Relaxed) {
                        break;
                    }
                    this.tick().await;
                }
            })
        };

        let lag_handle = {
            let this = Arc::clone(self);
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(LAG_TICK);
                ticker.tick().await;
                let mut last = Instant::now();
                loop {
                    ticker.tick().await;
                    if this.stopped.load(Ordering::Relaxed) {
                        break;
                    }
                    let now = Instant::now();
                    let overshoot_ms = (now.duration_since(last).as_secs_f64() * 1000.0 - LAG_TICK.as_millis() as f64).max(0.0);
                    last = now;
                    this.update_lag_ewma(overshoot_ms);
                }
            })
        };

        let mut tasks = self.tasks.lock().unwrap();
        tasks.push(sample_handle);
        tasks.push(lag_handle);

        if self.config.enable_cpu_profiling {
            let this = Arc::clone(self);
            let interval = Duration::from_millis(this.config.cpu_profiling_interval_ms);
            let handle = tokio::spawn(async move {
                let mut ticker = tokio::time::interval(interval);
                loop {
                    ticker.tick().await;
                    if this.stopped.load(Ordering::Relaxed) {
                        break;
                    }
                    this.tick_cpu_profile().await;
                }
            });
            tasks.push(handle);
        }
    }

    /// Take and emit one coarse self-CPU snapshot on `cpuProfiles`.
    /// Disabled by default (spec §11); no flamegraph or stack capture.
    async fn tick_cpu_profile(&self) {
        let cpu_usage_percent = {
            let mut system = self.system.lock().unwrap();
            system.refresh_cpu_all();
            system.global_cpu_usage().clamp(0.0, 100.0) as f64
        };
        let load_avg = System::load_average();

        let sample = CpuProfileSample {
            timestamp_ms: chrono::Utc::now().timestamp_millis(),
            cpu_usage_percent,
            load_average_1: load_avg.one,
            load_average_5: load_avg.five,
            load_average_15: load_avg.fifteen,
        };

        match serde_json::to_value(&sample) {
            Ok(value) => self.ingestion.submit("cpuProfiles", value),
            Err(e) => tracing::warn!(error = %e, "failed to serialize cpu profile sample"),
        }
    }

    fn update_lag_ewma(&self, sample_ms: f64) {
        let prev = f64::from_bits(self.lag_ewma_millis.load(Ordering::Relaxed));
        let next = if prev == 0.0 { sample_ms } else { LAG_EWMA_ALPHA * sample_ms + (1.0 - LAG_EWMA_ALPHA) * prev };
        self.lag_ewma_millis.store(next.to_bits(), Ordering::Relaxed);
    }

    /// Record one GC pause observed by a host adapter since the last
    /// sample.
    pub fn record_gc_event(&self, duration_ms: f64) {
        let mut reported = self.host_reported.lock().unwrap();
        reported.gc.count += 1;
        reported.gc.total_duration_ms += duration_ms;
        reported.gc.pause_time_ms = reported.gc.pause_time_ms.max(duration_ms);
    }

    /// Replace the latest runtime heap snapshot reported by a host
    /// adapter.
    pub fn report_heap_stats(&self, stats: HeapStats) {
        self.host_reported.lock().unwrap().heap_stats = Some(stats);
    }

    /// Take and (unless this is the baseline) emit one sample.
    async fn tick(&self) {
        let sample = self.collect().await;
        if !self.baseline_taken.swap(true, Ordering::SeqCst) {
            debug!("system sampler baseline taken, not emitting");
            return;
        }
        match serde_json::to_value(&sample) {
            Ok(value) => self.ingestion.submit("systemMetrics", value),
            Err(e) => tracing::warn!(error = %e, "failed to serialize system metrics sample"),
        }
    }

    async fn collect(&self) -> SystemMetricsSample {
        let now = Instant::now();
        let elapsed_secs = {
            let mut last = self.last_sample_at.lock().unwrap();
            let secs = last.map(|prev| now.duration_since(prev).as_secs_f64()).unwrap_or(0.0);
            *last = Some(now);
            secs
        };

        let (cpu_usage_percent, memory_total_bytes, memory_free_bytes, memory_used_bytes, process_count) = {
            let mut system = self.system.lock().unwrap();
            system.refresh_cpu_all();
            system.refresh_memory();
            system.refresh_processes(ProcessesToUpdate::All, true);
            (
                system.global_cpu_usage().clamp(0.0, 100.0) as f64,
                system.total_memory(),
                system.free_memory(),
                system.used_memory(),
                system.processes().len() as u64,
            )
        };

        let (network_bytes_in_per_sec, network_bytes_out_per_sec) = {
            let mut networks = self.networks.lock().unwrap();
            networks.refresh(true);
            let (received, transmitted) = networks.iter().fold((0u64, 0u64), |(rx, tx), (_, data)| {
                (rx + data.received(), tx + data.transmitted())
            });
            if elapsed_secs > 0.0 {
                (received as f64 / elapsed_secs, transmitted as f64 / elapsed_secs)
            } else {
                (0.0, 0.0)
            }
        };

        let disk_usage_bytes = self.disk_usage().await;

        let rss_bytes = skysignal_utils::resident_memory_bytes();
        let process_memory = ProcessMemory { rss_bytes, heap_total_bytes: None, heap_used_bytes: None, external_bytes: None };

        let (gc, heap_stats) = {
            let mut reported = self.host_reported.lock().unwrap();
            (std::mem::take(&mut reported.gc), reported.heap_stats.clone())
        };

        SystemMetricsSample {
            timestamp_ms: chrono::Utc::now().timestamp_millis(),
            cpu_usage_percent,
            memory_total_bytes,
            memory_free_bytes,
            memory_used_bytes,
            process_memory,
            disk_usage_bytes,
            network_bytes_in_per_sec,
            network_bytes_out_per_sec,
            process_count,
            event_loop_lag_ms: f64::from_bits(self.lag_ewma_millis.load(Ordering::Relaxed)),
            event_loop_utilization: None,
            heap_stats,
            gc,
        }
    }

    /// `du -sb .` on Linux, cached for 5 minutes; other platforms and
    /// failures fall back to 0 rather than a fabricated placeholder.
    async fn disk_usage(&self) -> u64 {
        if let Some(cache) = self.disk_cache.lock().unwrap().as_ref() {
            if cache.sampled_at.elapsed() < DISK_CACHE_TTL {
                return cache.bytes;
            }
        }

        let bytes = measure_disk_usage().await;
        *self.disk_cache.lock().unwrap() = Some(DiskCache { sampled_at: Instant::now(), bytes });
        bytes
    }

    pub fn stop(&self) {
        self.stopped.store(true, Ordering::Relaxed);
        for handle in self.tasks.lock().unwrap().drain(..) {
            handle.abort();
        }
        debug!("system sampler stopped");
    }
}

#[cfg(target_os = "linux")]
async fn measure_disk_usage() -> u64 {
    let output = tokio::process::Command::new("du").arg("-sb").arg(".").output().await;
    let Ok(output) = output else { return fallback_disk_usage() };
    let Ok(text) = String::from_utf8(output.stdout) else { return fallback_disk_usage() };
    text.split_whitespace().next().and_then(|s| s.parse::<u64>().ok()).unwrap_or_else(fallback_disk_usage)
}

#[cfg(not(target_os = "linux"))]
async fn measure_disk_usage() -> u64 {
    fallback_disk_usage()
}

fn fallback_disk_usage() -> u64 {
    let disks = Disks::new_with_refreshed_list();
    disks.iter().map(|d| d.total_space().saturating_sub(d.available_space())).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_sampler() -> Arc<SystemSampler> {
        let mut cfg = AgentConfig::default();
        cfg.api_key = "sk_test".to_string();
        cfg.system_metrics_interval_ms = 50;
        let cfg = Arc::new(cfg);
        let ingestion = IngestionClient::new((*cfg).clone()).unwrap();
        SystemSampler::new(cfg, ingestion)
    }

    #[tokio::test]
    async fn first_collect_is_marked_baseline_and_not_emitted() {
        let sampler = test_sampler();
        assert!(!sampler.baseline_taken.load(Ordering::Relaxed));
        sampler.tick().await;
        assert!(sampler.baseline_taken.load(Ordering::Relaxed));
    }

    #[tokio::test]
    async fn collect_reports_nonzero_memory_totals() {
        let sampler = test_sampler();
        let sample = sampler.collect().await;
        assert!(sample.memory_total_bytes > 0);
        assert!(sample.process_memory.rss_bytes > 0);
    }

    #[test]
    fn gc_events_accumulate_until_drained() {
        let sampler = test_sampler();
        sampler.record_gc_event(5.0);
        sampler.record_gc_event(12.0);
        let reported = sampler.host_reported.lock().unwrap();
        assert_eq!(reported.gc.count, 2);
        assert_eq!(reported.gc.total_duration_ms, 17.0);
        assert_eq!(reported.gc.pause_time_ms, 12.0);
    }

    #[tokio::test]
    async fn cpu_profile_tick_submits_without_panicking() {
        let sampler = test_sampler();
        sampler.tick_cpu_profile().await;
    }

    #[test]
    fn lag_ewma_smooths_successive_samples() {
        let sampler = test_sampler();
        sampler.update_lag_ewma(10.0);
        assert_eq!(f64::from_bits(sampler.lag_ewma_millis.load(Ordering::Relaxed)), 10.0);
        sampler.update_lag_ewma(0.0);
        let smoothed = f64::from_bits(sampler.lag_ewma_millis.load(Ordering::Relaxed));
        assert!((smoothed - 7.0).abs() < 1e-9);
    }
}
