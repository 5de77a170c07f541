//! System Sampler data model (spec §4.7).

use serde::{Deserialize, Serialize};

/// Per-process memory breakdown. `heap_total_bytes`/`heap_used_bytes`/
/// `external_bytes` are runtime-reported (spec §4.7's V8 heap figures
/// have no generic-process equivalent) and are `None` until a host
/// adapter reports them via [`crate::system::HeapStats`] bookkeeping.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessMemory {
    pub rss_bytes: u64,
    pub heap_total_bytes: Option<u64>,
    pub heap_used_bytes: Option<u64>,
    pub external_bytes: Option<u64>,
}

/// One heap space's occupancy (spec §4.7 "per-heap-space breakdown").
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeapSpaceStats {
    pub space_name: String,
    pub space_size: u64,
    pub space_used_size: u64,
    pub space_available_size: u64,
}

/// Runtime heap statistics, reported by a host adapter since this
/// agent has no generic way to introspect another runtime's heap.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeapStats {
    pub total_heap_size: u64,
    pub used_heap_size: u64,
    pub heap_size_limit: u64,
    pub spaces: Vec<HeapSpaceStats>,
}

/// GC activity accumulated since the previous sample (spec §4.7).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GcStats {
    pub count: u64,
    pub total_duration_ms: f64,
    pub pause_time_ms: f64,
}

/// One periodic system snapshot (spec §4.7). The first sample taken is
/// a baseline and is never emitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemMetricsSample {
    pub timestamp_ms: i64,
    pub cpu_usage_percent: f64,
    pub memory_total_bytes: u64,
    pub memory_free_bytes: u64,
    pub memory_used_bytes: u64,
    pub process_memory: ProcessMemory,
    pub disk_usage_bytes: u64,
    pub network_bytes_in_per_sec: f64,
    pub network_bytes_out_per_sec: f64,
    pub process_count: u64,
    pub event_loop_lag_ms: f64,
    pub event_loop_utilization: Option<f64>,
    pub heap_stats: Option<HeapStats>,
    pub gc: GcStats,
}

/// One coarse self-CPU snapshot on the optional `cpuProfiles` stream
/// (spec §11): no flamegraph or stack-trace capture, just the process's
/// own CPU share and the OS load averages, modeled on the teacher's
/// `CpuProfile` sampling fields.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CpuProfileSample {
    pub timestamp_ms: i64,
    pub cpu_usage_percent: f64,
    pub load_average_1: f64,
    pub load_average_5: f64,
    pub load_average_15: f64,
}
