//! Job Collector capability set (spec §11, SPEC_FULL.md §11).
//!
//! Narrowed to observation only: this agent never enqueues or touches a
//! host job queue, it only reports on one via a host-supplied
//! [`JobCollectorBackend`], mirroring how GC/heap stats are reported by
//! a host adapter rather than sampled ambiently.

use serde::{Deserialize, Serialize};

/// Which job-queue package a [`JobCollectorBackend`] is speaking for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum JobBackendKind {
    BullMq,
    Agenda,
    Bee,
    Kue,
    Other,
}

/// Queue depth counters, modeled on the teacher's `QueueStats`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobQueueStats {
    pub pending: u64,
    pub processing: u64,
    pub completed: u64,
    pub failed: u64,
    pub retry: u64,
    pub delayed: u64,
    pub total: u64,
}

/// One periodic snapshot submitted to the `jobs` stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSnapshot {
    pub timestamp_ms: i64,
    pub backend_kind: JobBackendKind,
    pub package_name: String,
    pub stats: JobQueueStats,
}

/// A host-supplied view onto one job-queue package. The agent has no
/// generic way to introspect an arbitrary job queue, so a host adapter
/// registers an implementation of this trait with the job collector.
pub trait JobCollectorBackend: Send + Sync {
    /// Name of the package this backend reports on (e.g. `"bullmq"`).
    fn package_name(&self) -> &str;
    /// Whether the backend is currently reachable (e.g. queue connected).
    fn is_available(&self) -> bool;
    /// Current queue depth counters, or `None` if unavailable right now.
    fn queue_stats(&self) -> Option<JobQueueStats>;
}
