//! Live-Query Observer Registry data model (spec §3, §4.4).

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Which underlying mechanism a live-query observer is built on (spec
/// §4.4 driver-kind classification).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DriverKind {
    ChangeStream,
    Oplog,
    Polling,
}

/// Activity-derived performance rating for one observer (spec §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PerformanceRating {
    Optimal,
    Good,
    Slow,
    Inefficient,
}

/// Lifecycle status of an observer (spec §3 `LiveQueryObserver`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ObserverStatus {
    Active,
    Stopped,
}

/// One registered live-query observer (spec §3 `LiveQueryObserver`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveQueryObserver {
    pub id: String,
    pub collection: String,
    pub selector: Value,
    pub options: Value,
    pub driver_kind: DriverKind,
    pub created_at_ms: i64,
    pub status: ObserverStatus,
    pub added_count: u64,
    pub changed_count: u64,
    pub removed_count: u64,
    pub avg_processing_time_ms: f64,
    pub backlog_size: u64,
    pub updates_per_minute: f64,
    pub performance_rating: PerformanceRating,
}
