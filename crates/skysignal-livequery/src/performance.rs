//! Activity-derived performance rating (spec §4.4).

use skysignal_types::{DriverKind, PerformanceRating};

/// Rate one observer's performance from its driver kind and recent
/// activity. Thresholds are spec §4.4's literal per-driver table.
pub fn rate(
    driver_kind: DriverKind,
    avg_processing_time_ms: f64,
    backlog_size: u64,
    updates_per_minute: f64,
) -> PerformanceRating {
    match driver_kind {
        DriverKind::ChangeStream => {
            if avg_processing_time_ms <= 20.0 {
                PerformanceRating::Optimal
            } else if avg_processing_time_ms <= 50.0 {
                PerformanceRating::Good
            } else {
                PerformanceRating::Slow
            }
        }
        DriverKind::Oplog => {
            if backlog_size <= 100 && avg_processing_time_ms <= 20.0 {
                PerformanceRating::Optimal
            } else if backlog_size <= 1000 {
                PerformanceRating::Good
            } else {
                PerformanceRating::Slow
            }
        }
        DriverKind::Polling => {
            if updates_per_minute <= 5.0 {
                PerformanceRating::Optimal
            } else if updates_per_minute <= 30.0 {
                PerformanceRating::Good
            } else {
                PerformanceRating::Inefficient
            }
        }
    }
}
