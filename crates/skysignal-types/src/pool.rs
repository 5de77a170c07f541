//! Pool Observer data model (spec §4.3, §3 `PoolState`).

use serde::{Deserialize, Serialize};

/// Configuration captured from a `poolCreated` event, or recovered from
/// the connection URL's query string when that event was missed (spec
/// §4.3 "Bootstrap fallback").
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolConfig {
    pub min_pool_size: Option<u64>,
    pub max_pool_size: Option<u64>,
    pub max_idle_time_ms: Option<u64>,
    pub wait_queue_timeout_ms: Option<u64>,
}

/// Classification of a `checkOutFailed` event's reason (spec §4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CheckOutFailureReason {
    Timeout,
    ConnectionError,
    Other,
}

impl CheckOutFailureReason {
    /// Classify a driver-reported reason string into the timeout /
    /// connection-error / generic-error buckets spec §4.3 names.
    pub fn classify(reason: &str) -> Self {
        let lower = reason.to_ascii_lowercase();
        if lower.contains("timeout") {
            Self::Timeout
        } else if lower.contains("connection") {
            Self::ConnectionError
        } else {
            Self::Other
        }
    }
}

/// The periodic `mongoPoolMetrics` record (spec §4.3 "Snapshot").
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MongoPoolMetrics {
    pub timestamp_ms: i64,
    pub config: PoolConfig,
    pub total_connections: u64,
    pub available_connections: u64,
    pub in_use_connections: u64,
    pub peak_connections: u64,
    pub checkout_avg_ms: f64,
    pub checkout_max_ms: f64,
    pub checkout_p95_ms: f64,
    pub estimated_memory_bytes: u64,
    pub timeout_errors: u64,
    pub connection_errors: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_prefers_timeout_over_connection() {
        assert_eq!(CheckOutFailureReason::classify("connectionTimeout"), CheckOutFailureReason::Timeout);
    }

    #[test]
    fn classify_recognizes_connection_error() {
        assert_eq!(CheckOutFailureReason::classify("connectionError"), CheckOutFailureReason::ConnectionError);
    }

    #[test]
    fn classify_falls_back_to_other() {
        assert_eq!(CheckOutFailureReason::classify("poolDestroyed"), CheckOutFailureReason::Other);
    }
}
