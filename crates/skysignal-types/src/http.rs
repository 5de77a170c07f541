//! Request Middleware data model (spec §4.5).

use serde::{Deserialize, Serialize};

/// One captured inbound HTTP request (spec §4.5).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpRequestRecord {
    pub timestamp_ms: i64,
    pub method: String,
    pub path: String,
    pub route: String,
    pub status_code: u16,
    pub response_time_ms: f64,
    pub size_bytes: u64,
    pub user_id: Option<String>,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub referrer: Option<String>,
}
