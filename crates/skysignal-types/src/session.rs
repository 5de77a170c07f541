//! Session Wrapper data model (spec §4.6 / §3).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A subscription's place in its lifecycle (spec §4.6's state machine).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SubscriptionStatus {
    Pending,
    Ready,
    Error,
    Stopped,
}

/// One subscription's lifecycle record (spec §3 `SubscriptionState`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionState {
    pub id: String,
    pub session_id: String,
    pub publication_name: String,
    pub params: serde_json::Value,
    pub status: SubscriptionStatus,
    pub subscribed_at: i64,
    pub ready_at: Option<i64>,
    pub response_time_ms: Option<f64>,
    pub stopped_at: Option<i64>,
    pub documents_added: u64,
    pub documents_changed: u64,
    pub documents_removed: u64,
    pub data_transferred: u64,
    pub error_message: Option<String>,
}

impl SubscriptionState {
    pub fn new(id: String, session_id: String, publication_name: String, params: serde_json::Value, now_ms: i64) -> Self {
        Self {
            id,
            session_id,
            publication_name,
            params,
            status: SubscriptionStatus::Pending,
            subscribed_at: now_ms,
            ready_at: None,
            response_time_ms: None,
            stopped_at: None,
            documents_added: 0,
            documents_changed: 0,
            documents_removed: 0,
            data_transferred: 0,
            error_message: None,
        }
    }

    /// Whether this subscription is in a terminal state eligible for GC
    /// 60s after reaching it (spec §4.6/§3).
    pub fn is_terminal(&self) -> bool {
        matches!(self.status, SubscriptionStatus::Error | SubscriptionStatus::Stopped)
    }

    /// The timestamp a terminal subscription entered its terminal state,
    /// for GC purposes. `None` for non-terminal subscriptions.
    pub fn terminal_at(&self) -> Option<i64> {
        if self.status == SubscriptionStatus::Stopped {
            self.stopped_at
        } else if self.status == SubscriptionStatus::Error {
            // `errorMessage` is set at the moment of the `nosub` frame;
            // there's no dedicated errored-at field, so the subscribed
            // timestamp is used as the GC clock's starting point only
            // when no later activity updated it.
            self.ready_at.or(Some(self.subscribed_at))
        } else {
            None
        }
    }
}

/// One live session's aggregate counters (spec §3 `SessionState`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionState {
    pub id: String,
    pub connected_at: i64,
    pub disconnected_at: Option<i64>,
    pub messages_sent: u64,
    pub messages_received: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub message_type_counts: HashMap<String, u64>,
    pub active_subscription_ids: Vec<String>,
    pub last_ping_sent_at: Option<i64>,
    pub last_latencies_ms: Vec<f64>,
    pub avg_latency_ms: Option<f64>,
}

impl SessionState {
    pub fn new(id: String, now_ms: i64) -> Self {
        Self {
            id,
            connected_at: now_ms,
            disconnected_at: None,
            messages_sent: 0,
            messages_received: 0,
            bytes_sent: 0,
            bytes_received: 0,
            message_type_counts: HashMap::new(),
            active_subscription_ids: Vec::new(),
            last_ping_sent_at: None,
            last_latencies_ms: Vec::new(),
            avg_latency_ms: None,
        }
    }
}
