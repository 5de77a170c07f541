//! The Session Wrapper (spec §4.6): wraps each session exactly once,
//! counts messages/bytes/types, drives the subscription lifecycle state
//! machine, and tracks ping/pong latency.

use crate::frame::{extract_msg_type, parse_control_frame, ControlFrame};
use dashmap::{DashMap, DashSet};
use skysignal_ingestion::IngestionClient;
use skysignal_types::{AgentConfig, SessionState, SubscriptionState, SubscriptionStatus};
use skysignal_utils::RingBuffer;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tracing::debug;

/// Ping/pong ring capacity (spec §3 `lastLatencies`).
const PING_RING_SIZE: usize = 10;
/// Terminal subscriptions are garbage-collected this long after
/// reaching a terminal state (spec §4.6).
const SUBSCRIPTION_GC_MS: i64 = 60_000;

/// Direction a message crossed the wire, for counting purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Outbound,
    Inbound,
}

struct SessionEntry {
    state: SessionState,
    ping_ring: RingBuffer,
}

pub struct SessionRegistry {
    config: Arc<AgentConfig>,
    ingestion: Arc<IngestionClient>,
    sessions: DashMap<String, Mutex<SessionEntry>>,
    subscriptions: DashMap<String, Mutex<SubscriptionState>>,
    wrapped: DashSet<String>,
    stopped: AtomicBool,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl SessionRegistry {
    pub fn new(config: Arc<AgentConfig>, ingestion: Arc<IngestionClient>) -> Arc<Self> {
        Arc::new(Self {
            config,
            ingestion,
            sessions: DashMap::new(),
            subscriptions: DashMap::new(),
            wrapped: DashSet::new(),
            stopped: AtomicBool::new(false),
            task: Mutex::new(None),
        })
    }

    /// Attempt to claim `session_id` for wrapping. Returns `false` if
    /// this session is already wrapped (spec §4.6: "exactly once").
    pub fn try_wrap(&self, session_id: &str, now_ms: i64) -> bool {
        if !self.wrapped.insert(session_id.to_string()) {
            return false;
        }
        self.sessions.insert(
            session_id.to_string(),
            Mutex::new(SessionEntry { state: SessionState::new(session_id.to_string(), now_ms), ping_ring: RingBuffer::new(PING_RING_SIZE) }),
        );
        true
    }

    /// Intercept one message crossing the wire for `session_id`.
    pub fn observe(&self, session_id: &str, direction: Direction, raw: &str, now_ms: i64) {
        let Some(entry) = self.sessions.get(session_id) else { return };
        let size = raw.len() as u64;
        let msg_type = extract_msg_type(raw);

        {
            let mut entry = entry.lock().unwrap();
            match direction {
                Direction::Outbound => {
                    entry.state.messages_sent += 1;
                    entry.state.bytes_sent += size;
                }
                Direction::Inbound => {
                    entry.state.messages_received += 1;
                    entry.state.bytes_received += size;
                }
            }
            if let Some(ty) = &msg_type {
                *entry.state.message_type_counts.entry(ty.clone()).or_insert(0) += 1;
            }

            if direction == Direction::Outbound && msg_type.as_deref() == Some("ping") {
                entry.state.last_ping_sent_at = Some(now_ms);
            }
            if direction == Direction::Inbound && msg_type.as_deref() == Some("pong") {
                if let Some(sent_at) = entry.state.last_ping_sent_at {
                    let latency = (now_ms - sent_at).max(0) as f64;
                    entry.ping_ring.push(latency);
                    entry.state.last_latencies_ms = entry.ping_ring.snapshot().to_vec();
                    entry.state.avg_latency_ms = Some(entry.ping_ring.avg());
                }
            }
        }

        let Some(msg_type) = msg_type else { return };
        let control_frames = ["sub", "unsub", "ready", "nosub", "added", "changed", "removed"];
        if !control_frames.contains(&msg_type.as_str()) {
            return;
        }
        let Some(frame) = parse_control_frame(&msg_type, raw) else { return };
        self.handle_control_frame(session_id, frame, size, now_ms);
    }

    fn handle_control_frame(&self, session_id: &str, frame: ControlFrame, size: u64, now_ms: i64) {
        match frame {
            ControlFrame::Sub { id, name, params } => {
                self.subscriptions.insert(id.clone(), Mutex::new(SubscriptionState::new(id.clone(), session_id.to_string(), name, params, now_ms)));
                if let Some(entry) = self.sessions.get(session_id) {
                    entry.lock().unwrap().state.active_subscription_ids.push(id);
                }
            }
            ControlFrame::Unsub { id } => {
                if let Some(sub) = self.subscriptions.get(&id) {
                    let mut sub = sub.lock().unwrap();
                    sub.status = SubscriptionStatus::Stopped;
                    sub.stopped_at = Some(now_ms);
                    self.submit_subscription(&sub);
                }
            }
            ControlFrame::Ready { subs } => {
                for id in subs {
                    if let Some(sub) = self.subscriptions.get(&id) {
                        let mut sub = sub.lock().unwrap();
                        if sub.status == SubscriptionStatus::Pending {
                            sub.status = SubscriptionStatus::Ready;
                            sub.ready_at = Some(now_ms);
                            sub.response_time_ms = Some((now_ms - sub.subscribed_at) as f64);
                            self.submit_subscription(&sub);
                        }
                    }
                }
            }
            ControlFrame::NoSub { id, error } => {
                if let Some(sub) = self.subscriptions.get(&id) {
                    let mut sub = sub.lock().unwrap();
                    sub.status = SubscriptionStatus::Error;
                    sub.error_message = error;
                    self.submit_subscription(&sub);
                }
            }
            ControlFrame::Added { .. } => self.attribute_doc_event(session_id, DocEvent::Added, size),
            ControlFrame::Changed { .. } => self.attribute_doc_event(session_id, DocEvent::Changed, size),
            ControlFrame::Removed { .. } => self.attribute_doc_event(session_id, DocEvent::Removed, size),
            ControlFrame::Ping { .. } | ControlFrame::Pong { .. } => {}
        }
    }

    /// `added`/`changed`/`removed` frames don't carry a subscription id
    /// on the wire (DDP multiplexes them over the session's collection
    /// data, not per-subscription), so this attributes the event to
    /// every subscription in the session that is currently `ready`.
    fn attribute_doc_event(&self, session_id: &str, kind: DocEvent, size: u64) {
        let Some(entry) = self.sessions.get(session_id) else { return };
        let ids = entry.lock().unwrap().state.active_subscription_ids.clone();
        for id in ids {
            if let Some(sub) = self.subscriptions.get(&id) {
                let mut sub = sub.lock().unwrap();
                if sub.status != SubscriptionStatus::Ready {
                    continue;
                }
                match kind {
                    DocEvent::Added => sub.documents_added += 1,
                    DocEvent::Changed => sub.documents_changed += 1,
                    DocEvent::Removed => sub.documents_removed += 1,
                }
                sub.data_transferred += size;
            }
        }
    }

    fn submit_subscription(&self, sub: &SubscriptionState) {
        match serde_json::to_value(sub) {
            Ok(value) => self.ingestion.submit("subscriptions", value),
            Err(e) => tracing::warn!(error = %e, "failed to serialize subscription state"),
        }
    }

    /// Emit a final disconnected record and forget `session_id` (spec
    /// §4.6: "on session close, emit a final disconnected record and
    /// delete the session entry").
    pub fn on_close(&self, session_id: &str, now_ms: i64) {
        if let Some((_, entry)) = self.sessions.remove(session_id) {
            let mut state = entry.into_inner().unwrap().state;
            state.disconnected_at = Some(now_ms);
            match serde_json::to_value(&state) {
                Ok(value) => self.ingestion.submit("ddpConnections", value),
                Err(e) => tracing::warn!(error = %e, "failed to serialize final session record"),
            }
        }
        self.wrapped.remove(session_id);
    }

    /// Start the periodic tick loop: batch-submit active sessions and
    /// sweep terminal subscriptions past their GC window.
    pub fn start(self: &Arc<Self>) {
        let registry = Arc::clone(self);
        let interval = std::time::Duration::from_millis(registry.config.ddp_connections_interval_ms);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if registry.stopped.load(Ordering::Relaxed) {
                    break;
                }
                registry.emit_active_sessions();
                registry.gc_subscriptions(chrono::Utc::now().timestamp_millis());
            }
        });
        *self.task.lock().unwrap() = Some(handle);
    }

    fn emit_active_sessions(&self) {
        for kv in self.sessions.iter() {
            let state = kv.value().lock().unwrap().state.clone();
            match serde_json::to_value(&state) {
                Ok(value) => self.ingestion.submit("ddpConnections", value),
                Err(e) => tracing::warn!(error = %e, "failed to serialize session snapshot"),
            }
        }
    }

    fn gc_subscriptions(&self, now_ms: i64) {
        let mut to_remove = Vec::new();
        for kv in self.subscriptions.iter() {
            let sub = kv.value().lock().unwrap();
            if let Some(terminal_at) = sub.terminal_at() {
                if now_ms - terminal_at >= SUBSCRIPTION_GC_MS {
                    to_remove.push(kv.key().clone());
                }
            }
        }
        let count = to_remove.len();
        for id in to_remove {
            self.subscriptions.remove(&id);
        }
        if count > 0 {
            debug!(count, "garbage-collected terminal subscriptions");
        }
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.len()
    }

    pub fn stop(&self) {
        self.stopped.store(true, Ordering::Relaxed);
        if let Some(handle) = self.task.lock().unwrap().take() {
            handle.abort();
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum DocEvent {
    Added,
    Changed,
    Removed,
}

impl std::fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("sessions", &self.sessions.len())
            .field("subscriptions", &self.subscriptions.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_registry() -> Arc<SessionRegistry> {
        let mut cfg = AgentConfig::default();
        cfg.api_key = "sk_test".to_string();
        let cfg = Arc::new(cfg);
        let ingestion = IngestionClient::new((*cfg).clone()).unwrap();
        SessionRegistry::new(cfg, ingestion)
    }

    #[test]
    fn wraps_each_session_exactly_once() {
        let registry = test_registry();
        assert!(registry.try_wrap("s1", 0));
        assert!(!registry.try_wrap("s1", 0));
        assert_eq!(registry.session_count(), 1);
    }

    #[test]
    fn counts_messages_and_bytes_by_direction() {
        let registry = test_registry();
        registry.try_wrap("s1", 0);
        registry.observe("s1", Direction::Outbound, r#"{"msg":"added","collection":"posts","id":"d1"}"#, 10);
        registry.observe("s1", Direction::Inbound, r#"{"msg":"method","id":"m1"}"#, 20);
        let entry = registry.sessions.get("s1").unwrap();
        let entry = entry.lock().unwrap();
        assert_eq!(entry.state.messages_sent, 1);
        assert_eq!(entry.state.messages_received, 1);
        assert_eq!(*entry.state.message_type_counts.get("added").unwrap(), 1);
    }

    #[test]
    fn subscription_lifecycle_sub_ready_records_response_time() {
        let registry = test_registry();
        registry.try_wrap("s1", 0);
        registry.observe("s1", Direction::Inbound, r#"{"msg":"sub","id":"sub1","name":"posts.all","params":[]}"#, 100);
        registry.observe("s1", Direction::Outbound, r#"{"msg":"ready","subs":["sub1"]}"#, 350);
        let sub = registry.subscriptions.get("sub1").unwrap();
        let sub = sub.lock().unwrap();
        assert_eq!(sub.status, SubscriptionStatus::Ready);
        assert_eq!(sub.response_time_ms, Some(250.0));
    }

    #[test]
    fn unsub_transitions_to_stopped() {
        let registry = test_registry();
        registry.try_wrap("s1", 0);
        registry.observe("s1", Direction::Inbound, r#"{"msg":"sub","id":"sub1","name":"posts.all","params":[]}"#, 0);
        registry.observe("s1", Direction::Inbound, r#"{"msg":"unsub","id":"sub1"}"#, 500);
        let sub = registry.subscriptions.get("sub1").unwrap();
        assert_eq!(sub.lock().unwrap().status, SubscriptionStatus::Stopped);
    }

    #[test]
    fn ping_pong_round_trip_records_latency() {
        let registry = test_registry();
        registry.try_wrap("s1", 0);
        registry.observe("s1", Direction::Outbound, r#"{"msg":"ping","id":"p1"}"#, 1000);
        registry.observe("s1", Direction::Inbound, r#"{"msg":"pong","id":"p1"}"#, 1042);
        let entry = registry.sessions.get("s1").unwrap();
        let entry = entry.lock().unwrap();
        assert_eq!(entry.state.avg_latency_ms, Some(42.0));
    }

    #[test]
    fn doc_events_attribute_to_ready_subscriptions_only() {
        let registry = test_registry();
        registry.try_wrap("s1", 0);
        registry.observe("s1", Direction::Inbound, r#"{"msg":"sub","id":"sub1","name":"posts.all","params":[]}"#, 0);
        registry.observe("s1", Direction::Inbound, r#"{"msg":"added","collection":"posts","id":"d1"}"#, 10);
        assert_eq!(registry.subscriptions.get("sub1").unwrap().lock().unwrap().documents_added, 0);

        registry.observe("s1", Direction::Outbound, r#"{"msg":"ready","subs":["sub1"]}"#, 20);
        registry.observe("s1", Direction::Inbound, r#"{"msg":"added","collection":"posts","id":"d2"}"#, 30);
        assert_eq!(registry.subscriptions.get("sub1").unwrap().lock().unwrap().documents_added, 1);
    }

    #[test]
    fn on_close_removes_session_and_allows_rewrap() {
        let registry = test_registry();
        registry.try_wrap("s1", 0);
        registry.on_close("s1", 1000);
        assert_eq!(registry.session_count(), 0);
        assert!(registry.try_wrap("s1", 2000));
    }
}
