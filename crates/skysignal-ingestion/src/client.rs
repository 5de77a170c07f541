//! The Ingestion Client (spec §3, §4.1): submit, sample, batch, flush,
//! retry-with-backoff, and ship to the collector over HTTP.
//!
//! Grounded on the teacher's `riptide-reliability::retry` timer-driven
//! retry loop and `riptide-streaming` multi-stream dispatch, adapted from
//! per-request retry to a bounded per-stream retry queue swept by a
//! single background task rather than one timer per entry.

use crate::batch::BatchState;
use crate::counters::IngestionCounters;
use crate::serializer::serialize_envelope;
use dashmap::DashMap;
use rand::Rng;
use serde_json::Value;
use skysignal_types::{AgentConfig, AgentError, Result, StreamKind};
use skysignal_utils::{BackoffPolicy, HttpClientFactory, HttpConfig, RetryEntry, RetryQueue};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

/// How often the retry sweep wakes to check for due entries. Independent
/// of any stream's flush interval.
const RETRY_SWEEP_INTERVAL: Duration = Duration::from_millis(250);

/// A batch already serialized to bytes, awaiting a retry attempt.
#[derive(Debug, Clone)]
struct PendingDispatch {
    stream_name: String,
    endpoint: String,
    body: Vec<u8>,
    due_at: Instant,
}

/// Submits telemetry to the collector: applies sampling, accumulates
/// per-stream batches, flushes on size/time thresholds, and retries failed
/// dispatches with exponential backoff up to `maxBatchRetries`.
pub struct IngestionClient {
    config: Arc<AgentConfig>,
    http: reqwest::Client,
    counters: Arc<IngestionCounters>,
    batches: DashMap<String, Mutex<BatchState>>,
    retry_queues: DashMap<String, Mutex<RetryQueue<PendingDispatch>>>,
    backoff: BackoffPolicy,
    stopped: Arc<AtomicBool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl IngestionClient {
    /// Build a new client. Does not spawn any background tasks — call
    /// [`IngestionClient::start`] once the returned `Arc` is in hand.
    pub fn new(config: AgentConfig) -> Result<Arc<Self>> {
        config.validate()?;
        let http = HttpClientFactory::create(HttpConfig {
            timeout_ms: config.request_timeout_ms,
            ..HttpConfig::default()
        })
        .map_err(|e| AgentError::transport("*", None, e.to_string()))?;

        Ok(Arc::new(Self {
            backoff: BackoffPolicy::new(1_000, 30_000, config.max_batch_retries),
            config: Arc::new(config),
            http,
            counters: Arc::new(IngestionCounters::default()),
            batches: DashMap::new(),
            retry_queues: DashMap::new(),
            stopped: Arc::new(AtomicBool::new(false)),
            tasks: Mutex::new(Vec::new()),
        }))
    }

    pub fn counters(&self) -> Arc<IngestionCounters> {
        Arc::clone(&self.counters)
    }

    /// Spawn the periodic all-streams flush timer and the retry sweep.
    /// Safe to call once; calling twice spawns duplicate timers.
    pub fn start(self: &Arc<Self>) {
        let flush_handle = {
            let this = Arc::clone(self);
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(this.config.flush_interval());
                loop {
                    ticker.tick().await;
                    if this.stopped.load(Ordering::SeqCst) {
                        break;
                    }
                    this.flush_all();
                }
            })
        };

        let sweep_handle = {
            let this = Arc::clone(self);
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(RETRY_SWEEP_INTERVAL);
                loop {
                    ticker.tick().await;
                    if this.stopped.load(Ordering::SeqCst) {
                        break;
                    }
                    this.sweep_retries().await;
                }
            })
        };

        let mut tasks = self.tasks.lock().unwrap();
        tasks.push(flush_handle);
        tasks.push(sweep_handle);
    }

    /// Submit one item to `stream_name`, applying sampling (for `traces`
    /// and `rum` only) and flushing immediately if the batch's size
    /// thresholds are now exceeded.
    pub fn submit(self: &Arc<Self>, stream_name: &str, payload: Value) {
        if self.stopped.load(Ordering::SeqCst) {
            return;
        }

        let stream = StreamKind::parse(stream_name);
        if stream.is_sampled() {
            let rate = match stream {
                StreamKind::Traces => self.config.trace_sample_rate,
                StreamKind::Rum => self.config.rum_sample_rate,
                _ => 1.0,
            };
            if rate < 1.0 && rand::thread_rng().gen::<f64>() >= rate {
                self.counters.bump_sampled();
                return;
            }
        }

        let exceeded = {
            let entry = self
                .batches
                .entry(stream.name().to_string())
                .or_insert_with(|| Mutex::new(BatchState::new()));
            let mut batch = entry.lock().unwrap();
            batch.push(payload);
            batch.exceeds(self.config.batch_size, self.config.batch_size_bytes)
        };

        if exceeded {
            self.flush_stream(&stream);
        }
    }

    /// Flush every stream with a non-empty batch.
    pub fn flush_all(self: &Arc<Self>) {
        let names: Vec<String> = self.batches.iter().map(|e| e.key().clone()).collect();
        for name in names {
            self.flush_stream(&StreamKind::parse(&name));
        }
    }

    /// Take one stream's accumulated batch (if any) and hand it to a
    /// spawned dispatch task. Returning immediately keeps `submit` (called
    /// from the hot tracing path) non-blocking.
    fn flush_stream(self: &Arc<Self>, stream: &StreamKind) {
        let items = match self.batches.get(stream.name()) {
            Some(entry) => {
                let mut batch = entry.lock().unwrap();
                if batch.is_empty() {
                    return;
                }
                batch.take()
            }
            None => return,
        };

        let body = match serialize_envelope(stream.payload_key(), &items) {
            Ok(body) => body,
            Err(e) => {
                warn!(stream = %stream, error = %e, "dropping batch: serialization failed");
                self.counters.bump_failed(items.len() as u64);
                return;
            }
        };

        let this = Arc::clone(self);
        let dispatch = PendingDispatch {
            stream_name: stream.name().to_string(),
            endpoint: stream.endpoint(),
            body,
            due_at: Instant::now(),
        };
        tokio::spawn(async move { this.dispatch_first(dispatch).await });
    }

    /// First dispatch attempt for a freshly flushed batch. On failure it
    /// is handed to [`IngestionClient::enqueue_retry`] rather than retried
    /// inline.
    async fn dispatch_first(&self, dispatch: PendingDispatch) {
        if self.stopped.load(Ordering::SeqCst) {
            return;
        }

        let url = format!("{}{}", self.config.endpoint, dispatch.endpoint);
        match self.send(&url, &dispatch.body).await {
            Ok(()) => {
                debug!(stream = %dispatch.stream_name, bytes = dispatch.body.len(), "batch dispatched");
            }
            Err(e) => {
                warn!(stream = %dispatch.stream_name, error = %e, "dispatch failed; queuing for retry");
                let delay = self.backoff.backoff_duration(0);
                self.enqueue_retry(
                    PendingDispatch {
                        due_at: Instant::now() + delay,
                        ..dispatch
                    },
                    0,
                );
            }
        }
    }

    async fn send(&self, url: &str, body: &[u8]) -> Result<()> {
        let response = self
            .http
            .post(url)
            .header("content-type", "application/json")
            .header("X-SkySignal-API-Key", &self.config.api_key)
            .body(body.to_vec())
            .send()
            .await
            .map_err(|e| AgentError::transport(url, None, e.to_string()))?;

        if !response.status().is_success() {
            return Err(AgentError::transport(
                url,
                Some(response.status().as_u16()),
                "non-success status",
            ));
        }
        Ok(())
    }

    fn enqueue_retry(&self, dispatch: PendingDispatch, retry_count: u32) {
        let entry = self
            .retry_queues
            .entry(dispatch.stream_name.clone())
            .or_insert_with(|| Mutex::new(RetryQueue::new(skysignal_utils::MAX_RETRY_QUEUE_SIZE)));
        let mut queue = entry.lock().unwrap();
        let before = queue.len();
        queue.push(RetryEntry { items: dispatch, retry_count });
        if queue.len() == before {
            self.counters.bump_retry_dropped(1);
        }
    }

    /// Scan every stream's retry queue for entries whose `due_at` has
    /// passed, dispatch them, and either requeue with a longer backoff or
    /// drop permanently once `maxBatchRetries` is exhausted.
    async fn sweep_retries(&self) {
        let stream_names: Vec<String> = self.retry_queues.iter().map(|e| e.key().clone()).collect();

        for stream_name in stream_names {
            let due = {
                let entry = match self.retry_queues.get(&stream_name) {
                    Some(e) => e,
                    None => continue,
                };
                let mut queue = entry.lock().unwrap();
                let mut due = Vec::new();
                let now = Instant::now();
                let mut remaining = RetryQueue::new(queue.capacity());
                while let Some(entry) = queue.pop_front() {
                    if entry.items.due_at <= now {
                        due.push(entry);
                    } else {
                        remaining.push(entry);
                    }
                }
                *queue = remaining;
                due
            };

            for retry_entry in due {
                self.retry_one(retry_entry.items, retry_entry.retry_count).await;
            }
        }
    }

    async fn retry_one(&self, dispatch: PendingDispatch, retry_count: u32) {
        if self.stopped.load(Ordering::SeqCst) {
            return;
        }

        let url = format!("{}{}", self.config.endpoint, dispatch.endpoint);
        match self.send(&url, &dispatch.body).await {
            Ok(()) => {
                debug!(stream = %dispatch.stream_name, retry_count, "retried batch dispatched");
            }
            Err(e) => {
                if self.backoff.exhausted(retry_count + 1) {
                    error!(
                        stream = %dispatch.stream_name,
                        retry_count,
                        error = %e,
                        "retries exhausted; dropping batch permanently"
                    );
                    self.counters.bump_failed(1);
                    return;
                }

                let next_count = retry_count + 1;
                let delay = self.backoff.backoff_duration(next_count);
                self.enqueue_retry(
                    PendingDispatch {
                        due_at: Instant::now() + delay,
                        ..dispatch
                    },
                    next_count,
                );
            }
        }
    }

    /// Stop accepting new submissions, cancel the background timers, and
    /// attempt one final flush of whatever is currently batched.
    ///
    /// The `stopped` flag is set *before* the final flush runs, matching
    /// the documented data-loss window: any batch not already in flight
    /// when `stop` is called is handed to a dispatch task that checks
    /// `stopped` first and returns without sending, so the "final flush"
    /// drains the in-memory batches without guaranteeing delivery.
    pub fn stop(self: &Arc<Self>) {
        self.stopped.store(true, Ordering::SeqCst);

        for handle in self.tasks.lock().unwrap().drain(..) {
            handle.abort();
        }

        self.flush_all();
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(endpoint: String) -> AgentConfig {
        let mut cfg = AgentConfig::default();
        cfg.api_key = "sk_test".to_string();
        cfg.endpoint = endpoint;
        cfg.batch_size = 2;
        cfg.flush_interval_ms = 60_000;
        cfg
    }

    #[tokio::test]
    async fn flush_dispatches_when_batch_size_reached() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/traces"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let client = IngestionClient::new(test_config(server.uri())).unwrap();
        client.submit("traces", serde_json::json!({"a": 1}));
        client.submit("traces", serde_json::json!({"a": 2}));

        tokio::time::sleep(Duration::from_millis(50)).await;
        server.verify().await;
    }

    #[tokio::test]
    async fn failed_dispatch_is_queued_for_retry() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/traces"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let client = IngestionClient::new(test_config(server.uri())).unwrap();
        client.submit("traces", serde_json::json!({"a": 1}));
        client.submit("traces", serde_json::json!({"a": 2}));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(client.retry_queues.contains_key("traces"));
    }

    #[tokio::test]
    async fn stop_prevents_further_dispatch() {
        let server = MockServer::start().await;
        let client = IngestionClient::new(test_config(server.uri())).unwrap();
        client.stop();
        assert!(client.is_stopped());
        client.submit("traces", serde_json::json!({"a": 1}));
        assert!(!client.batches.contains_key("traces"));
    }
}
