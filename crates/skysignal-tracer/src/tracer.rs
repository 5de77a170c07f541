//! The Method Tracer (spec §4.2): wraps a host-method invocation, records
//! operations against the async-local [`TraceContext`], and on exit seals
//! the context into a [`Trace`] submitted to the `traces` stream exactly
//! once.

use crate::call_stack::CallStackRegistry;
use crate::context::{self, TraceContext};
use crate::slow_query::{self, DEFAULT_SLOW_QUERY_THRESHOLD_MS};
use serde_json::Value;
use skysignal_ingestion::{to_value, DynValue, IngestionClient};
use skysignal_types::trace::detect_nplusone;
use skysignal_types::{AgentConfig, Operation, Outcome, Trace, UnblockImpact};
use skysignal_utils::{sanitize, SanitizeLimits};
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::{debug, warn};

/// Tuning knobs derived from [`AgentConfig`] that are local to tracing
/// rather than part of the external configuration surface.
#[derive(Debug, Clone)]
pub struct TracerConfig {
    pub slow_query_threshold_ms: f64,
    pub max_arg_length: usize,
    pub trace_method_arguments: bool,
    pub trace_method_operations: bool,
    pub app_version: Option<String>,
    pub build_hash: Option<String>,
}

impl TracerConfig {
    pub fn from_agent_config(config: &AgentConfig) -> Self {
        Self {
            slow_query_threshold_ms: DEFAULT_SLOW_QUERY_THRESHOLD_MS,
            max_arg_length: config.max_arg_length,
            trace_method_arguments: config.trace_method_arguments,
            trace_method_operations: config.trace_method_operations,
            app_version: config.app_version.clone(),
            build_hash: config.build_hash.clone(),
        }
    }
}

/// Wraps host-method invocations and ships completed [`Trace`]s.
pub struct Tracer {
    ingestion: Arc<IngestionClient>,
    config: TracerConfig,
    call_stack: CallStackRegistry,
}

impl Tracer {
    pub fn new(ingestion: Arc<IngestionClient>, config: TracerConfig) -> Arc<Self> {
        Arc::new(Self {
            ingestion,
            config,
            call_stack: CallStackRegistry::new(),
        })
    }

    /// Wrap one host-method invocation. On success or failure the context
    /// is sealed and submitted exactly once; `fut`'s `Result` is passed
    /// through unchanged.
    pub async fn trace<F, Fut, T, E>(
        self: &Arc<Self>,
        method_name: &str,
        user_id: Option<String>,
        session_id: Option<String>,
        f: F,
    ) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        self.call_stack.push(method_name);
        let (ctx, result) = context::enter(method_name, f()).await;

        let outcome = match &result {
            Ok(_) => Outcome::Ok,
            Err(_) => Outcome::Error,
        };
        let error_summary = result.as_ref().err().map(|e| e.to_string());
        self.seal(ctx, user_id, session_id, outcome, error_summary);
        result
    }

    /// Record a completed `db` operation, applying slow-query
    /// classification when it clears the configured threshold.
    ///
    /// `call_arguments` is the raw host method-call arguments, captured as
    /// a [`DynValue`] rather than a plain `Value` because a host object
    /// graph (unlike anything this agent builds itself) can alias or
    /// cycle; [`Tracer::sanitize_arguments`] runs it through `to_value`
    /// before the existing depth/length sanitizer ever sees it.
    pub fn record_db(
        &self,
        collection: impl Into<String>,
        operation: impl Into<String>,
        selector: &Value,
        duration_ms: f64,
        explain: Option<Value>,
        call_arguments: Option<&DynValue>,
    ) {
        let Some(ctx) = context::current() else {
            return;
        };
        let collection = collection.into();
        let operation = operation.into();
        let (_, selector_normalized) =
            crate::normalize::fingerprint_key(&collection, &operation, selector);

        let slow_query = if duration_ms >= self.config.slow_query_threshold_ms {
            Some(slow_query::analyze(selector, duration_ms))
        } else {
            None
        };

        let arguments = call_arguments.and_then(|args| self.sanitize_arguments(args));

        let time_offset_ms = ctx.lock().unwrap().elapsed_ms();
        let op = Operation::Db {
            time_offset_ms,
            collection,
            operation,
            selector_normalized,
            duration_ms,
            explain,
            slow_query,
            arguments,
        };
        ctx.lock().unwrap().add_operation(op);
    }

    /// Record a `wait` operation spanning `start` to now.
    pub fn track_wait_time(&self, label: impl Into<String>, start: Instant) {
        self.track(label, start, |time_offset_ms, label, duration_ms| Operation::Wait {
            time_offset_ms,
            label,
            duration_ms,
            arguments: None,
        });
    }

    /// Record a `compute` operation spanning `start` to now.
    pub fn track_compute_time(&self, label: impl Into<String>, start: Instant) {
        self.track(label, start, |time_offset_ms, label, duration_ms| Operation::Compute {
            time_offset_ms,
            label,
            duration_ms,
            arguments: None,
        });
    }

    /// Record an `async` operation spanning `start` to now, with no error.
    pub fn track_async_operation(&self, label: impl Into<String>, start: Instant) {
        self.track(label, start, |time_offset_ms, label, duration_ms| Operation::Async {
            time_offset_ms,
            label,
            duration_ms,
            error: None,
            arguments: None,
        });
    }

    /// Await `fut`, recording its duration as an `async` operation. On
    /// error the operation records the error's `Display` text and the
    /// error is re-raised to the caller.
    pub async fn track_async_function<Fut, T, E>(&self, label: impl Into<String>, fut: Fut) -> Result<T, E>
    where
        Fut: std::future::Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        let label = label.into();
        let start = Instant::now();
        let time_offset_ms = context::current().map(|c| c.lock().unwrap().elapsed_ms()).unwrap_or(0.0);
        let result = fut.await;
        let duration_ms = start.elapsed().as_secs_f64() * 1000.0;

        let error = result.as_ref().err().map(|e| e.to_string());
        context::add_operation(Operation::Async {
            time_offset_ms,
            label,
            duration_ms,
            error,
            arguments: None,
        });
        result
    }

    /// Record that the host's "unblock" hook fired.
    pub fn record_unblock(&self, offset_ms: f64) {
        context::record_unblock(offset_ms);
    }

    /// The stale-pruned call-stack registry (spec §4.2 cross-cutting
    /// correlation).
    pub fn call_stack(&self) -> &CallStackRegistry {
        &self.call_stack
    }

    /// Sanitize method-call arguments under the "default" profile
    /// (spec §4.2), respecting `traceMethodArguments`. Takes a
    /// [`DynValue`] rather than a plain `Value` since the host's raw
    /// argument graph, unlike anything this agent assembles internally,
    /// can alias or cycle; `to_value` resolves that before the
    /// depth/length sanitizer runs.
    pub fn sanitize_arguments(&self, args: &DynValue) -> Option<Value> {
        if !self.config.trace_method_arguments {
            return None;
        }
        let limits = SanitizeLimits::default_profile(self.config.max_arg_length);
        Some(sanitize(&to_value(args), &limits))
    }

    /// Sanitize a db selector under the "db" profile (spec §4.2).
    pub fn sanitize_selector_arguments(&self, selector: &Value) -> Value {
        sanitize(selector, &SanitizeLimits::db_profile())
    }

    fn track(
        &self,
        label: impl Into<String>,
        start: Instant,
        build: impl FnOnce(f64, String, f64) -> Operation,
    ) {
        let Some(ctx) = context::current() else {
            return;
        };
        let label = label.into();
        let duration_ms = start.elapsed().as_secs_f64() * 1000.0;
        let time_offset_ms = ctx.lock().unwrap().elapsed_ms();
        let op = build(time_offset_ms, label, duration_ms);
        ctx.lock().unwrap().add_operation(op);
    }

    fn seal(
        &self,
        ctx: Arc<Mutex<TraceContext>>,
        user_id: Option<String>,
        session_id: Option<String>,
        outcome: Outcome,
        error_summary: Option<String>,
    ) {
        let ctx = match Arc::try_unwrap(ctx) {
            Ok(mutex) => mutex.into_inner().unwrap(),
            Err(arc) => {
                // A sibling task is still holding a clone of the handle;
                // fall back to cloning the accumulated state rather than
                // blocking the caller.
                warn!("sealing trace context with outstanding clones");
                let guard = arc.lock().unwrap();
                TraceContext {
                    method_name: guard.method_name.clone(),
                    start: guard.start,
                    start_time_ms: guard.start_time_ms,
                    operations: guard.operations.clone(),
                    query_fingerprints: guard.query_fingerprints.clone(),
                    query_operations: guard.query_operations.clone(),
                    slow_queries: guard.slow_queries.clone(),
                    unblock_called: guard.unblock_called,
                    unblock_offset_ms: guard.unblock_offset_ms,
                    sibling_entries: guard.sibling_entries,
                }
            }
        };

        let nplusone_patterns = detect_nplusone(&ctx.query_fingerprints);
        let duration_ms = ctx.elapsed_ms();

        // `unblock_impact` is gated on the host actually having called the
        // "unblock" hook during this trace — this agent has no separate
        // signal for "the hook exists but was never invoked" (spec §9
        // treats hook presence as source-defined plumbing), so absence of
        // a call is simply the common case of a method with no hook.
        let unblock_impact = if ctx.unblock_called {
            let blocking_time_ms = ctx.unblock_offset_ms.unwrap_or(duration_ms);
            let waited_on_by_other_tasks = ctx.sibling_entries > 0;
            let mut impact = UnblockImpact::score(blocking_time_ms, waited_on_by_other_tasks, duration_ms);
            impact.called = true;
            impact.offset_ms = ctx.unblock_offset_ms;
            Some(impact)
        } else {
            None
        };

        let operations = if self.config.trace_method_operations {
            ctx.operations
        } else {
            Vec::new()
        };

        let trace = Trace {
            method_name: ctx.method_name,
            start_time_ms: ctx.start_time_ms,
            duration_ms,
            user_id,
            session_id,
            outcome,
            error_summary,
            operations,
            slow_queries: ctx.slow_queries,
            nplusone_patterns,
            unblock_impact,
            app_version: self.config.app_version.clone(),
            build_hash: self.config.build_hash.clone(),
        };

        debug!(method = %trace.method_name, duration_ms = trace.duration_ms, "trace sealed");
        match serde_json::to_value(&trace) {
            Ok(value) => self.ingestion.submit("traces", value),
            Err(e) => warn!(error = %e, "failed to serialize trace"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_tracer() -> Arc<Tracer> {
        let mut cfg = AgentConfig::default();
        cfg.api_key = "sk_test".to_string();
        let ingestion = IngestionClient::new(cfg.clone()).unwrap();
        Tracer::new(ingestion, TracerConfig::from_agent_config(&cfg))
    }

    #[tokio::test]
    async fn trace_round_trip_records_operations_and_nplusone() {
        let tracer = test_tracer();
        let result: Result<(), String> = tracer
            .trace("users.find", None, None, || async {
                tracer.track_wait_time("io", Instant::now());
                for _ in 0..5 {
                    tracer.record_db("posts", "findOne", &serde_json::json!({"_id": "x"}), 1.0, None, None);
                }
                Ok(())
            })
            .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn error_outcome_is_recorded_and_propagated() {
        let tracer = test_tracer();
        let result: Result<(), String> = tracer
            .trace("users.find", None, None, || async { Err("boom".to_string()) })
            .await;
        assert_eq!(result.unwrap_err(), "boom");
    }

    #[tokio::test]
    async fn track_async_function_records_error_and_reraises() {
        let tracer = test_tracer();
        let _ = tracer
            .trace("users.find", None, None, || async {
                let inner: Result<(), String> = tracer
                    .track_async_function("fetch", async { Err("inner failure".to_string()) })
                    .await;
                assert!(inner.is_err());
                Ok::<(), String>(())
            })
            .await;
    }

    #[tokio::test]
    async fn self_referencing_call_arguments_do_not_hang_a_db_operation() {
        let mut cfg = AgentConfig::default();
        cfg.api_key = "sk_test".to_string();
        cfg.trace_method_arguments = true;
        let ingestion = IngestionClient::new(cfg.clone()).unwrap();
        let tracer = Tracer::new(ingestion, TracerConfig::from_agent_config(&cfg));

        let args = DynValue::object(vec![]);
        if let DynValue::Object(rc) = &args {
            rc.borrow_mut().push(("self".to_string(), args.clone()));
        }

        let result: Result<(), String> = tracer
            .trace("posts.update", None, None, || async {
                tracer.record_db(
                    "posts",
                    "update",
                    &serde_json::json!({"_id": "x"}),
                    1.0,
                    None,
                    Some(&args),
                );
                Ok(())
            })
            .await;
        assert!(result.is_ok());
    }
}
