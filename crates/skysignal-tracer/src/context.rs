//! Async-local trace context (spec §4.2, §9 "Async context propagation").
//!
//! The host-method call stack is not available in Rust; instead every
//! traced invocation installs a [`TraceContext`] into a
//! [`tokio::task_local!`] slot that survives `.await` suspension points
//! for the lifetime of that task and any task spawned with `scope`
//! carrying the same handle — the host-runtime-provided mechanism spec §9
//! requires, as opposed to ambient thread-local storage (which breaks the
//! moment a suspended task resumes on a different worker thread).

use skysignal_types::{trace::NPLUSONE_MIN_COUNT, Operation, QueryFingerprint, SlowQueryAnalysis};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;

/// Fingerprint-map cap (spec §4.2: `maxQueryFingerprints: 100`).
pub const MAX_QUERY_FINGERPRINTS: usize = 100;
/// Per-trace db-operation sample cap (spec §4.2: `maxQueryOperations: 500`).
pub const MAX_QUERY_OPERATIONS: usize = 500;

tokio::task_local! {
    static CURRENT_TRACE: Arc<Mutex<TraceContext>>;
}

/// Mutable state accumulated for one in-flight host-method invocation.
#[derive(Debug)]
pub struct TraceContext {
    pub method_name: String,
    pub start: Instant,
    pub start_time_ms: i64,
    pub operations: Vec<Operation>,
    pub query_fingerprints: HashMap<String, QueryFingerprint>,
    pub query_operations: Vec<Operation>,
    pub slow_queries: Vec<SlowQueryAnalysis>,
    pub unblock_called: bool,
    pub unblock_offset_ms: Option<f64>,
    pub sibling_entries: usize,
}

impl TraceContext {
    pub fn new(method_name: impl Into<String>) -> Self {
        Self {
            method_name: method_name.into(),
            start: Instant::now(),
            start_time_ms: chrono::Utc::now().timestamp_millis(),
            operations: Vec::new(),
            query_fingerprints: HashMap::new(),
            query_operations: Vec::new(),
            slow_queries: Vec::new(),
            unblock_called: false,
            unblock_offset_ms: None,
            sibling_entries: 0,
        }
    }

    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }

    /// Append an operation, updating the fingerprint map and the
    /// db-operation sample list for `db` operations (each capped by its
    /// own maximum, spec §4.2).
    pub fn add_operation(&mut self, op: Operation) {
        if let Operation::Db {
            collection,
            operation,
            selector_normalized,
            slow_query,
            ..
        } = &op
        {
            if let Some(analysis) = slow_query {
                self.slow_queries.push(analysis.clone());
            }

            let key = crate::normalize::fingerprint_key(collection, operation, selector_normalized).0;
            let already_tracked = self.query_fingerprints.contains_key(&key);
            if already_tracked || self.query_fingerprints.len() < MAX_QUERY_FINGERPRINTS {
                let fp = self
                    .query_fingerprints
                    .entry(key)
                    .or_insert_with(|| QueryFingerprint::new(String::new(), collection.clone(), operation.clone()));
                fp.record(op.clone());
            }

            if self.query_operations.len() < MAX_QUERY_OPERATIONS {
                self.query_operations.push(op.clone());
            }
        }

        self.operations.push(op);
    }

    /// N+1 patterns detected so far meet the published law even mid-trace,
    /// but are normally only consulted once at seal time.
    pub fn has_nplusone_candidate(&self) -> bool {
        self.query_fingerprints.values().any(|fp| fp.count >= NPLUSONE_MIN_COUNT)
    }
}

/// Run `fut` with a freshly created [`TraceContext`] installed for
/// `method_name`, returning the context handle alongside the future's
/// output so the caller can seal it. Any task spawned from within `fut`
/// that also needs to observe this context must re-enter via
/// [`scope_with`].
pub async fn enter<F, T>(method_name: impl Into<String>, fut: F) -> (Arc<Mutex<TraceContext>>, T)
where
    F: std::future::Future<Output = T>,
{
    let ctx = Arc::new(Mutex::new(TraceContext::new(method_name)));
    let result = CURRENT_TRACE.scope(Arc::clone(&ctx), fut).await;
    (ctx, result)
}

/// Run `fut` under an explicitly supplied context handle — used to give a
/// spawned sibling task the same context as its parent (spec §4.2:
/// "concurrent sibling tasks under the same method MUST see the same
/// context"). Counts the entry so `seal` can tell whether any other task
/// ran concurrently with this one, rather than standing in for that signal
/// with an unrelated one.
pub async fn scope_with<F, T>(ctx: Arc<Mutex<TraceContext>>, fut: F) -> T
where
    F: std::future::Future<Output = T>,
{
    ctx.lock().unwrap().sibling_entries += 1;
    CURRENT_TRACE.scope(ctx, fut).await
}

/// The current task's trace context handle, if one is installed. Clone
/// this to carry into a spawned sibling task and re-enter with
/// [`scope_with`].
pub fn current() -> Option<Arc<Mutex<TraceContext>>> {
    CURRENT_TRACE.try_with(Arc::clone).ok()
}

/// Append an operation to the current context, a no-op if no context is
/// installed (tracer degrades gracefully outside a traced call).
pub fn add_operation(op: Operation) {
    if let Some(ctx) = current() {
        ctx.lock().unwrap().add_operation(op);
    }
}

/// Record that the host's "unblock" hook fired at the given offset from
/// trace start (spec §4.2 unblock-impact annotation).
pub fn record_unblock(offset_ms: f64) {
    if let Some(ctx) = current() {
        let mut ctx = ctx.lock().unwrap();
        ctx.unblock_called = true;
        ctx.unblock_offset_ms = Some(offset_ms);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skysignal_types::Operation;

    #[tokio::test]
    async fn sibling_tasks_share_context() {
        let (ctx, _) = enter("test.method", async {
            let ctx = current().unwrap();
            let ctx2 = Arc::clone(&ctx);
            let handle = tokio::spawn(scope_with(ctx2, async {
                add_operation(Operation::Wait {
                    time_offset_ms: 0.0,
                    label: "child".into(),
                    duration_ms: 1.0,
                    arguments: None,
                });
            }));
            handle.await.unwrap();
        })
        .await;

        assert_eq!(ctx.lock().unwrap().operations.len(), 1);
    }

    #[tokio::test]
    async fn unrelated_concurrent_methods_have_disjoint_contexts() {
        let (ctx_a, _) = enter("a", async {
            add_operation(Operation::Wait {
                time_offset_ms: 0.0,
                label: "a-op".into(),
                duration_ms: 1.0,
                arguments: None,
            });
        })
        .await;

        let (ctx_b, _) = enter("b", async {}).await;

        assert_eq!(ctx_a.lock().unwrap().operations.len(), 1);
        assert_eq!(ctx_b.lock().unwrap().operations.len(), 0);
    }

    #[test]
    fn add_operation_outside_context_is_a_harmless_noop() {
        add_operation(Operation::Wait {
            time_offset_ms: 0.0,
            label: "orphan".into(),
            duration_ms: 1.0,
            arguments: None,
        });
    }

    #[tokio::test]
    async fn fingerprint_map_caps_at_max_entries() {
        let (ctx, _) = enter("test.cap", async {
            for i in 0..(MAX_QUERY_FINGERPRINTS + 10) {
                let mut shape = serde_json::Map::new();
                shape.insert(format!("field{i}"), serde_json::json!(1));
                add_operation(Operation::Db {
                    time_offset_ms: 0.0,
                    collection: "posts".into(),
                    operation: "findOne".into(),
                    selector_normalized: serde_json::Value::Object(shape),
                    duration_ms: 1.0,
                    explain: None,
                    slow_query: None,
                    arguments: None,
                });
            }
        })
        .await;

        assert!(ctx.lock().unwrap().query_fingerprints.len() <= MAX_QUERY_FINGERPRINTS);
    }
}
