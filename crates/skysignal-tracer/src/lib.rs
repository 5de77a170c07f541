//! Method Tracer (spec §4.2): async-local trace context, query
//! fingerprinting, N+1 detection and slow-query classification.

mod call_stack;
mod context;
mod normalize;
mod slow_query;
mod tracer;

pub use call_stack::CallStackRegistry;
pub use context::{current, TraceContext};
pub use normalize::{fingerprint_key, normalize};
pub use slow_query::{analyze as analyze_slow_query, DEFAULT_SLOW_QUERY_THRESHOLD_MS};
pub use tracer::{Tracer, TracerConfig};
