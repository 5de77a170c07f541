//! Shared low-level utilities for the SkySignal agent.
//!
//! - **size_estimator**: approximate byte cost of structured values.
//! - **ring_buffer**: fixed-capacity circular sample store with percentiles.
//! - **retry**: exponential backoff and bounded retry queues.
//! - **http_client**: the ingestion HTTP client factory.
//! - **sanitize**: sensitive-key redaction and argument sanitization.
//! - **process_memory**: resident-memory sampling shared by collectors.

pub mod http_client;
pub mod process_memory;
pub mod retry;
pub mod ring_buffer;
pub mod sanitize;
pub mod size_estimator;

pub use http_client::{HttpClientFactory, HttpConfig};
pub use process_memory::resident_memory_bytes;
pub use retry::{BackoffPolicy, RetryEntry, RetryQueue, MAX_RETRY_QUEUE_SIZE};
pub use ring_buffer::RingBuffer;
pub use sanitize::{is_sensitive_key, sanitize, sanitize_selector, SanitizeLimits};
pub use size_estimator::{estimate_size, estimate_size_standalone, CycleSet};
