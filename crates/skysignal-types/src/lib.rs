//! Shared data model, error taxonomy, configuration surface and stream
//! routing for the SkySignal agent.
//!
//! This crate has no runtime behavior of its own — it is the vocabulary
//! every other `skysignal-*` crate shares.

pub mod config;
pub mod env;
pub mod error;
pub mod http;
pub mod jobs;
pub mod livequery;
pub mod pool;
pub mod session;
pub mod snapshot;
pub mod streams;
pub mod system;
pub mod trace;

pub use config::AgentConfig;
pub use error::{AgentError, Result};
pub use http::HttpRequestRecord;
pub use jobs::{JobBackendKind, JobCollectorBackend, JobQueueStats, JobSnapshot};
pub use livequery::{DriverKind, LiveQueryObserver, ObserverStatus, PerformanceRating};
pub use pool::{CheckOutFailureReason, MongoPoolMetrics, PoolConfig};
pub use session::{SessionState, SubscriptionState, SubscriptionStatus};
pub use snapshot::{
    DependencyRecord, DependencySnapshot, DeprecatedApiFinding, DeprecatedApiSnapshot,
    VulnerabilityFinding, VulnerabilitySeverity, VulnerabilitySnapshot,
};
pub use streams::StreamKind;
pub use system::{
    CpuProfileSample, GcStats, HeapSpaceStats, HeapStats, ProcessMemory, SystemMetricsSample,
};
pub use trace::{
    NPlusOnePattern, Operation, Outcome, QueryFingerprint, SlowQueryAnalysis, SlowQueryIssue,
    SlowQuerySeverity, Trace, UnblockImpact, UnblockRecommendation,
};
