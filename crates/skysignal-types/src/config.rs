//! Configuration surface — spec §6.
//!
//! [`AgentConfig`] covers every recognized option from spec §6. Sample
//! rate fields must be in `[0, 1]`, `batch_size >= 1`, and
//! `flush_interval_ms >= 1000`; [`AgentConfig::validate`] enforces this
//! and rejects anything else with an [`AgentError::Config`], matching the
//! teacher's posture in its API-key validation module (reject rather
//! than silently clamp).

use crate::error::{AgentError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Verbosity requested for the (pass-through, optional) explain-plan
/// capture path. See spec §9 Open Questions — this is opaque plumbing,
/// no driver `explain()` call is made by this agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ExplainVerbosity {
    QueryPlanner,
    ExecutionStats,
    AllPlansExecution,
}

/// Recognized configuration surface for the agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentConfig {
    pub api_key: String,
    pub endpoint: String,
    pub enabled: bool,
    pub debug: bool,
    pub host: Option<String>,
    pub app_version: Option<String>,
    pub build_hash: Option<String>,

    pub batch_size: usize,
    pub batch_size_bytes: usize,
    pub flush_interval_ms: u64,

    pub trace_sample_rate: f64,
    pub rum_sample_rate: f64,
    pub index_usage_sample_rate: f64,

    pub explain_verbosity: ExplainVerbosity,
    pub explain_slow_queries_only: bool,

    pub system_metrics_interval_ms: u64,
    pub mongo_pool_interval_ms: u64,
    pub collection_stats_interval_ms: u64,
    pub ddp_connections_interval_ms: u64,
    pub http_requests_interval_ms: u64,
    pub live_queries_interval_ms: u64,

    pub http_sample_rate: f64,
    pub http_exclude_patterns: Vec<String>,

    pub capture_index_usage: bool,
    pub max_arg_length: usize,
    pub trace_method_arguments: bool,
    pub trace_method_operations: bool,

    pub max_batch_retries: u32,
    pub request_timeout_ms: u64,
    pub max_memory_mb: Option<u64>,
    pub mongo_pool_fixed_connection_memory: Option<u64>,

    pub collect_jobs: bool,
    pub jobs_interval_ms: u64,
    pub jobs_package: Option<String>,

    /// Disabled by default (spec §11): coarse self-CPU sampling on the
    /// `cpuProfiles` stream, no flamegraph/stack-trace capture.
    pub enable_cpu_profiling: bool,
    pub cpu_profiling_interval_ms: u64,

    /// Path to the dependency manifest the startup dependency/
    /// vulnerability/deprecated-API snapshot is read from (spec §11).
    pub dependency_manifest_path: Option<String>,

    /// `collect*` toggles for each collector, keyed by collector name
    /// (e.g. `"systemMetrics"`, `"httpRequests"`, `"pool"`, `"liveQueries"`,
    /// `"sessions"`).
    #[serde(default)]
    pub collectors_enabled: std::collections::HashMap<String, bool>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            endpoint: "https://ingest.skysignal.dev".to_string(),
            enabled: true,
            debug: false,
            host: None,
            app_version: std::env::var("APP_VERSION").ok(),
            build_hash: std::env::var("BUILD_HASH")
                .or_else(|_| std::env::var("GIT_SHA"))
                .ok(),
            batch_size: 50,
            batch_size_bytes: 512 * 1024,
            flush_interval_ms: 10_000,
            trace_sample_rate: 1.0,
            rum_sample_rate: 1.0,
            index_usage_sample_rate: 0.1,
            explain_verbosity: ExplainVerbosity::QueryPlanner,
            explain_slow_queries_only: true,
            system_metrics_interval_ms: 60_000,
            mongo_pool_interval_ms: 30_000,
            collection_stats_interval_ms: 60_000,
            ddp_connections_interval_ms: 30_000,
            http_requests_interval_ms: 10_000,
            live_queries_interval_ms: 30_000,
            http_sample_rate: 1.0,
            http_exclude_patterns: vec!["^/__skysignal__/".to_string(), "^/favicon.ico$".to_string()],
            capture_index_usage: false,
            max_arg_length: 1000,
            trace_method_arguments: true,
            trace_method_operations: true,
            max_batch_retries: 3,
            request_timeout_ms: 15_000,
            max_memory_mb: None,
            mongo_pool_fixed_connection_memory: None,
            collect_jobs: false,
            jobs_interval_ms: 60_000,
            jobs_package: None,
            enable_cpu_profiling: false,
            cpu_profiling_interval_ms: 60_000,
            dependency_manifest_path: Some("Cargo.lock".to_string()),
            collectors_enabled: std::collections::HashMap::new(),
        }
    }
}

impl AgentConfig {
    /// Validate the configuration against spec §6's invariants.
    /// Returns the first violation found as an [`AgentError::Config`].
    pub fn validate(&self) -> Result<()> {
        if self.api_key.is_empty() && self.enabled {
            return Err(AgentError::config("apiKey", "must not be empty when enabled"));
        }
        for (field, rate) in [
            ("traceSampleRate", self.trace_sample_rate),
            ("rumSampleRate", self.rum_sample_rate),
            ("indexUsageSampleRate", self.index_usage_sample_rate),
            ("httpSampleRate", self.http_sample_rate),
        ] {
            if !(0.0..=1.0).contains(&rate) {
                return Err(AgentError::config(field, "must be in [0, 1]"));
            }
        }
        if self.batch_size < 1 {
            return Err(AgentError::config("batchSize", "must be >= 1"));
        }
        if self.batch_size_bytes < 1 {
            return Err(AgentError::config("batchSizeBytes", "must be >= 1"));
        }
        if self.flush_interval_ms < 1000 {
            return Err(AgentError::config("flushInterval", "must be >= 1000ms"));
        }
        for pattern in &self.http_exclude_patterns {
            if regex::Regex::new(pattern).is_err() {
                return Err(AgentError::config("httpExcludePatterns", format!("invalid regex: {pattern}")));
            }
        }
        Ok(())
    }

    /// Convenience accessor for the flush interval as a [`Duration`].
    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }

    /// Convenience accessor for the per-request timeout as a [`Duration`].
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Whether a named collector is enabled; defaults to true (every
    /// `collect*` toggle defaults on unless explicitly turned off).
    pub fn collector_enabled(&self, name: &str) -> bool {
        self.collectors_enabled.get(name).copied().unwrap_or(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let mut cfg = AgentConfig::default();
        cfg.api_key = "sk_testkeywithenoughlength1234567890".to_string();
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn empty_api_key_rejected_when_enabled() {
        let cfg = AgentConfig::default();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn out_of_range_sample_rate_rejected() {
        let mut cfg = AgentConfig::default();
        cfg.api_key = "sk_test".to_string();
        cfg.trace_sample_rate = 1.5;
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("traceSampleRate"));
    }

    #[test]
    fn zero_batch_size_rejected() {
        let mut cfg = AgentConfig::default();
        cfg.api_key = "sk_test".to_string();
        cfg.batch_size = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn short_flush_interval_rejected() {
        let mut cfg = AgentConfig::default();
        cfg.api_key = "sk_test".to_string();
        cfg.flush_interval_ms = 500;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn collector_toggle_defaults_on() {
        let cfg = AgentConfig::default();
        assert!(cfg.collector_enabled("systemMetrics"));
    }

    #[test]
    fn collector_toggle_can_be_disabled() {
        let mut cfg = AgentConfig::default();
        cfg.collectors_enabled.insert("systemMetrics".to_string(), false);
        assert!(!cfg.collector_enabled("systemMetrics"));
    }
}
