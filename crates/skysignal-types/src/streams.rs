//! Stream kinds, endpoint routing and payload-envelope keys.
//!
//! Per spec §4.1 / §6, every item submitted to the Ingestion Client
//! belongs to a named stream that maps to a fixed HTTP endpoint and a
//! JSON envelope key. Unknown stream names fall back to the `traces`
//! endpoint with payload key `data`, so host versions newer than this
//! agent can ship telemetry kinds it doesn't recognize yet.

use std::fmt;

/// One of the ~24 named ingestion streams.
///
/// `Other` carries the stream's literal name for streams this agent
/// build doesn't have a dedicated variant for, preserving forward
/// compatibility with newer host-side stream kinds.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StreamKind {
    Traces,
    SystemMetrics,
    HttpRequests,
    Errors,
    Logs,
    Rum,
    DdpConnections,
    Subscriptions,
    LiveQueries,
    MongoPoolMetrics,
    CollectionStats,
    DnsMetrics,
    OutboundHttp,
    CpuProfiles,
    DeprecatedApis,
    Publications,
    Environment,
    Vulnerabilities,
    CustomMetrics,
    Sessions,
    SecurityEvents,
    Jobs,
    Alerts,
    Dependencies,
    /// A stream name this build doesn't special-case; routed via the
    /// `traces` fallback endpoint with payload key `data`.
    Other(String),
}

impl StreamKind {
    /// Parse a stream name into its [`StreamKind`], never failing —
    /// unrecognized names become [`StreamKind::Other`].
    pub fn parse(name: &str) -> Self {
        match name {
            "traces" => Self::Traces,
            "systemMetrics" => Self::SystemMetrics,
            "httpRequests" => Self::HttpRequests,
            "errors" => Self::Errors,
            "logs" => Self::Logs,
            "rum" => Self::Rum,
            "ddpConnections" => Self::DdpConnections,
            "subscriptions" => Self::Subscriptions,
            "liveQueries" => Self::LiveQueries,
            "mongoPoolMetrics" => Self::MongoPoolMetrics,
            "collectionStats" => Self::CollectionStats,
            "dnsMetrics" => Self::DnsMetrics,
            "outboundHttp" => Self::OutboundHttp,
            "cpuProfiles" => Self::CpuProfiles,
            "deprecatedApis" => Self::DeprecatedApis,
            "publications" => Self::Publications,
            "environment" => Self::Environment,
            "vulnerabilities" => Self::Vulnerabilities,
            "customMetrics" => Self::CustomMetrics,
            "sessions" => Self::Sessions,
            "securityEvents" => Self::SecurityEvents,
            "jobs" => Self::Jobs,
            "alerts" => Self::Alerts,
            "dependencies" => Self::Dependencies,
            other => Self::Other(other.to_string()),
        }
    }

    /// The canonical stream name, as submitted by callers.
    pub fn name(&self) -> &str {
        match self {
            Self::Traces => "traces",
            Self::SystemMetrics => "systemMetrics",
            Self::HttpRequests => "httpRequests",
            Self::Errors => "errors",
            Self::Logs => "logs",
            Self::Rum => "rum",
            Self::DdpConnections => "ddpConnections",
            Self::Subscriptions => "subscriptions",
            Self::LiveQueries => "liveQueries",
            Self::MongoPoolMetrics => "mongoPoolMetrics",
            Self::CollectionStats => "collectionStats",
            Self::DnsMetrics => "dnsMetrics",
            Self::OutboundHttp => "outboundHttp",
            Self::CpuProfiles => "cpuProfiles",
            Self::DeprecatedApis => "deprecatedApis",
            Self::Publications => "publications",
            Self::Environment => "environment",
            Self::Vulnerabilities => "vulnerabilities",
            Self::CustomMetrics => "customMetrics",
            Self::Sessions => "sessions",
            Self::SecurityEvents => "securityEvents",
            Self::Jobs => "jobs",
            Self::Alerts => "alerts",
            Self::Dependencies => "dependencies",
            Self::Other(name) => name,
        }
    }

    /// HTTP endpoint path this stream's batches are POSTed to.
    pub fn endpoint(&self) -> String {
        match self {
            Self::Traces => "/api/v1/traces".to_string(),
            Self::SystemMetrics => "/api/v1/metrics/system".to_string(),
            Self::HttpRequests => "/api/v1/metrics/http".to_string(),
            Self::Errors => "/api/v1/errors".to_string(),
            Self::Logs => "/api/v1/logs".to_string(),
            Self::Rum => "/api/v1/rum".to_string(),
            Self::DdpConnections => "/api/v1/ddp-connections".to_string(),
            Self::Subscriptions => "/api/v1/subscriptions".to_string(),
            Self::LiveQueries => "/api/v1/live-queries".to_string(),
            Self::CollectionStats => "/api/v1/metrics/collection-stats".to_string(),
            Self::CpuProfiles => "/api/v1/metrics/cpu-profile".to_string(),
            Self::Publications => "/api/v1/metrics/publications".to_string(),
            // Every other recognized-but-not-explicitly-routed stream, and
            // every unrecognized stream, falls back to the generic metrics
            // path keyed by stream name, except the hard traces fallback
            // below for names with no sensible "kind" to slot in.
            Self::MongoPoolMetrics
            | Self::DnsMetrics
            | Self::OutboundHttp
            | Self::DeprecatedApis
            | Self::Environment
            | Self::Vulnerabilities
            | Self::CustomMetrics
            | Self::Sessions
            | Self::SecurityEvents
            | Self::Jobs
            | Self::Alerts
            | Self::Dependencies => format!("/api/v1/metrics/{}", self.name()),
            Self::Other(_) => "/api/v1/traces".to_string(),
        }
    }

    /// JSON envelope key the batch's items are nested under, e.g.
    /// `{"traces": [...]}`.
    pub fn payload_key(&self) -> &'static str {
        match self {
            Self::Traces => "traces",
            Self::SystemMetrics => "metrics",
            Self::HttpRequests => "requests",
            Self::Errors => "errors",
            Self::Logs => "logs",
            Self::Rum => "measurements",
            Self::DdpConnections => "connections",
            Self::Subscriptions => "subscriptions",
            Self::LiveQueries => "liveQueries",
            Self::CollectionStats => "stats",
            Self::CpuProfiles => "profiles",
            Self::Publications => "publications",
            _ => "data",
        }
    }

    /// Whether this stream is submission-sampled per spec §4.1. Only
    /// `traces` and `rum` are sampled; every other stream always accepts.
    pub fn is_sampled(&self) -> bool {
        matches!(self, Self::Traces | Self::Rum)
    }
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_stream_roundtrips_name() {
        let s = StreamKind::parse("traces");
        assert_eq!(s.name(), "traces");
        assert_eq!(s.endpoint(), "/api/v1/traces");
        assert_eq!(s.payload_key(), "traces");
    }

    #[test]
    fn unknown_stream_falls_back_to_traces_endpoint() {
        let s = StreamKind::parse("somethingNewFromHostV2");
        assert_eq!(s.endpoint(), "/api/v1/traces");
        assert_eq!(s.payload_key(), "data");
    }

    #[test]
    fn only_traces_and_rum_are_sampled() {
        assert!(StreamKind::parse("traces").is_sampled());
        assert!(StreamKind::parse("rum").is_sampled());
        assert!(!StreamKind::parse("httpRequests").is_sampled());
        assert!(!StreamKind::parse("logs").is_sampled());
    }

    #[test]
    fn fallback_metrics_endpoint_uses_stream_name() {
        let s = StreamKind::parse("dnsMetrics");
        assert_eq!(s.endpoint(), "/api/v1/metrics/dnsMetrics");
    }
}
