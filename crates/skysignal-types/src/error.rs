//! Error taxonomy for the SkySignal agent
//!
//! Internal crate APIs return [`AgentError`]; the facade in
//! `skysignal-agent` converts to `anyhow::Error` only when crossing into
//! host-facing code. The agent never surfaces these upstream to the host
//! — every collector guards its own work and logs instead.

use thiserror::Error;

/// Result type alias using [`AgentError`]
pub type Result<T> = std::result::Result<T, AgentError>;

/// Unified error type for agent-internal operations.
///
/// Maps onto spec §7's taxonomy: `ConfigError` is fatal at startup,
/// `TransportError` is recoverable and drives the ingestion retry queue,
/// `SerializationError` causes a batch drop with a counter bump, and
/// `CollectorError` is logged and swallowed inside a collector's tick.
#[derive(Error, Debug)]
pub enum AgentError {
    /// Configuration validation failed. Prevents the supervisor from
    /// starting any collector.
    #[error("config error: {field}: {reason}")]
    Config {
        /// Name of the offending configuration field.
        field: String,
        /// Human-readable reason the value was rejected.
        reason: String,
    },

    /// An HTTP dispatch to the collector failed (non-2xx or transport
    /// failure). Recoverable via the stream's retry queue.
    #[error("transport error on stream {stream}: {reason}")]
    Transport {
        /// Stream the dispatch was for.
        stream: String,
        /// Status code, if the server responded at all.
        status: Option<u16>,
        /// Description of the failure.
        reason: String,
    },

    /// A batch could not be serialized (beyond the cycle-tolerant
    /// `[Circular]` substitution, e.g. an unsupported value type).
    #[error("serialization error on stream {stream}: {reason}")]
    Serialization {
        /// Stream whose batch was dropped.
        stream: String,
        /// Description of the failure.
        reason: String,
    },

    /// An internal collector error. Always logged and swallowed at the
    /// collector boundary; never propagated to the host.
    #[error("collector error in {collector}: {source}")]
    Collector {
        /// Name of the collector that failed.
        collector: String,
        /// Underlying cause.
        #[source]
        source: anyhow::Error,
    },
}

impl AgentError {
    /// Build a [`AgentError::Config`] variant.
    pub fn config(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Config {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Build a [`AgentError::Transport`] variant.
    pub fn transport(
        stream: impl Into<String>,
        status: Option<u16>,
        reason: impl Into<String>,
    ) -> Self {
        Self::Transport {
            stream: stream.into(),
            status,
            reason: reason.into(),
        }
    }

    /// Build a [`AgentError::Serialization`] variant.
    pub fn serialization(stream: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Serialization {
            stream: stream.into(),
            reason: reason.into(),
        }
    }

    /// Build a [`AgentError::Collector`] variant from any error.
    pub fn collector(collector: impl Into<String>, source: impl Into<anyhow::Error>) -> Self {
        Self::Collector {
            collector: collector.into(),
            source: source.into(),
        }
    }

    /// True for errors that should prevent agent startup entirely.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Config { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_is_fatal() {
        let err = AgentError::config("batchSize", "must be >= 1");
        assert!(err.is_fatal());
        assert!(err.to_string().contains("batchSize"));
    }

    #[test]
    fn transport_error_carries_status() {
        let err = AgentError::transport("traces", Some(503), "service unavailable");
        assert!(!err.is_fatal());
        match err {
            AgentError::Transport { status, .. } => assert_eq!(status, Some(503)),
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn collector_error_wraps_source() {
        let source = anyhow::anyhow!("boom");
        let err = AgentError::collector("pool-observer", source);
        assert!(err.to_string().contains("pool-observer"));
        assert!(err.to_string().contains("boom"));
    }
}
