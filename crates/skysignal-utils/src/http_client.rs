//! HTTP client factory for the Ingestion Client, adapted from the
//! teacher's `riptide-utils::http::HttpClientFactory`.

use reqwest::{Client, ClientBuilder};
use std::time::Duration;
use tracing::{debug, info};

/// Configuration for the ingestion HTTP client.
#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub timeout_ms: u64,
    pub connect_timeout_ms: u64,
    pub pool_idle_timeout_secs: u64,
    pub pool_max_idle_per_host: usize,
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 15_000,
            connect_timeout_ms: 5_000,
            pool_idle_timeout_secs: 90,
            pool_max_idle_per_host: 4,
            user_agent: format!("skysignal-agent/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Builds the `reqwest::Client` used to dispatch batches to the
/// collector. One client is shared across all streams.
pub struct HttpClientFactory;

impl HttpClientFactory {
    pub fn create(config: HttpConfig) -> Result<Client, reqwest::Error> {
        info!(timeout_ms = config.timeout_ms, "creating ingestion HTTP client");

        let client = ClientBuilder::new()
            .timeout(Duration::from_millis(config.timeout_ms))
            .connect_timeout(Duration::from_millis(config.connect_timeout_ms))
            .pool_idle_timeout(Duration::from_secs(config.pool_idle_timeout_secs))
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .user_agent(config.user_agent)
            .use_rustls_tls()
            .build()?;

        debug!("ingestion HTTP client created");
        Ok(client)
    }

    pub fn create_default() -> Result<Client, reqwest::Error> {
        Self::create(HttpConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_sane_timeouts() {
        let config = HttpConfig::default();
        assert_eq!(config.timeout_ms, 15_000);
        assert!(config.user_agent.starts_with("skysignal-agent/"));
    }

    #[test]
    fn create_default_client_succeeds() {
        assert!(HttpClientFactory::create_default().is_ok());
    }

    #[test]
    fn create_with_custom_config() {
        let config = HttpConfig {
            timeout_ms: 3_000,
            connect_timeout_ms: 1_000,
            pool_idle_timeout_secs: 30,
            pool_max_idle_per_host: 2,
            user_agent: "test-agent".to_string(),
        };
        assert!(HttpClientFactory::create(config).is_ok());
    }
}
