//! Bootstrap fallback: recover pool configuration from a connection URL's
//! query string when the `poolCreated` event was missed (spec §4.3).

use skysignal_types::pool::PoolConfig;
use url::Url;

/// Parse `minPoolSize`, `maxPoolSize`, `maxIdleTimeMS`, `waitQueueTimeoutMS`
/// out of a MongoDB connection string's query parameters. Unparseable or
/// absent fields are left `None` rather than rejecting the whole URL.
pub fn parse_pool_config(connection_url: &str) -> PoolConfig {
    let Ok(url) = Url::parse(connection_url) else {
        return PoolConfig::default();
    };

    let mut config = PoolConfig::default();
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "minPoolSize" => config.min_pool_size = value.parse().ok(),
            "maxPoolSize" => config.max_pool_size = value.parse().ok(),
            "maxIdleTimeMS" => config.max_idle_time_ms = value.parse().ok(),
            "waitQueueTimeoutMS" => config.wait_queue_timeout_ms = value.parse().ok(),
            _ => {}
        }
    }
    config
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_all_four_recognized_params() {
        let config = parse_pool_config(
            "mongodb://localhost:27017/mydb?minPoolSize=5&maxPoolSize=50&maxIdleTimeMS=10000&waitQueueTimeoutMS=2000",
        );
        assert_eq!(config.min_pool_size, Some(5));
        assert_eq!(config.max_pool_size, Some(50));
        assert_eq!(config.max_idle_time_ms, Some(10_000));
        assert_eq!(config.wait_queue_timeout_ms, Some(2_000));
    }

    #[test]
    fn missing_query_params_stay_none() {
        let config = parse_pool_config("mongodb://localhost:27017/mydb");
        assert_eq!(config.min_pool_size, None);
        assert_eq!(config.max_pool_size, None);
    }

    #[test]
    fn unparseable_url_yields_default_config() {
        let config = parse_pool_config("not a url");
        assert_eq!(config.min_pool_size, None);
    }

    #[test]
    fn non_numeric_value_is_left_none() {
        let config = parse_pool_config("mongodb://localhost/db?maxPoolSize=notanumber");
        assert_eq!(config.max_pool_size, None);
    }
}
