//! The Request Middleware `tower` layer (spec §4.5): times and samples
//! inbound requests not excluded by the combined exclude pattern, and
//! enqueues a captured record on the `httpRequests` stream.

use crate::pool::RequestRecordPool;
use crate::route::normalize_route;
use axum::body::Body;
use axum::extract::{ConnectInfo, MatchedPath};
use http::{Request, Response};
use rand::Rng;
use regex::Regex;
use skysignal_ingestion::IngestionClient;
use skysignal_types::{AgentConfig, HttpRequestRecord};
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;
use tower::{Layer, Service};

/// `tower` `Layer` that instruments inbound requests per spec §4.5.
#[derive(Clone)]
pub struct SkySignalHttpLayer {
    config: Arc<AgentConfig>,
    ingestion: Arc<IngestionClient>,
    pool: Arc<RequestRecordPool>,
    exclude: Arc<Option<Regex>>,
}

impl SkySignalHttpLayer {
    pub fn new(config: Arc<AgentConfig>, ingestion: Arc<IngestionClient>) -> Self {
        let exclude = build_combined_exclude(&config.http_exclude_patterns);
        Self { config, ingestion, pool: Arc::new(RequestRecordPool::new()), exclude: Arc::new(exclude) }
    }
}

/// Combine all exclude patterns into one alternation regex so matching
/// a request path is a single O(1)-ish test rather than N separate
/// regex evaluations (spec §4.5: "single combined regex").
fn build_combined_exclude(patterns: &[String]) -> Option<Regex> {
    if patterns.is_empty() {
        return None;
    }
    let combined = patterns.iter().map(|p| format!("(?:{p})")).collect::<Vec<_>>().join("|");
    Regex::new(&combined).ok()
}

impl<S> Layer<S> for SkySignalHttpLayer {
    type Service = SkySignalHttpService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        SkySignalHttpService {
            inner,
            config: Arc::clone(&self.config),
            ingestion: Arc::clone(&self.ingestion),
            pool: Arc::clone(&self.pool),
            exclude: Arc::clone(&self.exclude),
        }
    }
}

#[derive(Clone)]
pub struct SkySignalHttpService<S> {
    inner: S,
    config: Arc<AgentConfig>,
    ingestion: Arc<IngestionClient>,
    pool: Arc<RequestRecordPool>,
    exclude: Arc<Option<Regex>>,
}

impl<S> Service<Request<Body>> for SkySignalHttpService<S>
where
    S: Service<Request<Body>, Response = Response<Body>> + Clone + Send + 'static,
    S::Future: Send + 'static,
    S::Error: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request<Body>) -> Self::Future {
        let path = request.uri().path().to_string();
        let excluded = self.exclude.as_ref().as_ref().map(|re| re.is_match(&path)).unwrap_or(false);

        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        if excluded {
            return Box::pin(async move { inner.call(request).await });
        }

        let sampled = rand::thread_rng().gen::<f64>() < self.config.http_sample_rate;
        if !sampled {
            return Box::pin(async move { inner.call(request).await });
        }

        let method = request.method().to_string();
        let matched_path = request.extensions().get::<MatchedPath>().map(|m| m.as_str().to_string());
        let route = normalize_route(&path, matched_path.as_deref());
        let user_agent = header_string(&request, http::header::USER_AGENT);
        let referrer = header_string(&request, http::header::REFERER);
        let ip = extract_ip(&request);
        let start = Instant::now();

        let ingestion = Arc::clone(&self.ingestion);
        let pool = Arc::clone(&self.pool);

        Box::pin(async move {
            let response = inner.call(request).await?;
            let response_time_ms = start.elapsed().as_secs_f64() * 1000.0;
            let status_code = response.status().as_u16();
            let size_bytes = response
                .headers()
                .get(http::header::CONTENT_LENGTH)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(0);

            let record = HttpRequestRecord {
                timestamp_ms: chrono::Utc::now().timestamp_millis(),
                method,
                path,
                route,
                status_code,
                response_time_ms,
                size_bytes,
                user_id: None,
                ip,
                user_agent,
                referrer,
            };
            let record = pool.record(record);
            match serde_json::to_value(&record) {
                Ok(value) => ingestion.submit("httpRequests", value),
                Err(e) => tracing::warn!(error = %e, "failed to serialize http request record"),
            }

            Ok(response)
        })
    }
}

fn header_string<B>(request: &Request<B>, name: http::HeaderName) -> Option<String> {
    request.headers().get(name).and_then(|v| v.to_str().ok()).map(|s| s.to_string())
}

/// `X-Forwarded-For` (first hop) → `X-Real-IP` → the accepted socket's
/// address, if the host's router exposes `ConnectInfo` (spec §4.5).
fn extract_ip<B>(request: &Request<B>) -> Option<String> {
    if let Some(xff) = header_string(request, http::header::HeaderName::from_static("x-forwarded-for")) {
        if let Some(first) = xff.split(',').next() {
            return Some(first.trim().to_string());
        }
    }
    if let Some(real_ip) = header_string(request, http::header::HeaderName::from_static("x-real-ip")) {
        return Some(real_ip);
    }
    request.extensions().get::<ConnectInfo<SocketAddr>>().map(|c| c.0.ip().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn combined_exclude_matches_any_pattern() {
        let regex = build_combined_exclude(&["^/__skysignal__/".to_string(), "^/favicon.ico$".to_string()]).unwrap();
        assert!(regex.is_match("/__skysignal__/health"));
        assert!(regex.is_match("/favicon.ico"));
        assert!(!regex.is_match("/api/users"));
    }

    #[test]
    fn empty_patterns_yield_no_exclude_regex() {
        assert!(build_combined_exclude(&[]).is_none());
    }

    #[test]
    fn forwarded_for_header_prefers_first_hop() {
        let request = Request::builder()
            .uri("/")
            .header("x-forwarded-for", "203.0.113.7, 10.0.0.1")
            .body(Body::empty())
            .unwrap();
        assert_eq!(extract_ip(&request), Some("203.0.113.7".to_string()));
    }
}
