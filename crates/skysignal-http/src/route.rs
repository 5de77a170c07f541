//! Route normalization (spec §4.5): prefer the host router's own
//! matched-route template; fall back to precompiled segment regexes.

use once_cell::sync::Lazy;
use regex::Regex;

static HEX24: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[0-9a-fA-F]{24}$").unwrap());
static UUID: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}$").unwrap()
});
static NUMERIC: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[0-9]+$").unwrap());

/// Normalize `path` into a route template, preferring `matched_path`
/// (the host router's own route string, e.g. from axum's `MatchedPath`
/// extractor) when available.
pub fn normalize_route(path: &str, matched_path: Option<&str>) -> String {
    if let Some(matched) = matched_path {
        return matched.to_string();
    }

    if looks_like_static_file(path) {
        return path.to_string();
    }

    path.split('/')
        .map(|segment| {
            if segment.is_empty() {
                segment.to_string()
            } else if HEX24.is_match(segment) {
                ":id".to_string()
            } else if UUID.is_match(segment) {
                ":uuid".to_string()
            } else if NUMERIC.is_match(segment) {
                ":id".to_string()
            } else {
                segment.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}

fn looks_like_static_file(path: &str) -> bool {
    matches!(
        path.rsplit('.').next(),
        Some("js" | "css" | "png" | "jpg" | "jpeg" | "gif" | "svg" | "ico" | "woff" | "woff2" | "map")
    ) && path.contains('.')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefers_host_matched_path() {
        assert_eq!(normalize_route("/users/123", Some("/users/:id")), "/users/:id");
    }

    #[test]
    fn mongo_object_id_segment_normalizes_to_id() {
        assert_eq!(normalize_route("/posts/507f1f77bcf86cd799439011", None), "/posts/:id");
    }

    #[test]
    fn uuid_segment_normalizes_to_uuid() {
        assert_eq!(normalize_route("/sessions/550e8400-e29b-41d4-a716-446655440000", None), "/sessions/:uuid");
    }

    #[test]
    fn numeric_segment_normalizes_to_id() {
        assert_eq!(normalize_route("/orders/42", None), "/orders/:id");
    }

    #[test]
    fn static_file_path_passes_through_unchanged() {
        assert_eq!(normalize_route("/assets/app.js", None), "/assets/app.js");
    }

    #[test]
    fn non_matching_segments_are_preserved() {
        assert_eq!(normalize_route("/api/health", None), "/api/health");
    }
}
