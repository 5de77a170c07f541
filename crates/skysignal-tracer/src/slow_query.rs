//! Slow-query issue-flag classification (spec §4.2).
//!
//! Severity (`CRITICAL`/`HIGH`/`MEDIUM`/`LOW`) lives on an absolute scale
//! in `skysignal_types::trace::SlowQuerySeverity` and always reflects the
//! operation's raw duration. The independent issue flags computed here
//! only run at all once a `db` operation clears [`Tracer`]'s configured
//! slow-query threshold (default 1000ms) — below that threshold a `db`
//! operation carries no [`SlowQueryAnalysis`], regardless of how its
//! duration would classify on the absolute scale.
//!
//! [`Tracer`]: crate::tracer::Tracer

use crate::normalize::{contains_key_within_depth, ISSUE_SCAN_DEPTH};
use serde_json::Value;
use skysignal_types::{SlowQueryAnalysis, SlowQueryIssue, SlowQuerySeverity};

/// Default threshold (ms) above which a `db` operation is considered
/// "slow" and gets issue-flag classification at all. Not part of the
/// external configuration surface (spec §6 enumerates it exhaustively
/// and omits this knob); kept as a `Tracer`-internal constant.
pub const DEFAULT_SLOW_QUERY_THRESHOLD_MS: f64 = 1000.0;

/// Build the full [`SlowQueryAnalysis`] for a slow `db` operation: the
/// absolute-scale severity plus every issue flag the raw selector and
/// duration trip.
pub fn analyze(selector: &Value, duration_ms: f64) -> SlowQueryAnalysis {
    let severity = SlowQuerySeverity::classify(duration_ms);
    let issues = classify_issues(selector, duration_ms);
    SlowQueryAnalysis::new(severity, issues)
}

/// Independent issue flags for a slow operation; more than one may apply.
pub fn classify_issues(selector: &Value, duration_ms: f64) -> Vec<SlowQueryIssue> {
    let mut issues = Vec::new();

    if duration_ms > 500.0 {
        issues.push(SlowQueryIssue::MissingIndex);
    } else if (200.0..=500.0).contains(&duration_ms) {
        issues.push(SlowQueryIssue::SuboptimalIndex);
    }

    if is_collection_scan(selector) {
        issues.push(SlowQueryIssue::CollectionScan);
    }

    if selector.as_object().map(|m| m.len() > 2).unwrap_or(false) {
        issues.push(SlowQueryIssue::ComplexQuery);
    }

    if contains_key_within_depth(selector, "$regex", ISSUE_SCAN_DEPTH) {
        issues.push(SlowQueryIssue::RegexQuery);
    }

    if contains_key_within_depth(selector, "$where", ISSUE_SCAN_DEPTH)
        || contains_key_within_depth(selector, "$expr", ISSUE_SCAN_DEPTH)
    {
        issues.push(SlowQueryIssue::ComplexOperator);
    }

    issues
}

fn is_collection_scan(selector: &Value) -> bool {
    match selector {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_selector_flags_collection_scan() {
        let issues = classify_issues(&json!({}), 50.0);
        assert!(issues.contains(&SlowQueryIssue::CollectionScan));
    }

    #[test]
    fn null_selector_flags_collection_scan() {
        let issues = classify_issues(&Value::Null, 50.0);
        assert!(issues.contains(&SlowQueryIssue::CollectionScan));
    }

    #[test]
    fn more_than_two_keys_flags_complex_query() {
        let issues = classify_issues(&json!({"a": 1, "b": 2, "c": 3}), 50.0);
        assert!(issues.contains(&SlowQueryIssue::ComplexQuery));
    }

    #[test]
    fn duration_over_500_flags_missing_index() {
        let issues = classify_issues(&json!({"a": 1}), 600.0);
        assert!(issues.contains(&SlowQueryIssue::MissingIndex));
        assert!(!issues.contains(&SlowQueryIssue::SuboptimalIndex));
    }

    #[test]
    fn duration_in_suboptimal_band_flags_suboptimal_index() {
        let issues = classify_issues(&json!({"a": 1}), 300.0);
        assert!(issues.contains(&SlowQueryIssue::SuboptimalIndex));
        assert!(!issues.contains(&SlowQueryIssue::MissingIndex));
    }

    #[test]
    fn where_operator_flags_complex_operator() {
        let issues = classify_issues(&json!({"$where": "this.a > 1"}), 50.0);
        assert!(issues.contains(&SlowQueryIssue::ComplexOperator));
    }

    #[test]
    fn multiple_issues_can_combine() {
        let issues = classify_issues(&json!({"a": 1, "b": 2, "c": 3}), 800.0);
        assert!(issues.contains(&SlowQueryIssue::MissingIndex));
        assert!(issues.contains(&SlowQueryIssue::ComplexQuery));
    }

    #[test]
    fn analyze_joins_recommendations() {
        let analysis = analyze(&json!({}), 1200.0);
        assert_eq!(analysis.severity, SlowQuerySeverity::Critical);
        assert!(analysis.recommendation.contains("collection scan"));
    }
}
