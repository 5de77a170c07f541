//! Trace data model — spec §3.
//!
//! A [`Trace`] records one host-method invocation from entry to exit.
//! Its `operations` list is append-only during the method's lifetime and
//! frozen once [`Trace::seal`] (conceptually; sealing itself happens in
//! `skysignal-tracer`, this module only defines the frozen shape).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Outcome of a traced method invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Ok,
    Error,
}

/// Severity assigned to a slow `db` operation. Ordered so that
/// `severity(d1) >= severity(d2)` whenever `d1 >= d2` (spec §8 property 8).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SlowQuerySeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl SlowQuerySeverity {
    /// Classify a duration in milliseconds into a severity per spec §4.2:
    /// CRITICAL >= 1000ms, HIGH >= 500ms, MEDIUM >= 200ms, else LOW.
    pub fn classify(duration_ms: f64) -> Self {
        if duration_ms >= 1000.0 {
            Self::Critical
        } else if duration_ms >= 500.0 {
            Self::High
        } else if duration_ms >= 200.0 {
            Self::Medium
        } else {
            Self::Low
        }
    }
}

/// Independent issue flags raised alongside a severity, per spec §4.2.
/// More than one may apply to the same operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SlowQueryIssue {
    MissingIndex,
    SuboptimalIndex,
    CollectionScan,
    ComplexQuery,
    RegexQuery,
    ComplexOperator,
}

impl SlowQueryIssue {
    /// Canned recommendation text for this issue, joined across all
    /// flags raised for one operation.
    pub fn recommendation(self) -> &'static str {
        match self {
            Self::MissingIndex => "add an index covering this query's selector",
            Self::SuboptimalIndex => "review the existing index for selectivity",
            Self::CollectionScan => "selector is empty or null; this is a full collection scan",
            Self::ComplexQuery => "selector has more than 2 keys; consider a compound index",
            Self::RegexQuery => "regex selectors cannot use a standard index prefix efficiently",
            Self::ComplexOperator => "$where/$expr prevent index usage; rewrite with plain operators",
        }
    }
}

/// Analysis attached to a slow `db` operation (duration >= threshold).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlowQueryAnalysis {
    pub severity: SlowQuerySeverity,
    pub issues: Vec<SlowQueryIssue>,
    pub recommendation: String,
}

impl SlowQueryAnalysis {
    /// Join all issue recommendations into one string.
    pub fn new(severity: SlowQuerySeverity, issues: Vec<SlowQueryIssue>) -> Self {
        let recommendation = issues
            .iter()
            .map(|i| i.recommendation())
            .collect::<Vec<_>>()
            .join("; ");
        Self {
            severity,
            issues,
            recommendation,
        }
    }
}

/// Suggestion keyed by db operation kind for an N+1 pattern, per spec §4.2.
pub fn nplusone_suggestion(operation: &str) -> &'static str {
    match operation {
        "findOne" | "findOneAsync" => "batch these lookups with a single $in query",
        "find" => "replace per-row finds with a single $lookup aggregation",
        "update" | "remove" => "batch the operation instead of issuing one per item",
        _ => "consolidate these calls with a single aggregation",
    }
}

/// One observable sub-step within a [`Trace`].
///
/// Every operation carries a `time_offset_ms` relative to the trace's
/// start. The `db` variant additionally carries fingerprinting and
/// optional slow-query analysis inputs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Operation {
    Db {
        time_offset_ms: f64,
        collection: String,
        operation: String,
        selector_normalized: serde_json::Value,
        duration_ms: f64,
        explain: Option<serde_json::Value>,
        slow_query: Option<SlowQueryAnalysis>,
        /// Sanitized call arguments, captured only when `traceMethodArguments`
        /// is enabled. Already redacted before the operation is recorded.
        #[serde(default)]
        arguments: Option<serde_json::Value>,
    },
    Wait {
        time_offset_ms: f64,
        label: String,
        duration_ms: f64,
        #[serde(default)]
        arguments: Option<serde_json::Value>,
    },
    Compute {
        time_offset_ms: f64,
        label: String,
        duration_ms: f64,
        #[serde(default)]
        arguments: Option<serde_json::Value>,
    },
    Async {
        time_offset_ms: f64,
        label: String,
        duration_ms: f64,
        error: Option<String>,
        #[serde(default)]
        arguments: Option<serde_json::Value>,
    },
}

impl Operation {
    /// Duration of this operation in milliseconds, regardless of variant.
    pub fn duration_ms(&self) -> f64 {
        match self {
            Self::Db { duration_ms, .. }
            | Self::Wait { duration_ms, .. }
            | Self::Compute { duration_ms, .. }
            | Self::Async { duration_ms, .. } => *duration_ms,
        }
    }

    /// Offset of this operation relative to the trace start.
    pub fn time_offset_ms(&self) -> f64 {
        match self {
            Self::Db { time_offset_ms, .. }
            | Self::Wait { time_offset_ms, .. }
            | Self::Compute { time_offset_ms, .. }
            | Self::Async { time_offset_ms, .. } => *time_offset_ms,
        }
    }

    /// Sanitized call arguments attached to this operation, if captured.
    pub fn arguments(&self) -> Option<&serde_json::Value> {
        match self {
            Self::Db { arguments, .. }
            | Self::Wait { arguments, .. }
            | Self::Compute { arguments, .. }
            | Self::Async { arguments, .. } => arguments.as_ref(),
        }
    }
}

/// Per-trace aggregate keyed by `collection.operation::selector-shape`,
/// used to detect N+1 patterns (spec §3, §4.2).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryFingerprint {
    pub key: String,
    pub collection: String,
    pub operation: String,
    pub count: u32,
    pub total_duration_ms: f64,
    /// First up to 3 sample operations with this fingerprint.
    pub samples: Vec<Operation>,
}

impl QueryFingerprint {
    pub fn new(key: String, collection: String, operation: String) -> Self {
        Self {
            key,
            collection,
            operation,
            count: 0,
            total_duration_ms: 0.0,
            samples: Vec::new(),
        }
    }

    /// Record one more occurrence, capping the sample list at 3.
    pub fn record(&mut self, op: Operation) {
        self.count += 1;
        self.total_duration_ms += op.duration_ms();
        if self.samples.len() < 3 {
            self.samples.push(op);
        }
    }
}

/// An emitted N+1 pattern record (spec §3, §4.2).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NPlusOnePattern {
    pub collection: String,
    pub operation: String,
    pub count: u32,
    pub total_duration_ms: f64,
    pub samples: Vec<Operation>,
    pub suggestion: String,
}

/// N+1 detection thresholds from spec §3: count >= 5 and total duration
/// >= 2ms.
pub const NPLUSONE_MIN_COUNT: u32 = 5;
pub const NPLUSONE_MIN_DURATION_MS: f64 = 2.0;

/// Run N+1 analysis across a trace's fingerprints, sorted by descending
/// total duration (spec §4.2).
pub fn detect_nplusone(fingerprints: &HashMap<String, QueryFingerprint>) -> Vec<NPlusOnePattern> {
    let mut patterns: Vec<NPlusOnePattern> = fingerprints
        .values()
        .filter(|fp| fp.count >= NPLUSONE_MIN_COUNT && fp.total_duration_ms >= NPLUSONE_MIN_DURATION_MS)
        .map(|fp| NPlusOnePattern {
            collection: fp.collection.clone(),
            operation: fp.operation.clone(),
            count: fp.count,
            total_duration_ms: fp.total_duration_ms,
            samples: fp.samples.clone(),
            suggestion: nplusone_suggestion(&fp.operation).to_string(),
        })
        .collect();
    patterns.sort_by(|a, b| b.total_duration_ms.partial_cmp(&a.total_duration_ms).unwrap());
    patterns
}

/// Recommendation strength for an [`UnblockImpact`] annotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum UnblockRecommendation {
    None,
    Low,
    Medium,
    High,
}

/// Optional annotation recording whether/when the host's "unblock" hook
/// was called, and how costly its absence (or lateness) was (spec §4.2).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnblockImpact {
    pub called: bool,
    pub offset_ms: Option<f64>,
    pub impact_score: u8,
    pub recommendation: UnblockRecommendation,
}

impl UnblockImpact {
    /// Score 0-10 from blocking time, whether other tasks waited on this
    /// one, and total duration. HIGH recommendation when score >= 7.
    pub fn score(blocking_time_ms: f64, waited_on_by_other_tasks: bool, total_duration_ms: f64) -> Self {
        let ratio = if total_duration_ms > 0.0 {
            (blocking_time_ms / total_duration_ms).clamp(0.0, 1.0)
        } else {
            0.0
        };
        let mut score = (ratio * 10.0).round() as u8;
        if waited_on_by_other_tasks {
            score = score.saturating_add(2).min(10);
        }
        let recommendation = match score {
            0..=2 => UnblockRecommendation::None,
            3..=5 => UnblockRecommendation::Low,
            6 => UnblockRecommendation::Medium,
            _ => UnblockRecommendation::High,
        };
        Self {
            called: false,
            offset_ms: None,
            impact_score: score,
            recommendation,
        }
    }
}

/// One complete host-method invocation record, ready for shipping on the
/// `traces` stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trace {
    pub method_name: String,
    pub start_time_ms: i64,
    pub duration_ms: f64,
    pub user_id: Option<String>,
    pub session_id: Option<String>,
    pub outcome: Outcome,
    pub error_summary: Option<String>,
    pub operations: Vec<Operation>,
    pub slow_queries: Vec<SlowQueryAnalysis>,
    pub nplusone_patterns: Vec<NPlusOnePattern>,
    pub unblock_impact: Option<UnblockImpact>,
    pub app_version: Option<String>,
    pub build_hash: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_monotonic_in_duration() {
        let pairs = [(1000.0, 999.0), (500.0, 499.0), (200.0, 199.0), (50.0, 10.0)];
        for (d1, d2) in pairs {
            assert!(SlowQuerySeverity::classify(d1) >= SlowQuerySeverity::classify(d2));
        }
    }

    #[test]
    fn severity_boundaries() {
        assert_eq!(SlowQuerySeverity::classify(1000.0), SlowQuerySeverity::Critical);
        assert_eq!(SlowQuerySeverity::classify(500.0), SlowQuerySeverity::High);
        assert_eq!(SlowQuerySeverity::classify(200.0), SlowQuerySeverity::Medium);
        assert_eq!(SlowQuerySeverity::classify(199.9), SlowQuerySeverity::Low);
    }

    #[test]
    fn nplusone_detection_law() {
        let mut fps = HashMap::new();
        let mut fp = QueryFingerprint::new("posts.findOne::?".into(), "posts".into(), "findOne".into());
        for _ in 0..5 {
            fp.record(Operation::Db {
                time_offset_ms: 0.0,
                collection: "posts".into(),
                operation: "findOne".into(),
                selector_normalized: serde_json::json!({"_id": "?"}),
                duration_ms: 1.0,
                explain: None,
                slow_query: None,
                arguments: None,
            });
        }
        fps.insert(fp.key.clone(), fp);
        let patterns = detect_nplusone(&fps);
        assert_eq!(patterns.len(), 1);
        assert_eq!(patterns[0].count, 5);
        assert!(patterns[0].suggestion.contains("$in"));
    }

    #[test]
    fn below_threshold_produces_no_pattern() {
        let mut fps = HashMap::new();
        let mut fp = QueryFingerprint::new("posts.findOne::?".into(), "posts".into(), "findOne".into());
        for _ in 0..4 {
            fp.record(Operation::Db {
                time_offset_ms: 0.0,
                collection: "posts".into(),
                operation: "findOne".into(),
                selector_normalized: serde_json::json!({"_id": "?"}),
                duration_ms: 1.0,
                explain: None,
                slow_query: None,
                arguments: None,
            });
        }
        fps.insert(fp.key.clone(), fp);
        assert!(detect_nplusone(&fps).is_empty());
    }

    #[test]
    fn unblock_impact_high_when_blocking_ratio_and_waiters() {
        let impact = UnblockImpact::score(9.0, true, 10.0);
        assert_eq!(impact.recommendation, UnblockRecommendation::High);
    }

    #[test]
    fn unblock_impact_none_for_negligible_blocking() {
        let impact = UnblockImpact::score(0.1, false, 100.0);
        assert_eq!(impact.recommendation, UnblockRecommendation::None);
    }
}
