//! Query selector normalization and fingerprinting (spec §3, §4.2).
//!
//! Normalization replaces every leaf value with `"?"` while preserving
//! object keys (including `$operator` keys) and array shape, depth-limited
//! so a pathological selector can't make this walk unbounded.

use serde_json::Value;

/// Recursion depth beyond which a subtree collapses to `"?"` outright.
const MAX_NORMALIZE_DEPTH: usize = 6;

/// Recursion depth within which `$regex`/`$where`/`$expr` presence is
/// still checked for slow-query issue classification.
pub const ISSUE_SCAN_DEPTH: usize = 3;

/// Normalize a selector tree: every leaf becomes `"?"`, object keys and
/// array shape are preserved, walk stops at [`MAX_NORMALIZE_DEPTH`].
pub fn normalize(value: &Value) -> Value {
    normalize_at_depth(value, 0)
}

fn normalize_at_depth(value: &Value, depth: usize) -> Value {
    if depth >= MAX_NORMALIZE_DEPTH {
        return Value::String("?".to_string());
    }
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), normalize_at_depth(v, depth + 1)))
                .collect(),
        ),
        Value::Array(items) => {
            if items.iter().any(|v| v.is_object() || v.is_array()) {
                Value::Array(items.iter().map(|v| normalize_at_depth(v, depth + 1)).collect())
            } else {
                Value::String("?".to_string())
            }
        }
        _ => Value::String("?".to_string()),
    }
}

/// Build the fingerprint key `"<collection>.<operation>::<normalized-json>"`
/// and the normalized selector value itself. Falls back to
/// `"<collection>.<operation>"` if the normalized value can't be
/// serialized (never expected in practice, since normalization only
/// produces strings/objects/arrays, but kept for parity with the source
/// behavior this is grounded on).
pub fn fingerprint_key(collection: &str, operation: &str, selector: &Value) -> (String, Value) {
    let normalized = normalize(selector);
    let key = match serde_json::to_string(&normalized) {
        Ok(json) => format!("{collection}.{operation}::{json}"),
        Err(_) => format!("{collection}.{operation}"),
    };
    (key, normalized)
}

/// True if `target` key is present anywhere within `max_depth` levels of
/// `value` (used for `$regex`/`$where`/`$expr` detection).
pub fn contains_key_within_depth(value: &Value, target: &str, max_depth: usize) -> bool {
    fn walk(value: &Value, target: &str, depth: usize, max_depth: usize) -> bool {
        if depth > max_depth {
            return false;
        }
        match value {
            Value::Object(map) => map
                .iter()
                .any(|(k, v)| k == target || walk(v, target, depth + 1, max_depth)),
            Value::Array(items) => items.iter().any(|v| walk(v, target, depth + 1, max_depth)),
            _ => false,
        }
    }
    walk(value, target, 0, max_depth)
}
