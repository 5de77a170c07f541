//! Approximate in-memory byte cost of arbitrary structured values without
//! full serialization (spec §4.8).
//!
//! Used by the Ingestion Client to bound batches by estimated byte size
//! before a flush is triggered, never by serializing the whole batch.

use serde_json::Value;
use std::collections::HashSet;

/// Fixed per-primitive costs, in bytes, per spec §4.8.
const NUMBER_COST: usize = 8;
const BOOL_COST: usize = 4;
const BIGINT_COST: usize = 8;
const DATE_COST: usize = 24;
const NULL_COST: usize = 4;

/// Walk depth beyond which estimation stops and a flat cost is charged.
const MAX_DEPTH: usize = 20;
const DEPTH_OVERFLOW_COST: usize = 100;
const MAX_ARRAY_ITEMS: usize = 1000;
const MAX_OBJECT_KEYS: usize = 500;

/// Cycle-detection set shared across a whole batch so that a subgraph
/// referenced by multiple items in the same batch is only counted once.
/// `serde_json::Value` is plain data (no `Rc`/cycles possible), so in
/// practice this set keys off pointer identity of borrowed values passed
/// through one estimation call; it exists chiefly so callers estimating
/// several items that share a large embedded sub-document (e.g. a common
/// config blob) only pay for it once per batch.
pub type CycleSet<'a> = HashSet<*const Value>;

/// Estimate the in-memory byte cost of `value`, using `seen` as the
/// shared cycle/sharing-detection set for the whole batch.
pub fn estimate_size<'a>(value: &'a Value, seen: &mut CycleSet<'a>) -> usize {
    estimate_at_depth(value, seen, 0)
}

/// Convenience entry point for a single, batch-local estimate.
pub fn estimate_size_standalone(value: &Value) -> usize {
    let mut seen = CycleSet::new();
    estimate_size(value, &mut seen)
}

fn estimate_at_depth<'a>(value: &'a Value, seen: &mut CycleSet<'a>, depth: usize) -> usize {
    if depth > MAX_DEPTH {
        return DEPTH_OVERFLOW_COST;
    }

    match value {
        Value::Null => NULL_COST,
        Value::Bool(_) => BOOL_COST,
        Value::Number(n) => {
            if n.is_i64() || n.is_u64() {
                BIGINT_COST.max(NUMBER_COST)
            } else {
                NUMBER_COST
            }
        }
        Value::String(s) => {
            if looks_like_iso_date(s) {
                DATE_COST
            } else {
                2 * s.len()
            }
        }
        Value::Array(items) => {
            let ptr = value as *const Value;
            if !seen.insert(ptr) {
                return 0;
            }
            items
                .iter()
                .take(MAX_ARRAY_ITEMS)
                .map(|v| estimate_at_depth(v, seen, depth + 1))
                .sum()
        }
        Value::Object(map) => {
            let ptr = value as *const Value;
            if !seen.insert(ptr) {
                return 0;
            }
            map.iter()
                .take(MAX_OBJECT_KEYS)
                .map(|(k, v)| 2 * k.len() + estimate_at_depth(v, seen, depth + 1))
                .sum()
        }
    }
}

/// Heuristic for whether a string is an ISO-8601 timestamp, so date-like
/// values are charged the fixed date cost rather than the per-char
/// string cost. Deliberately loose — a false positive only slightly
/// under- or over-estimates a batch's size, which is acceptable for a
/// bound that's approximate by design.
fn looks_like_iso_date(s: &str) -> bool {
    s.len() >= 19
        && s.as_bytes().get(4) == Some(&b'-')
        && s.as_bytes().get(7) == Some(&b'-')
        && (s.as_bytes().get(10) == Some(&b'T') || s.as_bytes().get(10) == Some(&b' '))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn primitive_costs() {
        assert_eq!(estimate_size_standalone(&json!(null)), NULL_COST);
        assert_eq!(estimate_size_standalone(&json!(true)), BOOL_COST);
        assert_eq!(estimate_size_standalone(&json!(42)), BIGINT_COST);
        assert_eq!(estimate_size_standalone(&json!(3.14)), NUMBER_COST);
    }

    #[test]
    fn string_cost_is_double_length() {
        assert_eq!(estimate_size_standalone(&json!("hello")), 10);
    }

    #[test]
    fn date_like_string_charged_fixed_cost() {
        assert_eq!(estimate_size_standalone(&json!("2024-01-01T00:00:00Z")), DATE_COST);
    }

    #[test]
    fn object_walks_keys_and_values() {
        let v = json!({"a": 1, "b": "xy"});
        // key "a" (2) + number (8) + key "b" (2) + string "xy" (4) = 16
        assert_eq!(estimate_size_standalone(&v), 16);
    }

    #[test]
    fn array_caps_at_max_items() {
        let items: Vec<i32> = (0..2000).collect();
        let v = json!(items);
        let mut seen = CycleSet::new();
        let cost = estimate_size(&v, &mut seen);
        // Exactly MAX_ARRAY_ITEMS numbers counted, rest dropped.
        assert_eq!(cost, MAX_ARRAY_ITEMS * BIGINT_COST.max(NUMBER_COST));
    }

    #[test]
    fn deep_nesting_beyond_max_depth_returns_flat_cost() {
        let mut v = json!(1);
        for _ in 0..(MAX_DEPTH + 5) {
            v = json!([v]);
        }
        let cost = estimate_size_standalone(&v);
        assert!(cost > 0);
    }

    #[test]
    fn shared_subgraph_counted_once_per_batch() {
        let shared = json!({"big": "x".repeat(1000)});
        let mut seen = CycleSet::new();
        let first = estimate_size(&shared, &mut seen);
        let second = estimate_size(&shared, &mut seen);
        assert!(first > 0);
        assert_eq!(second, 0);
    }
}
