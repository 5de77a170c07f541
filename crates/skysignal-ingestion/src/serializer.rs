//! Cycle-tolerant serialization (spec §4.1, §7, §8 property 5).
//!
//! `serde_json::Value` is a tree and cannot itself contain a reference
//! cycle — Rust's ownership rules forbid it. Host-supplied values that
//! *can* alias (a struct graph built with shared, possibly
//! self-referential handles before being handed to the agent) are
//! represented here as [`DynValue`], whose `Array`/`Object` variants are
//! `Rc<RefCell<_>>`-backed and can legitimately cycle. [`to_value`] walks
//! a `DynValue` tree once, substituting the literal token `"[Circular]"`
//! at any position that revisits an already-open container, then hands
//! back a plain acyclic `serde_json::Value` that normal `serde_json`
//! serialization can handle without ever risking infinite recursion.

use serde_json::Value;
use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;

/// A structured value that may contain reference cycles, unlike
/// `serde_json::Value`. Built by callers that assemble host-originated
/// object graphs (e.g. a method argument that aliases another argument).
#[derive(Clone)]
pub enum DynValue {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Array(Rc<RefCell<Vec<DynValue>>>),
    Object(Rc<RefCell<Vec<(String, DynValue)>>>),
}

impl DynValue {
    pub fn array(items: Vec<DynValue>) -> Self {
        Self::Array(Rc::new(RefCell::new(items)))
    }

    pub fn object(fields: Vec<(String, DynValue)>) -> Self {
        Self::Object(Rc::new(RefCell::new(fields)))
    }
}

/// Literal substituted for an already-visited container.
pub const CIRCULAR_TOKEN: &str = "[Circular]";

/// Convert a (possibly cyclic) [`DynValue`] into a plain acyclic
/// [`serde_json::Value`], replacing any revisited container with
/// [`CIRCULAR_TOKEN`].
pub fn to_value(value: &DynValue) -> Value {
    let mut seen: HashSet<usize> = HashSet::new();
    to_value_inner(value, &mut seen)
}

fn to_value_inner(value: &DynValue, seen: &mut HashSet<usize>) -> Value {
    match value {
        DynValue::Null => Value::Null,
        DynValue::Bool(b) => Value::Bool(*b),
        DynValue::Number(n) => serde_json::Number::from_f64(*n)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        DynValue::String(s) => Value::String(s.clone()),
        DynValue::Array(rc) => {
            let ptr = Rc::as_ptr(rc) as usize;
            if !seen.insert(ptr) {
                return Value::String(CIRCULAR_TOKEN.to_string());
            }
            let items = rc
                .borrow()
                .iter()
                .map(|v| to_value_inner(v, seen))
                .collect();
            seen.remove(&ptr);
            Value::Array(items)
        }
        DynValue::Object(rc) => {
            let ptr = Rc::as_ptr(rc) as usize;
            if !seen.insert(ptr) {
                return Value::String(CIRCULAR_TOKEN.to_string());
            }
            let map = rc
                .borrow()
                .iter()
                .map(|(k, v)| (k.clone(), to_value_inner(v, seen)))
                .collect();
            seen.remove(&ptr);
            Value::Object(map)
        }
    }
}

/// Serialize an envelope `{payload_key: items}` to bytes, returning
/// `Err` only for genuine `serde_json` failures (e.g. a non-finite
/// float elsewhere in the tree) — cycles are already handled upstream by
/// [`to_value`] and never reach this step as a real cycle.
pub fn serialize_envelope(payload_key: &str, items: &[Box<Value>]) -> serde_json::Result<Vec<u8>> {
    let values: Vec<Value> = items.iter().map(|v| (**v).clone()).collect();
    let mut map = serde_json::Map::new();
    map.insert(payload_key.to_string(), Value::Array(values));
    serde_json::to_vec(&Value::Object(map))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn self_referencing_object_produces_one_circular_marker() {
        let obj = DynValue::object(vec![]);
        if let DynValue::Object(rc) = &obj {
            rc.borrow_mut().push(("self".to_string(), obj.clone()));
        }
        let wrapper = DynValue::object(vec![("a".to_string(), obj)]);
        let value = to_value(&wrapper);
        let text = serde_json::to_string(&value).unwrap();
        assert_eq!(text.matches(CIRCULAR_TOKEN).count(), 1);
        // Must still be well-formed JSON.
        let _: Value = serde_json::from_str(&text).unwrap();
    }

    #[test]
    fn acyclic_value_roundtrips_without_markers() {
        let v = DynValue::object(vec![
            ("name".to_string(), DynValue::String("trace".to_string())),
            ("count".to_string(), DynValue::Number(5.0)),
        ]);
        let value = to_value(&v);
        assert!(!serde_json::to_string(&value).unwrap().contains(CIRCULAR_TOKEN));
    }

    #[test]
    fn shared_non_cyclic_reference_is_not_flagged_circular() {
        let shared = DynValue::array(vec![DynValue::Number(1.0)]);
        let wrapper = DynValue::object(vec![
            ("a".to_string(), shared.clone()),
            ("b".to_string(), shared),
        ]);
        let value = to_value(&wrapper);
        assert!(!serde_json::to_string(&value).unwrap().contains(CIRCULAR_TOKEN));
    }

    #[test]
    fn envelope_serializes_with_payload_key() {
        let items = vec![Box::new(serde_json::json!({"a": 1}))];
        let bytes = serialize_envelope("traces", &items).unwrap();
        let parsed: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(parsed["traces"][0]["a"], Value::from(1));
    }
}
