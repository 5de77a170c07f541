//! Argument sanitization and sensitive-key redaction (spec §4.2, §4.4).
//!
//! Two sanitizer profiles are offered — "default" and "db" — differing
//! only in their depth/array/string limits. Both redact values whose key
//! matches the sensitive-key predicate, grounded on the teacher's
//! `riptide_types::secrets::redact_secret` posture (never show the raw
//! value) and `riptide_api::middleware::pii_redaction`'s framing of
//! redaction as a middleware-level concern rather than a parser-level one.

use serde_json::Value;

/// Case-insensitive substrings that mark a key as sensitive (spec §4.2).
const SENSITIVE_SUBSTRINGS: &[&str] = &[
    "password",
    "secret",
    "token",
    "apikey",
    "api_key",
    "authorization",
    "cookie",
    "session",
    "credit_card",
    "ssn",
    "cvv",
    "private_key",
    "access_token",
    "bearer",
    "credentials",
    "refresh_token",
];

/// Token substituted for a sensitive value in sanitized arguments.
pub const REDACTED_TOKEN: &str = "<redacted>";

/// Token substituted for a sensitive value in sanitized selectors
/// (spec §4.4 — distinct literal from the argument sanitizer's token).
pub const REDACTED_SELECTOR_TOKEN: &str = "[REDACTED]";

/// True when `key` matches the sensitive-key predicate.
pub fn is_sensitive_key(key: &str) -> bool {
    let lower = key.to_ascii_lowercase();
    SENSITIVE_SUBSTRINGS.iter().any(|needle| lower.contains(needle))
}

/// Limits governing how deep/wide a sanitizer walks a value tree.
#[derive(Debug, Clone, Copy)]
pub struct SanitizeLimits {
    pub max_depth: usize,
    pub max_array_items: usize,
    pub max_object_keys: usize,
    pub max_string_len: usize,
}

impl SanitizeLimits {
    /// "default" profile: max depth 3, max 10 array items, max 50 object
    /// keys, string truncation at the caller-supplied `max_arg_length`.
    pub fn default_profile(max_arg_length: usize) -> Self {
        Self {
            max_depth: 3,
            max_array_items: 10,
            max_object_keys: 50,
            max_string_len: max_arg_length,
        }
    }

    /// "db" profile: max depth 5, max 20 array items, 500-char string
    /// truncation.
    pub fn db_profile() -> Self {
        Self {
            max_depth: 5,
            max_array_items: 20,
            max_object_keys: usize::MAX,
            max_string_len: 500,
        }
    }
}

/// Sanitize `value` under `limits`, redacting sensitive keys and mapping
/// non-primitive/non-plain values to string stand-ins.
///
/// Functions and regexes have no `serde_json::Value` representation — by
/// the time arguments reach this sanitizer they have already been
/// converted to `Value`, with a function becoming the string
/// `"<function>"` and a regex becoming its pattern string, mirroring the
/// teacher's "non-primitive non-plain values map to string stand-ins"
/// rule at the point those values enter JSON.
pub fn sanitize(value: &Value, limits: &SanitizeLimits) -> Value {
    sanitize_at_depth(value, limits, 0, None)
}

/// Sanitize an object's top-level fields, redacting any key that matches
/// the sensitive predicate using the argument-sanitizer token.
pub fn sanitize_object(value: &Value, limits: &SanitizeLimits) -> Value {
    sanitize_at_depth(value, limits, 0, None)
}

fn sanitize_at_depth(value: &Value, limits: &SanitizeLimits, depth: usize, key: Option<&str>) -> Value {
    if let Some(k) = key {
        if is_sensitive_key(k) {
            return Value::String(REDACTED_TOKEN.to_string());
        }
    }

    if depth >= limits.max_depth {
        return truncated_placeholder(value);
    }

    match value {
        Value::String(s) => {
            if s.chars().count() > limits.max_string_len {
                Value::String(format!(
                    "{}...",
                    s.chars().take(limits.max_string_len).collect::<String>()
                ))
            } else {
                Value::String(s.clone())
            }
        }
        Value::Array(items) => Value::Array(
            items
                .iter()
                .take(limits.max_array_items)
                .map(|v| sanitize_at_depth(v, limits, depth + 1, None))
                .collect(),
        ),
        Value::Object(map) => Value::Object(
            map.iter()
                .take(limits.max_object_keys)
                .map(|(k, v)| (k.clone(), sanitize_at_depth(v, limits, depth + 1, Some(k))))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Once max depth is reached, arrays/objects collapse to a placeholder
/// rather than being walked further; primitives pass through unchanged
/// since they carry no further nesting cost.
fn truncated_placeholder(value: &Value) -> Value {
    match value {
        Value::Array(items) => Value::String(format!("[Array({})]", items.len())),
        Value::Object(map) => Value::String(format!("[Object({})]", map.len())),
        other => other.clone(),
    }
}

/// Redact a selector's top-level keys that match the sensitive-key set,
/// but only when their value is truthy (spec §4.4) — e.g.
/// `{"password": ""}` is left alone, `{"password": "x"}` is redacted.
pub fn sanitize_selector(selector: &Value) -> Value {
    match selector {
        Value::Object(map) => {
            let redacted = map
                .iter()
                .map(|(k, v)| {
                    if is_sensitive_key(k) && is_truthy(v) {
                        (k.clone(), Value::String(REDACTED_SELECTOR_TOKEN.to_string()))
                    } else {
                        (k.clone(), v.clone())
                    }
                })
                .collect();
            Value::Object(redacted)
        }
        other => other.clone(),
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn sensitive_key_matching_is_case_insensitive_substring() {
        assert!(is_sensitive_key("Password"));
        assert!(is_sensitive_key("X-API-KEY".to_ascii_lowercase().as_str()));
        assert!(is_sensitive_key("userApiKey"));
        assert!(!is_sensitive_key("username"));
    }

    #[test]
    fn redacts_sensitive_keys_in_nested_objects() {
        let v = json!({
            "email": "a@b",
            "password": "pw",
            "nested": {"token": "t"}
        });
        let limits = SanitizeLimits::default_profile(1000);
        let sanitized = sanitize(&v, &limits);
        assert_eq!(sanitized["email"], json!("a@b"));
        assert_eq!(sanitized["password"], json!(REDACTED_TOKEN));
        assert_eq!(sanitized["nested"]["token"], json!(REDACTED_TOKEN));
    }

    #[test]
    fn truncates_long_strings_at_max_arg_length() {
        let v = json!("x".repeat(20));
        let limits = SanitizeLimits::default_profile(5);
        let sanitized = sanitize(&v, &limits);
        assert_eq!(sanitized, json!("xxxxx..."));
    }

    #[test]
    fn db_profile_truncates_at_500_chars() {
        let v = json!("y".repeat(600));
        let limits = SanitizeLimits::db_profile();
        let sanitized = sanitize(&v, &limits);
        let s = sanitized.as_str().unwrap();
        assert_eq!(s.len(), 503); // 500 chars + "..."
    }

    #[test]
    fn array_capped_at_max_items() {
        let v = json!((0..30).collect::<Vec<_>>());
        let limits = SanitizeLimits::default_profile(1000);
        let sanitized = sanitize(&v, &limits);
        assert_eq!(sanitized.as_array().unwrap().len(), 10);
    }

    #[test]
    fn depth_limit_collapses_deep_structures() {
        let v = json!({"a": {"b": {"c": {"d": {"e": "too deep"}}}}});
        let limits = SanitizeLimits::default_profile(1000);
        let sanitized = sanitize(&v, &limits);
        // depth 3 is max; "d" key's value collapses to a placeholder
        assert!(sanitized["a"]["b"]["c"].is_string() || sanitized["a"]["b"]["c"].is_object());
    }

    #[test]
    fn selector_redaction_only_applies_to_truthy_values() {
        let v = json!({"password": "", "token": "abc"});
        let sanitized = sanitize_selector(&v);
        assert_eq!(sanitized["password"], json!(""));
        assert_eq!(sanitized["token"], json!(REDACTED_SELECTOR_TOKEN));
    }
}
