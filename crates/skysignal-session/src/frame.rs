//! Cheap message-type extraction and control-frame parsing (spec §4.6).

use serde::Deserialize;
use serde_json::Value;

/// Scan `raw` for the literal `"msg":"..."` token without a full
/// deserialize (spec §4.6: "extracts message type ... when possible").
pub fn extract_msg_type(raw: &str) -> Option<String> {
    let key_pos = raw.find("\"msg\"")?;
    let after_key = &raw[key_pos + 5..];
    let colon_pos = after_key.find(':')?;
    let after_colon = after_key[colon_pos + 1..].trim_start();
    let rest = after_colon.strip_prefix('"')?;
    let end = rest.find('"')?;
    Some(rest[..end].to_string())
}

/// Known control frames that require structured data beyond their
/// `msg` type (spec §4.6).
#[derive(Debug, Clone, PartialEq)]
pub enum ControlFrame {
    Sub { id: String, name: String, params: Value },
    Unsub { id: String },
    Ready { subs: Vec<String> },
    NoSub { id: String, error: Option<String> },
    Added { id: String, collection: String },
    Changed { id: String, collection: String },
    Removed { id: String, collection: String },
    Ping { id: Option<String> },
    Pong { id: Option<String> },
}

#[derive(Deserialize)]
struct RawFrame {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    collection: Option<String>,
    #[serde(default)]
    params: Option<Value>,
    #[serde(default)]
    subs: Option<Vec<String>>,
    #[serde(default)]
    error: Option<Value>,
}

/// Deserialize `raw` into a [`ControlFrame`] when `msg_type` names one
/// of the structured control frames; cheap message types (`method`,
/// `result`, etc.) are left to [`extract_msg_type`] alone.
pub fn parse_control_frame(msg_type: &str, raw: &str) -> Option<ControlFrame> {
    let parsed: RawFrame = serde_json::from_str(raw).ok()?;
    match msg_type {
        "sub" => Some(ControlFrame::Sub {
            id: parsed.id?,
            name: parsed.name?,
            params: parsed.params.unwrap_or(Value::Null),
        }),
        "unsub" => Some(ControlFrame::Unsub { id: parsed.id? }),
        "ready" => Some(ControlFrame::Ready { subs: parsed.subs.unwrap_or_default() }),
        "nosub" => Some(ControlFrame::NoSub {
            id: parsed.id?,
            error: parsed.error.map(|e| e.to_string()),
        }),
        "added" => Some(ControlFrame::Added { id: parsed.id?, collection: parsed.collection? }),
        "changed" => Some(ControlFrame::Changed { id: parsed.id?, collection: parsed.collection? }),
        "removed" => Some(ControlFrame::Removed { id: parsed.id?, collection: parsed.collection? }),
        "ping" => Some(ControlFrame::Ping { id: parsed.id }),
        "pong" => Some(ControlFrame::Pong { id: parsed.id }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_msg_type_without_full_parse() {
        let raw = r#"{"msg":"changed","collection":"posts","id":"abc"}"#;
        assert_eq!(extract_msg_type(raw), Some("changed".to_string()));
    }

    #[test]
    fn missing_msg_field_yields_none() {
        assert_eq!(extract_msg_type(r#"{"collection":"posts"}"#), None);
    }

    #[test]
    fn parses_sub_frame() {
        let raw = r#"{"msg":"sub","id":"1","name":"posts.all","params":[1,2]}"#;
        let frame = parse_control_frame("sub", raw).unwrap();
        assert_eq!(frame, ControlFrame::Sub { id: "1".into(), name: "posts.all".into(), params: serde_json::json!([1, 2]) });
    }

    #[test]
    fn parses_ready_frame_with_subs_list() {
        let raw = r#"{"msg":"ready","subs":["1","2"]}"#;
        let frame = parse_control_frame("ready", raw).unwrap();
        assert_eq!(frame, ControlFrame::Ready { subs: vec!["1".into(), "2".into()] });
    }

    #[test]
    fn unknown_control_type_yields_none() {
        assert_eq!(parse_control_frame("method", r#"{"msg":"method"}"#), None);
    }
}
