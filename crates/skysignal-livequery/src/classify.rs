//! Driver-kind classification (spec §4.4).
//!
//! Preference order: the observer handle's constructor name, then a set
//! of marker fields present on the handle, then (when introspection
//! yields nothing at all) the presence of an oplog-URL environment
//! variable.

use skysignal_types::DriverKind;

/// What could be introspected off a host observer handle.
#[derive(Debug, Clone, Default)]
pub struct HandleIntrospection {
    pub constructor_name: Option<String>,
    pub marker_fields: Vec<String>,
}

pub fn classify_driver(intro: &HandleIntrospection, oplog_url_present: bool) -> DriverKind {
    if let Some(name) = &intro.constructor_name {
        let lower = name.to_ascii_lowercase();
        if lower.contains("changestream") {
            return DriverKind::ChangeStream;
        }
        if lower.contains("oplog") {
            return DriverKind::Oplog;
        }
        if lower.contains("poll") {
            return DriverKind::Polling;
        }
    }

    let has_marker = |names: &[&str]| names.iter().any(|n| intro.marker_fields.iter().any(|f| f == n));
    if has_marker(&["_changeStream", "_pipeline"]) {
        return DriverKind::ChangeStream;
    }
    if has_marker(&["_usesOplog", "_needToFetch"]) {
        return DriverKind::Oplog;
    }
    if !intro.marker_fields.is_empty() {
        return DriverKind::Polling;
    }

    if oplog_url_present {
        DriverKind::Oplog
    } else {
        DriverKind::Polling
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructor_name_takes_precedence() {
        let intro = HandleIntrospection {
            constructor_name: Some("ChangeStreamObserveHandle".into()),
            marker_fields: vec!["_usesOplog".into()],
        };
        assert_eq!(classify_driver(&intro, false), DriverKind::ChangeStream);
    }

    #[test]
    fn falls_back_to_marker_fields_when_no_constructor_match() {
        let intro = HandleIntrospection {
            constructor_name: None,
            marker_fields: vec!["_needToFetch".into()],
        };
        assert_eq!(classify_driver(&intro, false), DriverKind::Oplog);
    }

    #[test]
    fn unrecognized_markers_default_to_polling() {
        let intro = HandleIntrospection {
            constructor_name: None,
            marker_fields: vec!["_somethingElse".into()],
        };
        assert_eq!(classify_driver(&intro, false), DriverKind::Polling);
    }

    #[test]
    fn no_introspection_falls_back_to_oplog_env_var() {
        let intro = HandleIntrospection::default();
        assert_eq!(classify_driver(&intro, true), DriverKind::Oplog);
        assert_eq!(classify_driver(&intro, false), DriverKind::Polling);
    }
}
