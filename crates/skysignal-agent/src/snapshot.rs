//! Startup dependency/vulnerability/deprecated-API snapshots (spec §11).
//!
//! Unlike every other stream this agent ships, these three fire exactly
//! once, at [`Agent::start`](crate::Agent::start) time, against whatever
//! lockfile `dependencyManifestPath` points at. There is no driver to ask
//! "is this dependency vulnerable" the way there's a connection pool to
//! ask about checkouts, so the vulnerability/deprecated-API tables here
//! are static and small — illustrative coverage, not a live advisory feed.

use serde::Deserialize;
use skysignal_ingestion::IngestionClient;
use skysignal_types::{
    AgentConfig, DependencyRecord, DependencySnapshot, DeprecatedApiFinding, DeprecatedApiSnapshot,
    VulnerabilityFinding, VulnerabilitySeverity, VulnerabilitySnapshot,
};
use std::sync::Arc;
use tracing::warn;

#[derive(Debug, Deserialize)]
struct LockFile {
    #[serde(default, rename = "package")]
    packages: Vec<LockPackage>,
}

#[derive(Debug, Deserialize)]
struct LockPackage {
    name: String,
    version: String,
}

/// Static known-vulnerable table: `(package, exact version, advisory id,
/// severity)`. A real deployment would source this from an advisory
/// database; this agent only needs to prove the snapshot pipeline works.
const KNOWN_VULNERABLE: &[(&str, &str, &str, VulnerabilitySeverity)] = &[
    ("time", "0.2.22", "RUSTSEC-2020-0071", VulnerabilitySeverity::High),
    ("openssl", "0.10.38", "RUSTSEC-2022-0014", VulnerabilitySeverity::Moderate),
    ("ring", "0.16.19", "RUSTSEC-2022-0093", VulnerabilitySeverity::Moderate),
];

/// Static deprecated-package table: `(package, note)`.
const KNOWN_DEPRECATED: &[(&str, &str)] = &[
    ("failure", "superseded by std::error::Error + thiserror/anyhow"),
    ("quickersort", "superseded by the standard library's sort_unstable"),
    ("tokio-core", "superseded by tokio 0.2+'s unified runtime"),
];

fn read_dependencies(path: &str) -> Option<Vec<DependencyRecord>> {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) => {
            warn!(path, error = %e, "could not read dependency manifest; skipping startup snapshots");
            return None;
        }
    };
    let parsed: LockFile = match toml::from_str(&text) {
        Ok(parsed) => parsed,
        Err(e) => {
            warn!(path, error = %e, "could not parse dependency manifest; skipping startup snapshots");
            return None;
        }
    };
    Some(
        parsed
            .packages
            .into_iter()
            .map(|p| DependencyRecord { name: p.name, version: p.version })
            .collect(),
    )
}

fn vulnerability_findings(deps: &[DependencyRecord]) -> Vec<VulnerabilityFinding> {
    deps.iter()
        .filter_map(|dep| {
            KNOWN_VULNERABLE
                .iter()
                .find(|(name, version, _, _)| *name == dep.name && *version == dep.version)
                .map(|(_, _, advisory_id, severity)| VulnerabilityFinding {
                    package: dep.name.clone(),
                    version: dep.version.clone(),
                    advisory_id: advisory_id.to_string(),
                    severity: *severity,
                })
        })
        .collect()
}

fn deprecated_findings(deps: &[DependencyRecord]) -> Vec<DeprecatedApiFinding> {
    deps.iter()
        .filter_map(|dep| {
            KNOWN_DEPRECATED
                .iter()
                .find(|(name, _)| *name == dep.name)
                .map(|(_, note)| DeprecatedApiFinding {
                    package: dep.name.clone(),
                    version: dep.version.clone(),
                    note: note.to_string(),
                })
        })
        .collect()
}

/// Read `config.dependency_manifest_path`, if set, and submit one
/// `dependencies`, one `vulnerabilities`, and one `deprecatedApis`
/// snapshot (each possibly empty). A no-op if the path is unset or the
/// manifest can't be read or parsed.
pub fn emit_startup_snapshots(config: &AgentConfig, ingestion: &Arc<IngestionClient>) {
    let Some(path) = &config.dependency_manifest_path else {
        return;
    };
    let Some(dependencies) = read_dependencies(path) else {
        return;
    };

    let timestamp_ms = chrono::Utc::now().timestamp_millis();

    let vulnerabilities = vulnerability_findings(&dependencies);
    let deprecated = deprecated_findings(&dependencies);

    let dep_snapshot = DependencySnapshot { timestamp_ms, dependencies };
    let vuln_snapshot = VulnerabilitySnapshot { timestamp_ms, findings: vulnerabilities };
    let deprecated_snapshot = DeprecatedApiSnapshot { timestamp_ms, findings: deprecated };

    for (stream, result) in [
        ("dependencies", serde_json::to_value(&dep_snapshot)),
        ("vulnerabilities", serde_json::to_value(&vuln_snapshot)),
        ("deprecatedApis", serde_json::to_value(&deprecated_snapshot)),
    ] {
        match result {
            Ok(value) => ingestion.submit(stream, value),
            Err(e) => warn!(stream, error = %e, "failed to serialize startup snapshot"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unreadable_manifest_path_is_a_safe_no_op() {
        assert!(read_dependencies("/nonexistent/Cargo.lock").is_none());
    }

    #[test]
    fn matching_dependency_is_flagged_vulnerable() {
        let deps = vec![DependencyRecord { name: "time".to_string(), version: "0.2.22".to_string() }];
        let findings = vulnerability_findings(&deps);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].advisory_id, "RUSTSEC-2020-0071");
    }

    #[test]
    fn unrelated_version_is_not_flagged() {
        let deps = vec![DependencyRecord { name: "time".to_string(), version: "0.3.9".to_string() }];
        assert!(vulnerability_findings(&deps).is_empty());
    }

    #[test]
    fn deprecated_package_is_flagged_regardless_of_version() {
        let deps = vec![DependencyRecord { name: "failure".to_string(), version: "0.1.8".to_string() }];
        let findings = deprecated_findings(&deps);
        assert_eq!(findings.len(), 1);
        assert!(findings[0].note.contains("thiserror"));
    }

    #[test]
    fn parses_a_minimal_lock_file() {
        let dir = std::env::temp_dir().join(format!("skysignal-test-lock-{}", std::process::id()));
        std::fs::write(
            &dir,
            r#"
version = 3

[[package]]
name = "time"
version = "0.2.22"

[[package]]
name = "serde"
version = "1.0.0"
"#,
        )
        .unwrap();
        let deps = read_dependencies(dir.to_str().unwrap()).unwrap();
        assert_eq!(deps.len(), 2);
        std::fs::remove_file(&dir).ok();
    }
}
