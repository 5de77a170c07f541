//! Startup dependency/vulnerability/deprecated-API snapshots (spec §11).
//!
//! Unlike every other stream in this agent, these three are emitted
//! exactly once at startup rather than on a cadence — the distilled
//! spec names the streams but gives no detection rule or interval, so
//! this is a thin snapshot rather than a standalone collector.

use serde::{Deserialize, Serialize};

/// One resolved dependency read from the manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DependencyRecord {
    pub name: String,
    pub version: String,
}

/// The full resolved dependency set, submitted once to `dependencies`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DependencySnapshot {
    pub timestamp_ms: i64,
    pub dependencies: Vec<DependencyRecord>,
}

/// Severity of a known-vulnerable dependency match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum VulnerabilitySeverity {
    Low,
    Moderate,
    High,
    Critical,
}

/// One dependency matched against the static known-vulnerable table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VulnerabilityFinding {
    pub package: String,
    pub version: String,
    pub advisory_id: String,
    pub severity: VulnerabilitySeverity,
}

/// Submitted once to `vulnerabilities`, possibly with zero findings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VulnerabilitySnapshot {
    pub timestamp_ms: i64,
    pub findings: Vec<VulnerabilityFinding>,
}

/// One dependency matched against the static deprecated-package table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeprecatedApiFinding {
    pub package: String,
    pub version: String,
    pub note: String,
}

/// Submitted once to `deprecatedApis`, possibly with zero findings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeprecatedApiSnapshot {
    pub timestamp_ms: i64,
    pub findings: Vec<DeprecatedApiFinding>,
}
