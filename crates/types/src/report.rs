//! Verification reports: consistency, idempotence, drift, check-mode
//!
//! Reports are persisted as JSON artifacts, so every type here keeps a
//! stable serde representation.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::SnapshotId;
use crate::snapshot::{ChangeKind, DiffResult, ServiceTransition};

/// Fact fields that must agree across every host in the fleet.
pub const CONSISTENCY_FIELDS: &[&str] = &[
    "ansible_distribution",
    "ansible_distribution_version",
    "ansible_kernel",
    "ansible_python_version",
];

/// Severity of a finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Medium,
    High,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Medium => write!(f, "MEDIUM"),
            Severity::High => write!(f, "HIGH"),
        }
    }
}

/// A single cross-host consistency finding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConsistencyIssue {
    /// Consistency is undefined with fewer than two fact-bearing hosts.
    InsufficientHosts { hosts: usize },

    /// An invariant field carries more than one distinct value.
    FieldMismatch {
        field: String,
        /// Observed value -> hosts reporting it.
        values: BTreeMap<String, Vec<String>>,
    },

    /// A host lacks services that every other host runs.
    MissingServices {
        host: String,
        missing: BTreeSet<String>,
    },
}

/// Result of checking one snapshot for cross-host agreement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsistencyReport {
    pub consistent: bool,
    pub hosts_checked: usize,
    pub issues: Vec<ConsistencyIssue>,
}

/// Verdict policy for the idempotence analyzer.
///
/// `Strict` is the specified behavior: every iteration's change set must
/// equal iteration 1's. `SettleAfterFirst` accepts an empty change set on
/// every iteration after the first; it exists as an explicit opt-in, never
/// a silent default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum IdempotencePolicy {
    #[default]
    Strict,
    SettleAfterFirst,
}

/// A finding from the idempotence analyzer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IdempotenceIssue {
    /// One or more iterations exited non-zero.
    ExecutionFailure { iterations: Vec<u32> },

    /// An iteration's detected change set differs from iteration 1's.
    InconsistentChanges {
        iteration: u32,
        /// Symmetric difference of change keys against iteration 1.
        differences: Vec<String>,
    },

    /// An iteration's changed-task set differs from iteration 1's.
    InconsistentTasks {
        iteration: u32,
        /// Symmetric difference of task keys against iteration 1.
        differences: Vec<String>,
    },
}

impl IdempotenceIssue {
    pub fn severity(&self) -> Severity {
        match self {
            IdempotenceIssue::ExecutionFailure { .. } => Severity::High,
            IdempotenceIssue::InconsistentChanges { .. } => Severity::High,
            IdempotenceIssue::InconsistentTasks { .. } => Severity::Medium,
        }
    }
}

/// What one iteration of the idempotence test observed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterationRecord {
    /// 1-based iteration number.
    pub iteration: u32,
    pub exit_code: i32,
    pub succeeded: bool,
    /// Snapshot diff around this execution.
    pub changes: DiffResult,
    /// `host:task` keys the executor reported as changed.
    pub changed_tasks: BTreeSet<String>,
}

/// Full idempotence verdict over N consecutive executions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdempotenceReport {
    pub playbook: String,
    pub inventory: String,
    pub iterations: u32,
    pub generated_at: DateTime<Utc>,
    pub runs: Vec<IterationRecord>,
    pub idempotent: bool,
    /// 0-100, a coarse linear penalty of 10 per issue.
    pub consistency_score: u8,
    pub issues: Vec<IdempotenceIssue>,
    pub recommendations: Vec<String>,
}

/// One divergence from the trusted baseline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DriftItem {
    Config {
        host: String,
        file: String,
        change: ChangeKind,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        baseline_hash: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        current_hash: Option<String>,
        severity: Severity,
    },
    Service {
        host: String,
        service: String,
        change: ServiceTransition,
        severity: Severity,
    },
}

impl DriftItem {
    pub fn severity(&self) -> Severity {
        match self {
            DriftItem::Config { severity, .. } => *severity,
            DriftItem::Service { severity, .. } => *severity,
        }
    }

    pub fn host(&self) -> &str {
        match self {
            DriftItem::Config { host, .. } => host,
            DriftItem::Service { host, .. } => host,
        }
    }

    /// The drifted file or service name.
    pub fn item(&self) -> &str {
        match self {
            DriftItem::Config { file, .. } => file,
            DriftItem::Service { service, .. } => service,
        }
    }
}

/// Counts by category and severity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct DriftSummary {
    pub total: usize,
    pub config: usize,
    pub service: usize,
    pub high: usize,
    pub medium: usize,
}

/// Divergence of a live snapshot from a trusted baseline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriftReport {
    pub baseline: SnapshotId,
    pub current: SnapshotId,
    pub generated_at: DateTime<Utc>,
    pub drift_detected: bool,
    pub items: Vec<DriftItem>,
    pub summary: DriftSummary,
}

/// A change surfaced by a check-mode verification run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckModeChange {
    pub file: String,
    pub change_type: String,
    pub summary: String,
}

/// Result of running the executor in check+diff mode to find changes not
/// yet captured in code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckModeReport {
    pub playbook: String,
    pub passed: bool,
    pub has_untracked_changes: bool,
    pub changes_detected: usize,
    /// First few change summaries, for display.
    pub change_summary: Vec<CheckModeChange>,
    pub recommendation: String,
}
