//! Fleet snapshots and structural diffs
//!
//! A snapshot is an immutable, timestamped record of fleet state in three
//! categories: gathered facts, configuration-file hashes, and running
//! services. Diffing walks the union of hosts and item keys on both sides,
//! so partial snapshots (a category empty on one side) stay comparable.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{RunId, SnapshotId};

/// Gathered facts for one host.
pub type FactMap = BTreeMap<String, serde_json::Value>;

/// Fact fields compared by the differ.
///
/// The full fact set is captured but only operationally meaningful fields
/// are diffed; the rest (timestamps, uptime, ephemeral interfaces) would be
/// pure noise.
pub const FACT_DIFF_FIELDS: &[&str] = &[
    "ansible_distribution",
    "ansible_kernel",
    "ansible_memtotal_mb",
    "ansible_processor_cores",
];

/// Point-in-time record of fleet state. Immutable once captured.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub id: SnapshotId,

    /// Run this snapshot was captured under, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<RunId>,

    pub captured_at: DateTime<Utc>,

    /// Per-host gathered facts.
    #[serde(default)]
    pub facts: BTreeMap<String, FactMap>,

    /// Per-host configuration file hashes, keyed by file path.
    #[serde(default)]
    pub config_hashes: BTreeMap<String, BTreeMap<String, String>>,

    /// Per-host set of running service units.
    #[serde(default)]
    pub services: BTreeMap<String, BTreeSet<String>>,
}

impl Snapshot {
    /// Empty snapshot shell to be filled by the capturer.
    pub fn new(id: SnapshotId, run_id: Option<RunId>, captured_at: DateTime<Utc>) -> Self {
        Self {
            id,
            run_id,
            captured_at,
            facts: BTreeMap::new(),
            config_hashes: BTreeMap::new(),
            services: BTreeMap::new(),
        }
    }

    /// True when every category is empty (all capture queries failed).
    pub fn is_empty(&self) -> bool {
        self.facts.is_empty() && self.config_hashes.is_empty() && self.services.is_empty()
    }
}

/// How an item differs between two snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Added,
    Removed,
    Modified,
}

impl std::fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChangeKind::Added => write!(f, "added"),
            ChangeKind::Removed => write!(f, "removed"),
            ChangeKind::Modified => write!(f, "modified"),
        }
    }
}

/// Presence transition for a service unit. Services carry no value to
/// modify, so only start/stop applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceTransition {
    Started,
    Stopped,
}

impl std::fmt::Display for ServiceTransition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServiceTransition::Started => write!(f, "started"),
            ServiceTransition::Stopped => write!(f, "stopped"),
        }
    }
}

/// A fact field that differs between two snapshots on one host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldChange {
    pub host: String,
    pub field: String,
    pub before: Option<serde_json::Value>,
    pub after: Option<serde_json::Value>,
}

impl FieldChange {
    /// Stable key for cross-iteration set comparison.
    pub fn change_key(&self) -> String {
        format!("{}:fact:{}", self.host, self.field)
    }
}

/// A configuration file added, removed or rewritten on one host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileChange {
    pub host: String,
    pub file: String,
    pub change: ChangeKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after_hash: Option<String>,
}

impl FileChange {
    /// Stable key for cross-iteration set comparison.
    pub fn change_key(&self) -> String {
        format!("{}:config:{}", self.host, self.file)
    }
}

/// A service that started or stopped on one host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceChange {
    pub host: String,
    pub service: String,
    pub change: ServiceTransition,
}

impl ServiceChange {
    /// Stable key for cross-iteration set comparison.
    pub fn change_key(&self) -> String {
        format!("{}:service:{}", self.host, self.service)
    }
}

/// Structural difference between two snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct DiffResult {
    pub facts: Vec<FieldChange>,
    pub configs: Vec<FileChange>,
    pub services: Vec<ServiceChange>,
}

impl DiffResult {
    /// Sum of change counts across all three categories.
    pub fn total_changes(&self) -> usize {
        self.facts.len() + self.configs.len() + self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.total_changes() == 0
    }

    /// Stable change keys for all changes, used to compare iterations.
    pub fn change_keys(&self) -> BTreeSet<String> {
        self.facts
            .iter()
            .map(FieldChange::change_key)
            .chain(self.configs.iter().map(FileChange::change_key))
            .chain(self.services.iter().map(ServiceChange::change_key))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_change_keys_cover_all_categories() {
        let diff = DiffResult {
            facts: vec![FieldChange {
                host: "h1".into(),
                field: "ansible_kernel".into(),
                before: Some("5.15".into()),
                after: Some("6.1".into()),
            }],
            configs: vec![FileChange {
                host: "h1".into(),
                file: "/etc/a.conf".into(),
                change: ChangeKind::Modified,
                before_hash: Some("aa".into()),
                after_hash: Some("bb".into()),
            }],
            services: vec![ServiceChange {
                host: "h2".into(),
                service: "nginx.service".into(),
                change: ServiceTransition::Stopped,
            }],
        };

        assert_eq!(diff.total_changes(), 3);
        let keys = diff.change_keys();
        assert!(keys.contains("h1:fact:ansible_kernel"));
        assert!(keys.contains("h1:config:/etc/a.conf"));
        assert!(keys.contains("h2:service:nginx.service"));
    }
}
