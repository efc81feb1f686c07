//! Strongly-typed identifiers for convoy entities
//!
//! Run identifiers are UUID-based; snapshot identifiers carry the
//! human-chosen name plus the capture timestamp and double as the
//! snapshot's directory name on disk.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for one deployment run.
///
/// Generated once at run start and threaded through the state file,
/// snapshots and reports produced during that run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(Uuid);

impl RunId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "run:{}", self.0)
    }
}

/// Identifier for a captured snapshot: `<name>_<timestamp>`.
///
/// The identifier is also the snapshot directory name, so two captures of
/// the same name never collide as long as they start in different seconds.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SnapshotId(String);

impl SnapshotId {
    /// Build an identifier from a snapshot name and its capture time.
    pub fn new(name: &str, captured_at: DateTime<Utc>) -> Self {
        Self(format!("{}_{}", name, captured_at.format("%Y%m%d_%H%M%S")))
    }

    /// Wrap an existing identifier string (e.g. a directory name).
    pub fn from_string(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this snapshot was captured under the given name.
    pub fn has_name(&self, name: &str) -> bool {
        self.0
            .strip_prefix(name)
            .is_some_and(|rest| rest.starts_with('_'))
    }
}

impl fmt::Display for SnapshotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_run_id_generation() {
        let id1 = RunId::generate();
        let id2 = RunId::generate();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_snapshot_id_format() {
        let at = Utc.with_ymd_and_hms(2024, 12, 1, 12, 30, 5).unwrap();
        let id = SnapshotId::new("baseline", at);
        assert_eq!(id.as_str(), "baseline_20241201_123005");
        assert!(id.has_name("baseline"));
        assert!(!id.has_name("base"));
    }
}
