//! Core types for the convoy deployment orchestrator.
//!
//! Everything that crosses a crate boundary lives here: strongly-typed
//! identifiers, hardware/optimization profiles, stage configuration and
//! outcomes, fleet snapshots, structural diffs, and verification reports.
//! All persisted artifacts serialize through these types, so their serde
//! representations are part of the on-disk contract.

mod hardware;
mod ids;
mod report;
mod snapshot;
mod stage;

pub use hardware::{CapacityTier, HardwareProfile, OptimizationProfile};
pub use ids::{RunId, SnapshotId};
pub use report::{
    CheckModeChange, CheckModeReport, ConsistencyIssue, ConsistencyReport, DriftItem, DriftReport,
    DriftSummary, IdempotenceIssue, IdempotencePolicy, IdempotenceReport, IterationRecord,
    Severity, CONSISTENCY_FIELDS,
};
pub use snapshot::{
    ChangeKind, DiffResult, FactMap, FieldChange, FileChange, ServiceChange, ServiceTransition,
    Snapshot, FACT_DIFF_FIELDS,
};
pub use stage::{
    DeploymentState, OverallStatus, StageConfig, StageOutcome, StageStatus, StateSummary,
    TransitionError,
};
