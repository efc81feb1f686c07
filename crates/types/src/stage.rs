//! Stage configuration, per-stage outcomes and the persisted run state
//!
//! A stage moves `not_started -> in_progress -> {completed | failed}`;
//! `failed -> in_progress` is reachable only through an explicit resume.
//! Outcomes are keyed by stage name and never removed once created.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ids::RunId;

/// Author-supplied configuration for one deployment stage.
///
/// Optional fields left unset are resolved from the run's
/// [`OptimizationProfile`](crate::OptimizationProfile) at execution time;
/// the author copy is never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageConfig {
    /// Stage name, unique within a plan.
    pub name: String,

    /// Playbook this stage executes.
    pub playbook: String,

    /// Base timeout in seconds before the hardware multiplier is applied.
    #[serde(default, rename = "timeout")]
    pub timeout_secs: Option<u64>,

    /// Retry budget override.
    #[serde(default)]
    pub retries: Option<u32>,

    /// Stream executor output while the stage runs.
    #[serde(default, rename = "async")]
    pub run_async: Option<bool>,

    /// Shell commands run before the executor; any non-zero exit fails the
    /// stage without invoking the executor.
    #[serde(default)]
    pub pre_commands: Vec<String>,

    /// Check for package-manager lock files before executing.
    #[serde(default = "default_check_locks")]
    pub check_locks: bool,

    /// Rough duration estimate recorded in the stage outcome.
    #[serde(default = "default_duration_estimate")]
    pub estimated_duration: u64,
}

fn default_check_locks() -> bool {
    true
}

fn default_duration_estimate() -> u64 {
    60
}

/// Lifecycle status of a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    #[default]
    NotStarted,
    InProgress,
    Completed,
    Failed,
}

impl std::fmt::Display for StageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StageStatus::NotStarted => write!(f, "not_started"),
            StageStatus::InProgress => write!(f, "in_progress"),
            StageStatus::Completed => write!(f, "completed"),
            StageStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Invalid stage status transition.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid stage transition: {from} -> {to}")]
pub struct TransitionError {
    pub from: StageStatus,
    pub to: StageStatus,
}

/// Recorded outcome of one stage, keyed by stage name in [`DeploymentState`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct StageOutcome {
    /// Current lifecycle status.
    pub status: StageStatus,

    /// When the stage reached `completed`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,

    /// Author's duration estimate, carried for status display.
    #[serde(default)]
    pub duration_estimate_secs: u64,

    /// Set when a failed stage was re-entered through resume.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resumed_at: Option<DateTime<Utc>>,

    /// Terminal stderr excerpt of the last failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl StageOutcome {
    /// Move to a new status, enforcing the stage lifecycle.
    pub fn transition(&mut self, to: StageStatus) -> Result<(), TransitionError> {
        use StageStatus::*;
        let allowed = matches!(
            (self.status, to),
            (NotStarted, InProgress)
                | (InProgress, Completed)
                | (InProgress, Failed)
                | (Failed, InProgress)
        );
        if !allowed {
            return Err(TransitionError {
                from: self.status,
                to,
            });
        }
        self.status = to;
        Ok(())
    }
}

/// Persisted record of a deployment run: one outcome per stage.
///
/// The single source of truth for resumability. Owned exclusively by the
/// state store; one writer per state file at a time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct DeploymentState {
    /// Run that last wrote this state.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<RunId>,

    /// Per-stage outcomes, keyed by stage name.
    #[serde(default)]
    pub stages: BTreeMap<String, StageOutcome>,

    /// Stamped by the store on every save.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<DateTime<Utc>>,
}

impl DeploymentState {
    /// Whether the named stage already completed.
    pub fn is_completed(&self, stage: &str) -> bool {
        self.stages
            .get(stage)
            .map(|o| o.status == StageStatus::Completed)
            .unwrap_or(false)
    }

    /// The outcome entry for a stage, created as `not_started` if absent.
    pub fn outcome_mut(&mut self, stage: &str) -> &mut StageOutcome {
        self.stages.entry(stage.to_string()).or_default()
    }

    /// First stage recorded as failed, in stage-name order.
    pub fn first_failed(&self) -> Option<&str> {
        self.stages
            .iter()
            .find(|(_, o)| o.status == StageStatus::Failed)
            .map(|(name, _)| name.as_str())
    }

    /// Derive the run-level summary from stage counts.
    pub fn summary(&self) -> StateSummary {
        let total = self.stages.len();
        let completed = self.count(StageStatus::Completed);
        let failed = self.count(StageStatus::Failed);
        let in_progress = self.count(StageStatus::InProgress);

        let overall = if completed == total && total > 0 {
            OverallStatus::Completed
        } else if failed > 0 {
            OverallStatus::Failed
        } else if in_progress > 0 {
            OverallStatus::InProgress
        } else if completed > 0 {
            OverallStatus::Partial
        } else {
            OverallStatus::NotStarted
        };

        StateSummary {
            overall,
            total,
            completed,
            failed,
            in_progress,
            last_updated: self.last_updated,
        }
    }

    fn count(&self, status: StageStatus) -> usize {
        self.stages.values().filter(|o| o.status == status).count()
    }
}

/// Run-level status derived from stage counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverallStatus {
    NotStarted,
    InProgress,
    Partial,
    Failed,
    Completed,
}

impl std::fmt::Display for OverallStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OverallStatus::NotStarted => write!(f, "not_started"),
            OverallStatus::InProgress => write!(f, "in_progress"),
            OverallStatus::Partial => write!(f, "partial"),
            OverallStatus::Failed => write!(f, "failed"),
            OverallStatus::Completed => write!(f, "completed"),
        }
    }
}

/// Aggregated view of a deployment state for the status command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateSummary {
    pub overall: OverallStatus,
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    pub in_progress: usize,
    pub last_updated: Option<DateTime<Utc>>,
}

impl StateSummary {
    /// One-line human summary, e.g. `2/3 stages completed, 1 failed`.
    pub fn describe(&self) -> String {
        format!(
            "{}/{} stages completed, {} failed, {} in progress",
            self.completed, self.total, self.failed, self.in_progress
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_lifecycle() {
        let mut outcome = StageOutcome::default();
        assert_eq!(outcome.status, StageStatus::NotStarted);

        outcome.transition(StageStatus::InProgress).unwrap();
        outcome.transition(StageStatus::Failed).unwrap();
        // resume path
        outcome.transition(StageStatus::InProgress).unwrap();
        outcome.transition(StageStatus::Completed).unwrap();

        // terminal: completed never moves again
        let err = outcome.transition(StageStatus::InProgress).unwrap_err();
        assert_eq!(err.from, StageStatus::Completed);
    }

    #[test]
    fn test_skipping_in_progress_rejected() {
        let mut outcome = StageOutcome::default();
        assert!(outcome.transition(StageStatus::Completed).is_err());
        assert!(outcome.transition(StageStatus::Failed).is_err());
    }

    #[test]
    fn test_summary_derivation() {
        let mut state = DeploymentState::default();
        assert_eq!(state.summary().overall, OverallStatus::NotStarted);

        state.outcome_mut("base").status = StageStatus::Completed;
        state.outcome_mut("app").status = StageStatus::NotStarted;
        assert_eq!(state.summary().overall, OverallStatus::Partial);

        state.outcome_mut("app").status = StageStatus::Failed;
        assert_eq!(state.summary().overall, OverallStatus::Failed);

        state.outcome_mut("app").status = StageStatus::Completed;
        let summary = state.summary();
        assert_eq!(summary.overall, OverallStatus::Completed);
        assert_eq!(summary.describe(), "2/2 stages completed, 0 failed, 0 in progress");
    }

    #[test]
    fn test_first_failed_in_name_order() {
        let mut state = DeploymentState::default();
        state.outcome_mut("c-stage").status = StageStatus::Failed;
        state.outcome_mut("a-stage").status = StageStatus::Failed;
        state.outcome_mut("b-stage").status = StageStatus::Completed;
        assert_eq!(state.first_failed(), Some("a-stage"));
    }

    #[test]
    fn test_stage_config_yaml_defaults() {
        let yaml = r#"
name: base_system
playbook: playbooks/base.yml
timeout: 600
async: true
"#;
        let config: StageConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.name, "base_system");
        assert_eq!(config.timeout_secs, Some(600));
        assert_eq!(config.run_async, Some(true));
        assert!(config.retries.is_none());
        assert!(config.check_locks);
        assert!(config.pre_commands.is_empty());
    }
}
