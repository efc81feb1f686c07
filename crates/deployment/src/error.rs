//! Deployment controller error types

use std::path::PathBuf;

use convoy_executor::ExecutorError;
use convoy_types::TransitionError;
use thiserror::Error;

/// Deployment errors
///
/// A stage that runs and fails is not an error at this level; it is
/// recorded in the [`RunOutcome`](crate::RunOutcome). Errors here mean the
/// run could not proceed at all.
#[derive(Debug, Error)]
pub enum DeployError {
    #[error("deployment plan {path} could not be read: {source}")]
    PlanRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("deployment plan {path} could not be parsed: {source}")]
    PlanParse {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    #[error("duplicate stage name in plan: {0}")]
    DuplicateStage(String),

    #[error("no failed stage found to resume from")]
    NothingToResume,

    #[error("stage '{0}' is recorded as failed but not present in the plan")]
    StageNotInPlan(String),

    #[error("stage '{stage}': {source}")]
    Transition {
        stage: String,
        source: TransitionError,
    },

    #[error("executor gateway error: {0}")]
    Executor(#[from] ExecutorError),
}

/// Result type for deployment operations
pub type Result<T> = std::result::Result<T, DeployError>;
