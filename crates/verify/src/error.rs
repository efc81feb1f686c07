//! Error types for the verification crate.

use std::path::PathBuf;

use convoy_executor::ExecutorError;
use convoy_snapshot::SnapshotError;
use thiserror::Error;

/// Errors that can occur while verifying a deployment.
#[derive(Debug, Error)]
pub enum VerifyError {
    /// The executor gateway broke in a way that is not a recorded failure.
    #[error("executor gateway error: {0}")]
    Executor(#[from] ExecutorError),

    /// Snapshot capture or persistence failed.
    #[error("snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),

    /// A report artifact could not be written.
    #[error("could not write report {path}: {source}")]
    ReportWrite {
        path: PathBuf,
        source: std::io::Error,
    },

    /// A report could not be serialized.
    #[error("could not serialize report: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Result type for verification operations.
pub type Result<T> = std::result::Result<T, VerifyError>;
