//! Error types for snapshot capture and persistence.

use std::path::PathBuf;

use convoy_executor::ExecutorError;
use thiserror::Error;

/// Errors that can occur while persisting or loading snapshots.
///
/// Capture queries that fail do not surface here; they degrade to an empty
/// snapshot section instead.
#[derive(Debug, Error)]
pub enum SnapshotError {
    /// The requested snapshot does not exist under the store root.
    #[error("snapshot '{id}' not found under {root}")]
    NotFound { id: String, root: PathBuf },

    /// A snapshot artifact could not be written.
    #[error("could not write snapshot artifact {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    /// A snapshot artifact could not be read.
    #[error("could not read snapshot artifact {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    /// A snapshot artifact was not valid JSON.
    #[error("could not parse snapshot artifact {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    /// The gateway failed in a way that is not a per-query degradation.
    #[error("executor gateway error: {0}")]
    Executor(#[from] ExecutorError),
}

/// Result type for snapshot operations.
pub type Result<T> = std::result::Result<T, SnapshotError>;
