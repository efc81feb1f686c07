//! Error types for the deployment state store.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while persisting deployment state.
///
/// Loading never produces an error: a missing or unparseable state file
/// yields an empty state instead.
#[derive(Debug, Error)]
pub enum StateError {
    /// The previous state file could not be moved to its backup name.
    #[error("could not back up state file {path}: {source}")]
    Backup {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The state file could not be written.
    #[error("could not write state file {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The state could not be serialized.
    #[error("could not serialize deployment state: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Result type for state store operations.
pub type Result<T> = std::result::Result<T, StateError>;
