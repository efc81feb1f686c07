//! CLI error types

use thiserror::Error;

/// CLI error types
#[derive(Debug, Error)]
pub enum CliError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Deployment controller error
    #[error("Deployment error: {0}")]
    Deploy(#[from] convoy_deployment::DeployError),

    /// Snapshot error
    #[error("Snapshot error: {0}")]
    Snapshot(#[from] convoy_snapshot::SnapshotError),

    /// Verification error
    #[error("Verification error: {0}")]
    Verify(#[from] convoy_verify::VerifyError),

    /// State store error
    #[error("State error: {0}")]
    State(#[from] convoy_state::StateError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML serialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Result type for CLI operations
pub type CliResult<T> = Result<T, CliError>;
