//! Error types for the executor gateway.

use thiserror::Error;

/// Errors that can occur while invoking the executor.
///
/// A subprocess that runs and exits non-zero is not an error at this layer;
/// that outcome is carried in the [`ExecutionReport`](crate::ExecutionReport)
/// for callers to interpret. Errors here mean the invocation itself broke.
#[derive(Debug, Error)]
pub enum ExecutorError {
    /// The executor binary could not be started.
    #[error("failed to spawn executor process: {0}")]
    Spawn(#[source] std::io::Error),

    /// The subprocess broke while being waited on.
    #[error("executor process wait failed: {0}")]
    Wait(#[source] std::io::Error),

    /// A scripted gateway ran out of queued reports.
    #[error("scripted gateway exhausted after {calls} calls")]
    ScriptExhausted { calls: usize },
}

/// Result type for gateway operations.
pub type Result<T> = std::result::Result<T, ExecutorError>;
