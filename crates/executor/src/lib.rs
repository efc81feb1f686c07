//! Gateway to the external configuration-management executor.
//!
//! Everything that touches the executor process goes through the
//! [`ExecutorGateway`] trait: the deployment controller, the snapshot
//! capturer and the verification tooling all consume the same seam, which
//! makes them testable against the [`ScriptedGateway`] double without ever
//! spawning a subprocess.
//!
//! The gateway is a pure adapter. Retry policy, outcome recording and any
//! interpretation beyond "what did the process print" belong to callers;
//! the one shared piece of interpretation, the executor's line-oriented
//! output format, lives in the [`parser`] module.

mod ansible;
mod error;
mod gateway;
pub mod parser;
mod scripted;

pub use ansible::AnsibleGateway;
pub use error::{ExecutorError, Result};
pub use gateway::{
    ExecSpec, ExecutionReport, ExecutorGateway, OutputObserver, StreamKind, EXIT_CODE_TIMEOUT,
};
pub use scripted::{RecordedCall, ScriptedGateway};
