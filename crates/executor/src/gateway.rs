//! Executor gateway trait and invocation types

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::parser;

/// Exit code reported when the gateway-level deadline fires before the
/// subprocess finishes.
pub const EXIT_CODE_TIMEOUT: i32 = 124;

/// Which output stream a streamed line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Stdout,
    Stderr,
}

/// Callback receiving each output line as the subprocess produces it.
///
/// Streaming is observation only: `execute` always blocks until the
/// subprocess terminates or the deadline elapses, observer or not.
pub type OutputObserver = Arc<dyn Fn(StreamKind, &str) + Send + Sync>;

/// What to run through the executor.
///
/// Every variant carries its inventory source; the gateway passes it along
/// untouched (inventory parsing is out of scope here).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExecSpec {
    /// Apply a playbook to the fleet.
    Playbook {
        playbook: String,
        inventory: String,
        #[serde(default)]
        extra_vars: BTreeMap<String, String>,
    },

    /// Read-only ad-hoc module query against a host pattern.
    Module {
        pattern: String,
        module: String,
        args: String,
        inventory: String,
    },

    /// Playbook in check+diff mode: report what would change, change nothing.
    CheckMode {
        playbook: String,
        inventory: String,
        #[serde(default)]
        extra_vars: BTreeMap<String, String>,
    },
}

impl ExecSpec {
    /// The inventory source this spec targets.
    pub fn inventory(&self) -> &str {
        match self {
            ExecSpec::Playbook { inventory, .. } => inventory,
            ExecSpec::Module { inventory, .. } => inventory,
            ExecSpec::CheckMode { inventory, .. } => inventory,
        }
    }

    /// Render extra vars as the executor's `key=value,key=value` argument.
    pub fn extra_vars_arg(vars: &BTreeMap<String, String>) -> String {
        vars.iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join(",")
    }
}

impl std::fmt::Display for ExecSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecSpec::Playbook { playbook, .. } => write!(f, "playbook {}", playbook),
            ExecSpec::Module {
                pattern, module, ..
            } => write!(f, "module {} on {}", module, pattern),
            ExecSpec::CheckMode { playbook, .. } => write!(f, "check-mode {}", playbook),
        }
    }
}

/// Everything the subprocess produced, plus how it ended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionReport {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub duration: Duration,
    /// True when the gateway deadline killed the subprocess.
    pub timed_out: bool,
}

impl ExecutionReport {
    /// Successful execution: exit 0 within the deadline.
    pub fn success(stdout: impl Into<String>) -> Self {
        Self {
            exit_code: 0,
            stdout: stdout.into(),
            stderr: String::new(),
            duration: Duration::ZERO,
            timed_out: false,
        }
    }

    /// Failed execution with the given exit code and stderr.
    pub fn failure(exit_code: i32, stderr: impl Into<String>) -> Self {
        Self {
            exit_code,
            stdout: String::new(),
            stderr: stderr.into(),
            duration: Duration::ZERO,
            timed_out: false,
        }
    }

    /// Execution cut off by the gateway deadline.
    pub fn timeout() -> Self {
        Self {
            exit_code: EXIT_CODE_TIMEOUT,
            stdout: String::new(),
            stderr: String::new(),
            duration: Duration::ZERO,
            timed_out: true,
        }
    }

    /// Exit 0 and not killed by the deadline.
    pub fn succeeded(&self) -> bool {
        self.exit_code == 0 && !self.timed_out
    }

    /// Whether this failure is timeout-class: either the gateway deadline
    /// fired, or the executor itself reported a timeout on stderr.
    pub fn is_timeout(&self) -> bool {
        self.timed_out || parser::indicates_timeout(&self.stderr)
    }

    /// A short stderr excerpt suitable for recording in a stage outcome.
    pub fn stderr_excerpt(&self) -> String {
        const MAX: usize = 500;
        let trimmed = self.stderr.trim();
        if trimmed.len() > MAX {
            let mut end = MAX;
            while !trimmed.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}...", &trimmed[..end])
        } else {
            trimmed.to_string()
        }
    }
}

/// Capability interface to the external executor.
///
/// Implementations must block until the subprocess terminates or the
/// deadline elapses; "asynchronous" execution means streaming output while
/// waiting, never returning early.
#[async_trait]
pub trait ExecutorGateway: Send + Sync {
    /// Run the given spec with a hard time budget.
    ///
    /// The budget is handed to the executor as its own timeout; the gateway
    /// enforces a slightly longer deadline on top so the executor's timeout
    /// fires first and the two remain distinguishable.
    async fn execute(
        &self,
        spec: &ExecSpec,
        timeout: Duration,
        observer: Option<OutputObserver>,
    ) -> Result<ExecutionReport>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extra_vars_rendering() {
        let mut vars = BTreeMap::new();
        vars.insert("env".to_string(), "prod".to_string());
        vars.insert("region".to_string(), "eu-1".to_string());
        assert_eq!(ExecSpec::extra_vars_arg(&vars), "env=prod,region=eu-1");
    }

    #[test]
    fn test_report_classification() {
        assert!(ExecutionReport::success("ok").succeeded());
        assert!(!ExecutionReport::failure(2, "boom").succeeded());
        assert!(ExecutionReport::timeout().is_timeout());
        assert!(ExecutionReport::failure(4, "Connection timed out").is_timeout());
        assert!(!ExecutionReport::failure(4, "syntax error").is_timeout());
    }

    #[test]
    fn test_stderr_excerpt_truncates() {
        let report = ExecutionReport::failure(1, "x".repeat(600));
        let excerpt = report.stderr_excerpt();
        assert!(excerpt.len() <= 503);
        assert!(excerpt.ends_with("..."));
    }
}
