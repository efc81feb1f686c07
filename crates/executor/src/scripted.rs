//! Scripted gateway: a deterministic test double.
//!
//! Hands out pre-queued execution reports in order and records every call,
//! so retry/backoff and state-machine logic can be unit tested without
//! spawning a subprocess.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::{ExecutorError, Result};
use crate::gateway::{ExecSpec, ExecutionReport, ExecutorGateway, OutputObserver};

/// One recorded gateway invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub spec: ExecSpec,
    pub timeout: Duration,
}

/// Gateway double that replays a scripted sequence of reports.
///
/// Calls beyond the scripted sequence fail with
/// [`ExecutorError::ScriptExhausted`], which keeps tests honest about how
/// many executor invocations a code path performs.
#[derive(Default)]
pub struct ScriptedGateway {
    script: Mutex<VecDeque<ExecutionReport>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a gateway preloaded with reports, returned in order.
    pub fn with_reports(reports: impl IntoIterator<Item = ExecutionReport>) -> Self {
        Self {
            script: Mutex::new(reports.into_iter().collect()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Queue one more report at the end of the script.
    pub fn enqueue(&self, report: ExecutionReport) {
        self.script.lock().push_back(report);
    }

    /// Every invocation made so far.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }
}

#[async_trait]
impl ExecutorGateway for ScriptedGateway {
    async fn execute(
        &self,
        spec: &ExecSpec,
        timeout: Duration,
        observer: Option<OutputObserver>,
    ) -> Result<ExecutionReport> {
        self.calls.lock().push(RecordedCall {
            spec: spec.clone(),
            timeout,
        });

        let report = self.script.lock().pop_front().ok_or_else(|| {
            ExecutorError::ScriptExhausted {
                calls: self.calls.lock().len(),
            }
        })?;

        if let Some(observer) = observer {
            for line in report.stdout.lines() {
                observer(crate::gateway::StreamKind::Stdout, line);
            }
            for line in report.stderr.lines() {
                observer(crate::gateway::StreamKind::Stderr, line);
            }
        }

        Ok(report)
    }
}
