//! Subprocess gateway to the real executor binaries.

use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::{ExecutorError, Result};
use crate::gateway::{ExecSpec, ExecutionReport, ExecutorGateway, OutputObserver, StreamKind};

/// Extra wait granted beyond the executor's own timeout, so the executor's
/// timeout fires first and a gateway-level kill stays distinguishable from
/// an executor-level timeout.
const WAIT_GRACE: Duration = Duration::from_secs(60);

/// Gateway that shells out to the `ansible-playbook` / `ansible` binaries.
#[derive(Debug, Clone)]
pub struct AnsibleGateway {
    playbook_bin: String,
    adhoc_bin: String,
    forks: Option<u32>,
}

impl AnsibleGateway {
    pub fn new() -> Self {
        Self {
            playbook_bin: "ansible-playbook".to_string(),
            adhoc_bin: "ansible".to_string(),
            forks: None,
        }
    }

    /// Override the executor binaries, e.g. for a virtualenv installation.
    pub fn with_binaries(mut self, playbook_bin: impl Into<String>, adhoc_bin: impl Into<String>) -> Self {
        self.playbook_bin = playbook_bin.into();
        self.adhoc_bin = adhoc_bin.into();
        self
    }

    /// Set the executor fork count, normally from the optimization profile.
    pub fn with_forks(mut self, forks: u32) -> Self {
        self.forks = Some(forks);
        self
    }

    fn build_command(&self, spec: &ExecSpec, timeout: Duration) -> Command {
        let timeout_arg = timeout.as_secs().max(1).to_string();

        let mut command = match spec {
            ExecSpec::Playbook {
                playbook,
                inventory,
                extra_vars,
            } => {
                let mut command = Command::new(&self.playbook_bin);
                command.arg("-i").arg(inventory);
                command.arg("--timeout").arg(&timeout_arg);
                if !extra_vars.is_empty() {
                    command
                        .arg("--extra-vars")
                        .arg(ExecSpec::extra_vars_arg(extra_vars));
                }
                command.arg(playbook);
                command
            }
            ExecSpec::CheckMode {
                playbook,
                inventory,
                extra_vars,
            } => {
                let mut command = Command::new(&self.playbook_bin);
                command.arg("--check").arg("--diff");
                command.arg("-i").arg(inventory);
                command.arg("--timeout").arg(&timeout_arg);
                if !extra_vars.is_empty() {
                    command
                        .arg("--extra-vars")
                        .arg(ExecSpec::extra_vars_arg(extra_vars));
                }
                command.arg(playbook);
                command
            }
            ExecSpec::Module {
                pattern,
                module,
                args,
                inventory,
            } => {
                let mut command = Command::new(&self.adhoc_bin);
                command.arg(pattern);
                command.arg("-i").arg(inventory);
                command.arg("-m").arg(module);
                if !args.is_empty() {
                    command.arg("-a").arg(args);
                }
                command.arg("--timeout").arg(&timeout_arg);
                command
            }
        };

        if let Some(forks) = self.forks {
            command.arg("--forks").arg(forks.to_string());
        }

        command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        command
    }
}

impl Default for AnsibleGateway {
    fn default() -> Self {
        Self::new()
    }
}

/// Drain one output stream line by line, feeding the observer as lines
/// arrive. Bytes are decoded lossily; the executor's output is not
/// guaranteed to be clean UTF-8. Read errors end the stream with whatever
/// was collected so far.
async fn drain_stream<R: AsyncRead + Unpin>(
    stream: Option<R>,
    kind: StreamKind,
    observer: Option<OutputObserver>,
) -> String {
    let Some(stream) = stream else {
        return String::new();
    };

    let mut reader = BufReader::new(stream);
    let mut collected = String::new();
    let mut buf = Vec::new();

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf);
                let line = line.trim_end_matches(['\n', '\r']);
                if let Some(observer) = &observer {
                    observer(kind, line);
                }
                collected.push_str(line);
                collected.push('\n');
            }
            Err(error) => {
                warn!(%error, "executor output stream broke mid-read");
                break;
            }
        }
    }

    collected
}

#[async_trait]
impl ExecutorGateway for AnsibleGateway {
    async fn execute(
        &self,
        spec: &ExecSpec,
        timeout: Duration,
        observer: Option<OutputObserver>,
    ) -> Result<ExecutionReport> {
        debug!(spec = %spec, timeout_secs = timeout.as_secs(), "invoking executor");

        let mut command = self.build_command(spec, timeout);
        let started = Instant::now();
        let mut child = command.spawn().map_err(ExecutorError::Spawn)?;

        let stdout_task = tokio::spawn(drain_stream(
            child.stdout.take(),
            StreamKind::Stdout,
            observer.clone(),
        ));
        let stderr_task = tokio::spawn(drain_stream(
            child.stderr.take(),
            StreamKind::Stderr,
            observer,
        ));

        let wait = tokio::time::timeout(timeout + WAIT_GRACE, child.wait()).await;

        let (exit_code, timed_out) = match wait {
            Ok(Ok(status)) => (status.code().unwrap_or(-1), false),
            Ok(Err(error)) => return Err(ExecutorError::Wait(error)),
            Err(_) => {
                warn!(
                    spec = %spec,
                    budget_secs = (timeout + WAIT_GRACE).as_secs(),
                    "executor exceeded the gateway deadline, killing it"
                );
                if let Err(error) = child.start_kill() {
                    warn!(%error, "could not kill timed-out executor");
                }
                let _ = child.wait().await;
                (crate::gateway::EXIT_CODE_TIMEOUT, true)
            }
        };

        // The pipes close once the child is gone, so these joins terminate.
        let stdout = stdout_task.await.unwrap_or_default();
        let stderr = stderr_task.await.unwrap_or_default();

        Ok(ExecutionReport {
            exit_code,
            stdout,
            stderr,
            duration: started.elapsed(),
            timed_out,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_successful_invocation_collects_stdout() {
        let gateway = AnsibleGateway::new().with_binaries("echo", "echo");
        let spec = ExecSpec::Module {
            pattern: "all".to_string(),
            module: "ping".to_string(),
            args: String::new(),
            inventory: "hosts".to_string(),
        };

        let report = gateway
            .execute(&spec, Duration::from_secs(5), None)
            .await
            .unwrap();

        assert!(report.succeeded());
        assert!(report.stdout.contains("all"));
        assert!(!report.timed_out);
    }

    #[tokio::test]
    async fn test_missing_binary_is_spawn_error() {
        let gateway =
            AnsibleGateway::new().with_binaries("definitely-not-a-real-binary", "also-missing");
        let spec = ExecSpec::Playbook {
            playbook: "site.yml".to_string(),
            inventory: "hosts".to_string(),
            extra_vars: Default::default(),
        };

        let result = gateway.execute(&spec, Duration::from_secs(1), None).await;
        assert!(matches!(result, Err(ExecutorError::Spawn(_))));
    }

    #[tokio::test]
    async fn test_observer_sees_lines() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;

        let seen = Arc::new(AtomicUsize::new(0));
        let counter = seen.clone();
        let observer: OutputObserver = Arc::new(move |kind, _line| {
            if kind == StreamKind::Stdout {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });

        let gateway = AnsibleGateway::new().with_binaries("echo", "echo");
        let spec = ExecSpec::Module {
            pattern: "all".to_string(),
            module: "setup".to_string(),
            args: String::new(),
            inventory: "hosts".to_string(),
        };

        gateway
            .execute(&spec, Duration::from_secs(5), Some(observer))
            .await
            .unwrap();

        assert!(seen.load(Ordering::SeqCst) >= 1);
    }
}
