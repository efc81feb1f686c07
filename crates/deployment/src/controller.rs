//! The progressive deployment controller.
//!
//! Drives a plan's stages strictly in order through the executor gateway,
//! recording every outcome in the state store. Completed stages are skipped
//! on restart, a failed stage stops the run, and a failed run can be
//! resumed at exactly the failed stage.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{error, info, instrument, warn};

use convoy_executor::{ExecSpec, ExecutionReport, ExecutorGateway, OutputObserver, StreamKind};
use convoy_state::StateStore;
use convoy_types::{DeploymentState, OptimizationProfile, RunId, StageStatus};

use crate::error::{DeployError, Result};
use crate::locks::{default_lock_paths, LockCheck};
use crate::plan::{DeploymentPlan, ResolvedStage};

/// Knobs that rarely change between runs.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Timeout growth factor between retry attempts.
    pub scaling_factor: u32,

    /// Lock files checked before stages with `check_locks`.
    pub lock_paths: Vec<PathBuf>,

    /// How long to wait for a held lock to clear.
    pub lock_wait: Duration,

    /// Log what would run without invoking the executor or touching state.
    pub dry_run: bool,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            scaling_factor: 2,
            lock_paths: default_lock_paths(),
            lock_wait: Duration::from_secs(30),
            dry_run: false,
        }
    }
}

/// What a run (or resume) did.
#[derive(Debug, Clone, PartialEq)]
pub struct RunOutcome {
    pub run_id: RunId,

    /// Stages that reached `completed` during this run.
    pub completed: Vec<String>,

    /// Stages skipped because a prior run already completed them.
    pub skipped: Vec<String>,

    /// Stages a dry run would have executed.
    pub planned: Vec<String>,

    /// The stage that failed, ending the run.
    pub failed: Option<String>,
}

impl RunOutcome {
    fn new(run_id: RunId) -> Self {
        Self {
            run_id,
            completed: Vec::new(),
            skipped: Vec::new(),
            planned: Vec::new(),
            failed: None,
        }
    }

    /// Overall success: no stage failed.
    pub fn success(&self) -> bool {
        self.failed.is_none()
    }
}

enum StageResult {
    Completed,
    Failed(String),
}

/// Sequential multi-stage deployment driver.
///
/// Stages never run concurrently: later stages assume the side effects of
/// earlier ones. One controller per state file at a time; the store does
/// not lock.
pub struct DeploymentController<G> {
    gateway: Arc<G>,
    store: StateStore,
    optimization: OptimizationProfile,
    config: ControllerConfig,
}

impl<G: ExecutorGateway> DeploymentController<G> {
    pub fn new(gateway: Arc<G>, store: StateStore, optimization: OptimizationProfile) -> Self {
        Self::with_config(gateway, store, optimization, ControllerConfig::default())
    }

    pub fn with_config(
        gateway: Arc<G>,
        store: StateStore,
        optimization: OptimizationProfile,
        config: ControllerConfig,
    ) -> Self {
        Self {
            gateway,
            store,
            optimization,
            config,
        }
    }

    /// Run every stage of the plan in declared order.
    ///
    /// Stages already recorded as completed are skipped without invoking
    /// the executor. The first failure stops the run; the overall outcome
    /// is successful only when every stage has completed.
    #[instrument(skip(self, plan, inventory), fields(stages = plan.stages.len()))]
    pub async fn run_all(&self, plan: &DeploymentPlan, inventory: &str) -> Result<RunOutcome> {
        plan.validate()?;

        let run_id = RunId::generate();
        let mut outcome = RunOutcome::new(run_id);
        let mut state = self.store.load();
        state.run_id = Some(run_id);

        info!(
            %run_id,
            total_stages = plan.stages.len(),
            forks = self.optimization.forks,
            timeout_multiplier = self.optimization.timeout_multiplier,
            "starting progressive deployment"
        );

        for config in &plan.stages {
            if state.is_completed(&config.name) {
                info!(stage = %config.name, "already completed, skipping");
                outcome.skipped.push(config.name.clone());
                continue;
            }

            let stage = ResolvedStage::resolve(config, &self.optimization);

            if self.config.dry_run {
                info!(
                    stage = %stage.name,
                    playbook = %stage.playbook,
                    timeout_secs = stage.timeout.as_secs(),
                    retries = stage.retries,
                    run_async = stage.run_async,
                    "dry run: would deploy stage"
                );
                outcome.planned.push(stage.name.clone());
                continue;
            }

            self.begin_stage(&mut state, &stage.name)?;

            match self.execute_stage(&stage, inventory, &mut state).await? {
                StageResult::Completed => outcome.completed.push(stage.name.clone()),
                StageResult::Failed(reason) => {
                    error!(stage = %stage.name, %reason, "deployment failed, stopping run");
                    outcome.failed = Some(stage.name.clone());
                    break;
                }
            }
        }

        if outcome.success() && !self.config.dry_run {
            info!(%run_id, completed = outcome.completed.len(), "progressive deployment completed");
        }

        Ok(outcome)
    }

    /// Re-enter the single failed stage recorded in the state file.
    ///
    /// Fails with [`DeployError::NothingToResume`] when no stage is in the
    /// failed state. Other stage outcomes are left untouched.
    #[instrument(skip(self, plan, inventory))]
    pub async fn resume(&self, plan: &DeploymentPlan, inventory: &str) -> Result<RunOutcome> {
        plan.validate()?;

        let mut state = self.store.load();
        let stage_name = state
            .first_failed()
            .ok_or(DeployError::NothingToResume)?
            .to_string();
        let config = plan
            .stage(&stage_name)
            .ok_or_else(|| DeployError::StageNotInPlan(stage_name.clone()))?;

        let run_id = state.run_id.unwrap_or_else(RunId::generate);
        let mut outcome = RunOutcome::new(run_id);

        if self.config.dry_run {
            info!(stage = %stage_name, "dry run: would resume from this stage");
            outcome.planned.push(stage_name);
            return Ok(outcome);
        }

        info!(stage = %stage_name, "resuming from failed stage");

        let stage = ResolvedStage::resolve(config, &self.optimization);

        {
            let entry = state.outcome_mut(&stage_name);
            entry
                .transition(StageStatus::InProgress)
                .map_err(|source| DeployError::Transition {
                    stage: stage_name.clone(),
                    source,
                })?;
            entry.resumed_at = Some(Utc::now());
        }
        self.persist(&mut state);

        match self.execute_stage(&stage, inventory, &mut state).await? {
            StageResult::Completed => outcome.completed.push(stage_name),
            StageResult::Failed(reason) => {
                error!(stage = %stage_name, %reason, "resumed stage failed again");
                outcome.failed = Some(stage_name);
            }
        }

        Ok(outcome)
    }

    /// Retry loop for one stage: the budget for attempt `k` is
    /// `timeout * scaling_factor^k`. The backoff grants more time instead
    /// of sleeping; an executor that timed out is retried with a larger
    /// budget immediately.
    ///
    /// Only timeout-class failures consume further attempts; any other
    /// non-zero exit is deterministic and returned at once.
    pub async fn run_with_retry(
        &self,
        stage: &ResolvedStage,
        inventory: &str,
    ) -> Result<ExecutionReport> {
        let spec = ExecSpec::Playbook {
            playbook: stage.playbook.clone(),
            inventory: inventory.to_string(),
            extra_vars: Default::default(),
        };
        let observer = stage.run_async.then(streaming_observer);

        let mut last_report = None;

        for attempt in 0..stage.retries {
            let timeout = stage.timeout * self.config.scaling_factor.pow(attempt);
            info!(
                stage = %stage.name,
                attempt = attempt + 1,
                max_attempts = stage.retries,
                timeout_secs = timeout.as_secs(),
                "invoking executor"
            );

            let report = self
                .gateway
                .execute(&spec, timeout, observer.clone())
                .await?;

            if report.succeeded() {
                info!(stage = %stage.name, attempt = attempt + 1, "stage execution succeeded");
                return Ok(report);
            }

            if report.is_timeout() {
                warn!(
                    stage = %stage.name,
                    attempt = attempt + 1,
                    "timeout detected, granting a larger budget"
                );
                last_report = Some(report);
                continue;
            }

            // Deterministic failure: retrying would reproduce it.
            warn!(
                stage = %stage.name,
                exit_code = report.exit_code,
                "non-timeout failure, not retrying"
            );
            return Ok(report);
        }

        warn!(stage = %stage.name, attempts = stage.retries, "all attempts exhausted");
        Ok(last_report.unwrap_or_else(ExecutionReport::timeout))
    }

    fn begin_stage(&self, state: &mut DeploymentState, name: &str) -> Result<()> {
        let entry = state.outcome_mut(name);
        // A stage left in_progress is a stale marker from an interrupted
        // run; re-entering it is fine.
        if entry.status == StageStatus::InProgress {
            return Ok(());
        }
        entry
            .transition(StageStatus::InProgress)
            .map_err(|source| DeployError::Transition {
                stage: name.to_string(),
                source,
            })
    }

    /// Run one stage that is already marked in-progress: lock check, pre
    /// commands, then the retry loop. Records and persists the terminal
    /// outcome either way.
    async fn execute_stage(
        &self,
        stage: &ResolvedStage,
        inventory: &str,
        state: &mut DeploymentState,
    ) -> Result<StageResult> {
        info!(stage = %stage.name, playbook = %stage.playbook, "deploying stage");

        if stage.check_locks {
            let check = LockCheck::new(self.config.lock_paths.clone(), self.config.lock_wait);
            if !check.ensure_clear().await {
                return self.record_failure(
                    state,
                    stage,
                    "transient locks still held; executor not invoked".to_string(),
                );
            }
        }

        for command in &stage.pre_commands {
            if let Some(failure) = self.run_pre_command(command).await {
                return self.record_failure(state, stage, failure);
            }
        }

        let report = self.run_with_retry(stage, inventory).await?;

        if report.succeeded() {
            let entry = state.outcome_mut(&stage.name);
            entry
                .transition(StageStatus::Completed)
                .map_err(|source| DeployError::Transition {
                    stage: stage.name.clone(),
                    source,
                })?;
            entry.completed_at = Some(Utc::now());
            entry.duration_estimate_secs = stage.estimated_duration;
            entry.last_error = None;
            self.persist(state);
            info!(stage = %stage.name, "stage completed");
            Ok(StageResult::Completed)
        } else {
            let reason = if report.timed_out {
                "executor exceeded every timeout budget".to_string()
            } else {
                report.stderr_excerpt()
            };
            self.record_failure(state, stage, reason)
        }
    }

    /// Run one pre-command through the system shell; returns the failure
    /// reason when it exits non-zero or cannot run at all.
    async fn run_pre_command(&self, command: &str) -> Option<String> {
        info!(%command, "running pre-command");

        let output = tokio::process::Command::new("sh")
            .arg("-c")
            .arg(command)
            .output()
            .await;

        match output {
            Ok(output) if output.status.success() => None,
            Ok(output) => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                Some(format!(
                    "pre-command '{}' exited with {}: {}",
                    command,
                    output.status.code().unwrap_or(-1),
                    stderr.trim()
                ))
            }
            Err(error) => Some(format!("pre-command '{}' could not run: {}", command, error)),
        }
    }

    fn record_failure(
        &self,
        state: &mut DeploymentState,
        stage: &ResolvedStage,
        reason: String,
    ) -> Result<StageResult> {
        let entry = state.outcome_mut(&stage.name);
        entry
            .transition(StageStatus::Failed)
            .map_err(|source| DeployError::Transition {
                stage: stage.name.clone(),
                source,
            })?;
        entry.duration_estimate_secs = stage.estimated_duration;
        entry.last_error = Some(reason.clone());
        self.persist(state);
        Ok(StageResult::Failed(reason))
    }

    /// Best-effort persistence: a failed write is logged, the in-memory
    /// state stays authoritative for the rest of the run, and the run is
    /// simply not crash-safe beyond the last successful write.
    fn persist(&self, state: &mut DeploymentState) {
        if let Err(error) = self.store.save(state) {
            warn!(%error, "could not persist deployment state, continuing in memory");
        }
    }
}

/// Observer that relays executor output into the log as it streams.
fn streaming_observer() -> OutputObserver {
    Arc::new(|kind, line| match kind {
        StreamKind::Stdout => info!(target: "convoy::executor", "{}", line),
        StreamKind::Stderr => warn!(target: "convoy::executor", "{}", line),
    })
}
