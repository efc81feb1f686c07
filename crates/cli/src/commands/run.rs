//! Deployment run, resume, status and reset commands

use std::path::PathBuf;
use std::sync::Arc;

use clap::Args;
use serde::Serialize;
use tabled::Tabled;

use convoy_deployment::{
    ControllerConfig, DeployError, DeploymentController, DeploymentPlan, RunOutcome,
};
use convoy_hardware::HardwareProfiler;
use convoy_types::OptimizationProfile;

use crate::commands::{build_gateway, state_store};
use crate::error::CliResult;
use crate::output::{
    print_error, print_info, print_output, print_success, print_warning, status_glyph,
    OutputFormat,
};
use crate::Context;

/// Arguments shared by `run` and `resume`.
#[derive(Debug, Args)]
pub struct DeployArgs {
    /// Deployment plan file (YAML stage list)
    pub plan: PathBuf,

    /// Inventory source handed to the executor
    pub inventory: String,

    /// State tracking file
    #[arg(long, env = "CONVOY_STATE_FILE")]
    pub state_file: Option<PathBuf>,

    /// Show what would be done without executing anything
    #[arg(long)]
    pub dry_run: bool,
}

fn controller(
    args: &DeployArgs,
    ctx: &Context,
) -> DeploymentController<convoy_executor::AnsibleGateway> {
    let profile = HardwareProfiler::new().profile();
    let optimization = OptimizationProfile::for_profile(&profile);
    print_info(&format!(
        "hardware tier {} ({} cores, {:.1} GB): {} forks, {}x timeouts, {} retries",
        profile.tier,
        profile.cpu_count,
        profile.memory_gb,
        optimization.forks,
        optimization.timeout_multiplier,
        optimization.retry_count,
    ));

    let gateway = build_gateway(&ctx.config).with_forks(optimization.forks);
    let store = state_store(args.state_file.clone(), &ctx.config);

    DeploymentController::with_config(
        Arc::new(gateway),
        store,
        optimization,
        ControllerConfig {
            dry_run: args.dry_run,
            ..ControllerConfig::default()
        },
    )
}

fn report_outcome(outcome: &RunOutcome) {
    for stage in &outcome.skipped {
        print_info(&format!("skipped '{}' (already completed)", stage));
    }
    for stage in &outcome.planned {
        print_info(&format!("would deploy '{}'", stage));
    }
    for stage in &outcome.completed {
        print_success(&format!("stage '{}' completed", stage));
    }
    match &outcome.failed {
        Some(stage) => {
            print_error(&format!("deployment failed at stage '{}'", stage));
            print_info("use `convoy resume` to continue from this stage");
        }
        None => print_success("deployment successful"),
    }
}

/// Execute every stage of the plan in order.
pub async fn run(args: DeployArgs, ctx: &Context) -> CliResult<bool> {
    let plan = DeploymentPlan::from_file(&args.plan)?;
    print_info(&format!(
        "starting progressive deployment ({} stages)",
        plan.stages.len()
    ));

    let controller = controller(&args, ctx);
    let outcome = controller.run_all(&plan, &args.inventory).await?;
    report_outcome(&outcome);
    Ok(outcome.success())
}

/// Re-run the failed stage recorded in the state file.
pub async fn resume(args: DeployArgs, ctx: &Context) -> CliResult<bool> {
    let plan = DeploymentPlan::from_file(&args.plan)?;
    let controller = controller(&args, ctx);

    match controller.resume(&plan, &args.inventory).await {
        Ok(outcome) => {
            report_outcome(&outcome);
            Ok(outcome.success())
        }
        Err(DeployError::NothingToResume) => {
            print_error("no failed stage found to resume from");
            Ok(false)
        }
        Err(error) => Err(error.into()),
    }
}

/// Table row for per-stage status display
#[derive(Debug, Serialize, Tabled)]
struct StageRow {
    stage: String,
    status: String,
    completed: String,
    resumed: String,
    error: String,
}

/// Show the recorded deployment status.
pub fn status(state_file: Option<PathBuf>, ctx: &Context, format: OutputFormat) -> CliResult<bool> {
    let store = state_store(state_file, &ctx.config);
    let state = store.load();
    let summary = state.summary();

    print_info(&format!("deployment status: {}", summary.overall));
    print_info(&summary.describe());
    if let Some(updated) = summary.last_updated {
        print_info(&format!("last updated: {}", updated.to_rfc3339()));
    }

    if !state.stages.is_empty() {
        let rows: Vec<StageRow> = state
            .stages
            .iter()
            .map(|(name, outcome)| StageRow {
                stage: name.clone(),
                status: format!("{} {}", status_glyph(outcome.status), outcome.status),
                completed: outcome
                    .completed_at
                    .map(|at| at.to_rfc3339())
                    .unwrap_or_default(),
                resumed: outcome
                    .resumed_at
                    .map(|at| at.to_rfc3339())
                    .unwrap_or_default(),
                error: outcome.last_error.clone().unwrap_or_default(),
            })
            .collect();
        print_output(rows, format);
    }

    Ok(true)
}

/// Retire the current state file.
pub fn reset(state_file: Option<PathBuf>, yes: bool, ctx: &Context) -> CliResult<bool> {
    let store = state_store(state_file, &ctx.config);

    if !yes {
        let confirm = dialoguer::Confirm::new()
            .with_prompt(format!(
                "Reset deployment state at {}? The next run starts from scratch.",
                store.path().display()
            ))
            .default(false)
            .interact()
            .unwrap_or(false);

        if !confirm {
            print_error("Aborted");
            return Ok(false);
        }
    }

    if store.reset()? {
        print_success(&format!(
            "state backed up to {}.reset_backup",
            store.path().display()
        ));
    } else {
        print_warning("no state file to reset");
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use convoy_types::StageStatus;

    #[test]
    fn test_status_glyphs_cover_all_states() {
        for status in [
            StageStatus::NotStarted,
            StageStatus::InProgress,
            StageStatus::Completed,
            StageStatus::Failed,
        ] {
            assert!(!status_glyph(status).is_empty());
        }
    }
}
