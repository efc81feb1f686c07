//! Idempotence, drift and check-mode verification commands

use std::path::PathBuf;
use std::sync::Arc;

use clap::Args;
use serde::Serialize;
use tabled::Tabled;

use convoy_snapshot::SnapshotCapturer;
use convoy_types::{DriftItem, IdempotenceIssue};
use convoy_verify::{detect_drift, save_report, verify_check_mode, IdempotenceAnalyzer};

use crate::commands::snapshot::resolve_snapshot;
use crate::commands::{build_gateway, report_dir, snapshot_store};
use crate::error::CliResult;
use crate::output::{print_error, print_info, print_output, print_success, OutputFormat};
use crate::Context;

/// Arguments for the idempotence test
#[derive(Debug, Args)]
pub struct IdempotenceArgs {
    /// Playbook to test
    pub playbook: String,

    /// Inventory source handed to the executor
    pub inventory: String,

    /// Number of consecutive executions
    #[arg(long, default_value_t = 3)]
    pub iterations: u32,

    /// Snapshot store root
    #[arg(long, env = "CONVOY_SNAPSHOT_DIR")]
    pub snapshot_dir: Option<PathBuf>,

    /// Report output directory
    #[arg(long, env = "CONVOY_REPORT_DIR")]
    pub report_dir: Option<PathBuf>,
}

/// Test a playbook for idempotence over repeated executions.
pub async fn idempotence(args: IdempotenceArgs, ctx: &Context) -> CliResult<bool> {
    let gateway = Arc::new(build_gateway(&ctx.config));
    let store = snapshot_store(args.snapshot_dir, &ctx.config);
    let analyzer = IdempotenceAnalyzer::new(gateway, store);

    print_info(&format!(
        "running {} iterations of {} to detect non-idempotent behavior",
        args.iterations, args.playbook
    ));

    let report = analyzer
        .test_idempotence(&args.playbook, &args.inventory, args.iterations)
        .await?;

    if report.idempotent {
        print_success(&format!(
            "idempotent (consistency score {}/100)",
            report.consistency_score
        ));
    } else {
        print_error(&format!(
            "NOT idempotent: {} issues (consistency score {}/100)",
            report.issues.len(),
            report.consistency_score
        ));
        for issue in &report.issues {
            match issue {
                IdempotenceIssue::ExecutionFailure { iterations } => {
                    print_info(&format!("failed iterations: {:?}", iterations))
                }
                IdempotenceIssue::InconsistentChanges {
                    iteration,
                    differences,
                } => print_info(&format!(
                    "iteration {} changes differ from iteration 1: {:?}",
                    iteration, differences
                )),
                IdempotenceIssue::InconsistentTasks {
                    iteration,
                    differences,
                } => print_info(&format!(
                    "iteration {} changed tasks differ from iteration 1: {:?}",
                    iteration, differences
                )),
            }
        }
    }

    for recommendation in &report.recommendations {
        print_info(recommendation);
    }

    let path = save_report(&report_dir(args.report_dir, &ctx.config), "idempotence", &report)?;
    print_info(&format!("report saved: {}", path.display()));

    Ok(report.idempotent)
}

/// Arguments for drift detection
#[derive(Debug, Args)]
pub struct DriftArgs {
    /// Baseline snapshot id or name
    pub baseline: String,

    /// Inventory source handed to the executor
    pub inventory: String,

    /// Snapshot store root
    #[arg(long, env = "CONVOY_SNAPSHOT_DIR")]
    pub snapshot_dir: Option<PathBuf>,

    /// Report output directory
    #[arg(long, env = "CONVOY_REPORT_DIR")]
    pub report_dir: Option<PathBuf>,
}

/// Table row for drift display
#[derive(Debug, Serialize, Tabled)]
struct DriftRow {
    host: String,
    kind: String,
    item: String,
    severity: String,
}

/// Capture the live fleet and compare it against a trusted baseline.
pub async fn drift(args: DriftArgs, ctx: &Context, format: OutputFormat) -> CliResult<bool> {
    let store = snapshot_store(args.snapshot_dir, &ctx.config);
    let baseline = resolve_snapshot(&store, &args.baseline)?;

    let gateway = Arc::new(build_gateway(&ctx.config));
    let capturer = SnapshotCapturer::new(gateway, store);
    print_info(&format!("capturing live state to compare against {}", baseline.id));
    let current = capturer.capture("drift_check", &args.inventory, None).await?;

    let report = detect_drift(&baseline, &current);

    if !report.drift_detected {
        print_success("no drift from baseline");
    } else {
        print_error(&format!(
            "drift detected: {} items ({} high, {} medium)",
            report.summary.total, report.summary.high, report.summary.medium
        ));
        let rows: Vec<DriftRow> = report
            .items
            .iter()
            .map(|item| DriftRow {
                host: item.host().to_string(),
                kind: match item {
                    DriftItem::Config { change, .. } => format!("config {}", change),
                    DriftItem::Service { change, .. } => format!("service {}", change),
                },
                item: item.item().to_string(),
                severity: item.severity().to_string(),
            })
            .collect();
        print_output(rows, format);
    }

    let path = save_report(&report_dir(args.report_dir, &ctx.config), "drift", &report)?;
    print_info(&format!("report saved: {}", path.display()));

    Ok(!report.drift_detected)
}

/// Run a playbook in check+diff mode to find untracked changes.
pub async fn check(playbook: String, inventory: String, ctx: &Context) -> CliResult<bool> {
    let gateway = build_gateway(&ctx.config);
    let report = verify_check_mode(&gateway, &playbook, &inventory).await?;

    print_info(&format!(
        "verification: {}",
        if report.passed { "PASSED" } else { "FAILED" }
    ));
    print_info(&format!(
        "untracked changes: {}",
        if report.has_untracked_changes {
            "YES"
        } else {
            "NO"
        }
    ));

    if report.changes_detected > 0 {
        print_info(&format!("detected changes ({}):", report.changes_detected));
        for change in &report.change_summary {
            print_info(&format!("  {}", change.summary));
        }
    }
    print_info(&report.recommendation);

    Ok(report.passed && !report.has_untracked_changes)
}
