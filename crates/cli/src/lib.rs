//! Convoy CLI - progressive fleet deployment and convergence verification
//!
//! This CLI gives operators a terminal interface to:
//! - Run multi-stage deployments with hardware-aware retry and resume
//! - Inspect and reset the persisted deployment state
//! - Capture, diff and consistency-check fleet snapshots
//! - Test playbooks for idempotence and detect drift from a baseline
//!
//! Exit codes: 0 full success, 1 failure or negative finding, 130 on
//! interrupt.

use std::ffi::OsString;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;
mod config;
mod error;
mod output;

use commands::{run as run_cmd, snapshot, verify};
use config::CliConfig;
pub use error::{CliError, CliResult};
use output::{print_error, OutputFormat};

/// Exit code reported when the user interrupts a run.
const EXIT_INTERRUPT: u8 = 130;

/// Shared command context.
pub(crate) struct Context {
    pub config: CliConfig,
}

/// Convoy CLI application
#[derive(Parser)]
#[command(name = "convoy")]
#[command(about = "Convoy - progressive fleet deployment and convergence verification", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "CONVOY_CONFIG")]
    config: Option<String>,

    /// Output format (table, json, yaml)
    #[arg(short, long, default_value = "table")]
    output: OutputFormat,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands
#[derive(Subcommand)]
enum Commands {
    /// Run a progressive deployment
    Run(run_cmd::DeployArgs),

    /// Resume a deployment from its failed stage
    Resume(run_cmd::DeployArgs),

    /// Show deployment status
    Status {
        /// State tracking file
        #[arg(long, env = "CONVOY_STATE_FILE")]
        state_file: Option<PathBuf>,
    },

    /// Reset deployment state
    Reset {
        /// State tracking file
        #[arg(long, env = "CONVOY_STATE_FILE")]
        state_file: Option<PathBuf>,

        /// Skip confirmation
        #[arg(short = 'y', long)]
        yes: bool,
    },

    /// Snapshot capture, diff and consistency
    Snapshot {
        #[command(subcommand)]
        command: snapshot::SnapshotCommands,
    },

    /// Test a playbook for idempotence
    Idempotence(verify::IdempotenceArgs),

    /// Detect drift from a baseline snapshot
    Drift(verify::DriftArgs),

    /// Verify a playbook leaves no untracked changes (check mode)
    Verify {
        /// Playbook to verify
        playbook: String,

        /// Inventory source handed to the executor
        inventory: String,
    },
}

/// Run using the current process arguments.
pub async fn run() -> ExitCode {
    run_with_args(std::env::args_os()).await
}

/// Run using the provided argument iterator.
pub async fn run_with_args<I, T>(args: I) -> ExitCode
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = Cli::parse_from(args);

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().without_time())
        .init();

    // A second ctrl-c falls through to the default handler.
    tokio::spawn(async {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\ninterrupted");
            std::process::exit(EXIT_INTERRUPT as i32);
        }
    });

    // Load config
    let config = match CliConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(error) => {
            print_error(&error.to_string());
            return ExitCode::from(1);
        }
    };
    let ctx = Context { config };

    match dispatch(cli.command, &ctx, cli.output).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(error) => {
            print_error(&error.to_string());
            ExitCode::from(1)
        }
    }
}

async fn dispatch(command: Commands, ctx: &Context, format: OutputFormat) -> CliResult<bool> {
    match command {
        Commands::Run(args) => run_cmd::run(args, ctx).await,
        Commands::Resume(args) => run_cmd::resume(args, ctx).await,
        Commands::Status { state_file } => run_cmd::status(state_file, ctx, format),
        Commands::Reset { state_file, yes } => run_cmd::reset(state_file, yes, ctx),
        Commands::Snapshot { command } => snapshot::execute(command, ctx, format).await,
        Commands::Idempotence(args) => verify::idempotence(args, ctx).await,
        Commands::Drift(args) => verify::drift(args, ctx, format).await,
        Commands::Verify {
            playbook,
            inventory,
        } => verify::check(playbook, inventory, ctx).await,
    }
}
