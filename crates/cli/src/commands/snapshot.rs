//! Snapshot capture, diff and consistency commands

use std::path::PathBuf;
use std::sync::Arc;

use clap::Subcommand;
use serde::Serialize;
use tabled::Tabled;

use convoy_snapshot::{diff, SnapshotCapturer, SnapshotError, SnapshotStore};
use convoy_types::{ConsistencyIssue, DiffResult, Snapshot, SnapshotId};
use convoy_verify::check_consistency;

use crate::commands::{build_gateway, snapshot_store};
use crate::error::CliResult;
use crate::output::{print_error, print_info, print_output, print_success, OutputFormat};
use crate::Context;

/// Snapshot subcommands
#[derive(Debug, Subcommand)]
pub enum SnapshotCommands {
    /// Capture a named snapshot of the fleet
    Capture {
        /// Snapshot name (the id becomes `<name>_<timestamp>`)
        name: String,

        /// Inventory source handed to the executor
        inventory: String,

        /// Snapshot store root
        #[arg(long, env = "CONVOY_SNAPSHOT_DIR")]
        snapshot_dir: Option<PathBuf>,
    },

    /// Compare two captured snapshots
    Diff {
        /// Snapshot id or name (resolves to the latest capture of a name)
        before: String,

        /// Snapshot id or name
        after: String,

        /// Snapshot store root
        #[arg(long, env = "CONVOY_SNAPSHOT_DIR")]
        snapshot_dir: Option<PathBuf>,
    },

    /// Check one snapshot for cross-host consistency
    Consistency {
        /// Snapshot id or name
        id: String,

        /// Snapshot store root
        #[arg(long, env = "CONVOY_SNAPSHOT_DIR")]
        snapshot_dir: Option<PathBuf>,
    },
}

/// Load a snapshot by exact id, falling back to the latest capture under
/// the given name.
pub(crate) fn resolve_snapshot(store: &SnapshotStore, reference: &str) -> CliResult<Snapshot> {
    let direct = SnapshotId::from_string(reference);
    match store.load(&direct) {
        Ok(snapshot) => Ok(snapshot),
        Err(SnapshotError::NotFound { .. }) => {
            let latest = store.latest(reference)?.ok_or(SnapshotError::NotFound {
                id: reference.to_string(),
                root: store.root().to_path_buf(),
            })?;
            Ok(store.load(&latest)?)
        }
        Err(error) => Err(error.into()),
    }
}

/// Table row for change display
#[derive(Debug, Serialize, Tabled)]
struct ChangeRow {
    host: String,
    category: String,
    item: String,
    change: String,
}

fn change_rows(result: &DiffResult) -> Vec<ChangeRow> {
    let facts = result.facts.iter().map(|change| ChangeRow {
        host: change.host.clone(),
        category: "fact".to_string(),
        item: change.field.clone(),
        change: "modified".to_string(),
    });
    let configs = result.configs.iter().map(|change| ChangeRow {
        host: change.host.clone(),
        category: "config".to_string(),
        item: change.file.clone(),
        change: change.change.to_string(),
    });
    let services = result.services.iter().map(|change| ChangeRow {
        host: change.host.clone(),
        category: "service".to_string(),
        item: change.service.clone(),
        change: change.change.to_string(),
    });
    facts.chain(configs).chain(services).collect()
}

/// Execute a snapshot command
pub async fn execute(
    command: SnapshotCommands,
    ctx: &Context,
    format: OutputFormat,
) -> CliResult<bool> {
    match command {
        SnapshotCommands::Capture {
            name,
            inventory,
            snapshot_dir,
        } => {
            let store = snapshot_store(snapshot_dir, &ctx.config);
            let gateway = Arc::new(build_gateway(&ctx.config));
            let capturer = SnapshotCapturer::new(gateway, store);

            let snapshot = capturer.capture(&name, &inventory, None).await?;
            print_success(&format!(
                "captured snapshot {} ({} hosts with facts, {} with configs, {} with services)",
                snapshot.id,
                snapshot.facts.len(),
                snapshot.config_hashes.len(),
                snapshot.services.len()
            ));
            Ok(true)
        }

        SnapshotCommands::Diff {
            before,
            after,
            snapshot_dir,
        } => {
            let store = snapshot_store(snapshot_dir, &ctx.config);
            let before = resolve_snapshot(&store, &before)?;
            let after = resolve_snapshot(&store, &after)?;

            let result = diff(&before, &after);
            print_info(&format!(
                "{} vs {}: {} changes",
                before.id,
                after.id,
                result.total_changes()
            ));

            if result.is_empty() {
                print_success("snapshots are identical");
                return Ok(true);
            }

            print_output(change_rows(&result), format);
            Ok(false)
        }

        SnapshotCommands::Consistency { id, snapshot_dir } => {
            let store = snapshot_store(snapshot_dir, &ctx.config);
            let snapshot = resolve_snapshot(&store, &id)?;

            let report = check_consistency(&snapshot);
            if report.consistent {
                print_success(&format!(
                    "fleet consistent across {} hosts",
                    report.hosts_checked
                ));
                return Ok(true);
            }

            print_error(&format!(
                "fleet inconsistent: {} issues across {} hosts",
                report.issues.len(),
                report.hosts_checked
            ));
            for issue in &report.issues {
                match issue {
                    ConsistencyIssue::InsufficientHosts { hosts } => print_info(&format!(
                        "consistency undefined: only {} host(s) have facts",
                        hosts
                    )),
                    ConsistencyIssue::FieldMismatch { field, values } => {
                        let groups: Vec<String> = values
                            .iter()
                            .map(|(value, hosts)| format!("{}={:?}", value, hosts))
                            .collect();
                        print_info(&format!("field '{}' disagrees: {}", field, groups.join(", ")));
                    }
                    ConsistencyIssue::MissingServices { host, missing } => {
                        print_info(&format!("host '{}' missing services: {:?}", host, missing));
                    }
                }
            }
            Ok(false)
        }
    }
}
