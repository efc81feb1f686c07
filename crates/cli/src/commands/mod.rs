//! Command implementations

pub mod run;
pub mod snapshot;
pub mod verify;

use std::path::PathBuf;

use convoy_executor::AnsibleGateway;
use convoy_snapshot::SnapshotStore;
use convoy_state::StateStore;

use crate::config::CliConfig;

const DEFAULT_STATE_FILE: &str = "deployment_state.json";
const DEFAULT_SNAPSHOT_DIR: &str = "/tmp/convoy_snapshots";
const DEFAULT_REPORT_DIR: &str = "/tmp/convoy_reports";

/// Build the executor gateway, honoring configured binary overrides.
pub(crate) fn build_gateway(config: &CliConfig) -> AnsibleGateway {
    let mut gateway = AnsibleGateway::new();
    if let (Some(playbook_bin), Some(adhoc_bin)) = (&config.playbook_bin, &config.adhoc_bin) {
        gateway = gateway.with_binaries(playbook_bin, adhoc_bin);
    }
    gateway
}

/// Resolve the state file: explicit flag, then config, then the default.
pub(crate) fn state_store(flag: Option<PathBuf>, config: &CliConfig) -> StateStore {
    let path = flag
        .or_else(|| config.state_file.clone())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_STATE_FILE));
    StateStore::new(path)
}

/// Resolve the snapshot store root: explicit flag, then config, then the
/// default.
pub(crate) fn snapshot_store(flag: Option<PathBuf>, config: &CliConfig) -> SnapshotStore {
    let root = flag
        .or_else(|| config.snapshot_dir.clone())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_SNAPSHOT_DIR));
    SnapshotStore::new(root)
}

/// Resolve the report directory: explicit flag, then config, then the
/// default.
pub(crate) fn report_dir(flag: Option<PathBuf>, config: &CliConfig) -> PathBuf {
    flag.or_else(|| config.report_dir.clone())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_REPORT_DIR))
}
