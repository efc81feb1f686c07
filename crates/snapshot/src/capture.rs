//! Snapshot capturer: pulls fleet state through the executor gateway.
//!
//! Three independent read-only queries feed one snapshot: full fact
//! gathering, configuration-file hash enumeration and running-service
//! enumeration. Each query is best-effort: a failed query logs a warning
//! and leaves its section empty, and a partial snapshot is still valid and
//! diffable.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{info, instrument, warn};

use convoy_executor::{parser, ExecSpec, ExecutionReport, ExecutorGateway};
use convoy_types::{RunId, Snapshot, SnapshotId};

use crate::error::Result;
use crate::store::SnapshotStore;

/// Hash every regular configuration file under the fixed root.
const CONFIG_HASH_ARGS: &str =
    "find /etc -name '*.conf' -type f -exec md5sum {} \\; 2>/dev/null || true";

/// Enumerate service units currently running.
const SERVICE_LIST_ARGS: &str =
    "systemctl list-units --type=service --state=running --no-pager";

/// Per-query time budget.
const QUERY_TIMEOUT: Duration = Duration::from_secs(60);

/// Captures named snapshots of fleet state and persists them.
pub struct SnapshotCapturer<G> {
    gateway: Arc<G>,
    store: SnapshotStore,
}

impl<G: ExecutorGateway> SnapshotCapturer<G> {
    pub fn new(gateway: Arc<G>, store: SnapshotStore) -> Self {
        Self { gateway, store }
    }

    pub fn store(&self) -> &SnapshotStore {
        &self.store
    }

    /// Capture and persist a snapshot of the fleet.
    #[instrument(skip(self, inventory))]
    pub async fn capture(
        &self,
        name: &str,
        inventory: &str,
        run_id: Option<RunId>,
    ) -> Result<Snapshot> {
        let captured_at = Utc::now();
        let id = SnapshotId::new(name, captured_at);
        info!(%id, "capturing fleet snapshot");

        let mut snapshot = Snapshot::new(id, run_id, captured_at);

        let (facts, configs, services) = tokio::join!(
            self.query(inventory, "setup", ""),
            self.query(inventory, "shell", CONFIG_HASH_ARGS),
            self.query(inventory, "shell", SERVICE_LIST_ARGS),
        );

        match facts {
            Some(report) => snapshot.facts = parser::parse_host_facts(&report.stdout),
            None => warn!("fact gathering failed, snapshot carries no facts"),
        }
        match configs {
            Some(report) => snapshot.config_hashes = parser::parse_config_hashes(&report.stdout),
            None => warn!("config hash query failed, snapshot carries no config hashes"),
        }
        match services {
            Some(report) => snapshot.services = parser::parse_running_services(&report.stdout),
            None => warn!("service query failed, snapshot carries no services"),
        }

        if snapshot.is_empty() {
            warn!(id = %snapshot.id, "every capture query failed; snapshot is empty");
        }

        self.store.save(&snapshot)?;
        Ok(snapshot)
    }

    /// One best-effort gateway query; `None` on any failure.
    async fn query(&self, inventory: &str, module: &str, args: &str) -> Option<ExecutionReport> {
        let spec = ExecSpec::Module {
            pattern: "all".to_string(),
            module: module.to_string(),
            args: args.to_string(),
            inventory: inventory.to_string(),
        };

        match self.gateway.execute(&spec, QUERY_TIMEOUT, None).await {
            Ok(report) if report.succeeded() => Some(report),
            Ok(report) => {
                warn!(
                    module = %module,
                    exit_code = report.exit_code,
                    "capture query exited non-zero"
                );
                None
            }
            Err(error) => {
                warn!(module = %module, %error, "capture query could not run");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use convoy_executor::ScriptedGateway;

    const FACTS_STDOUT: &str = r#"web1 | SUCCESS => {
    "ansible_facts": {
        "ansible_distribution": "Ubuntu",
        "ansible_kernel": "6.1.0"
    }
}
web2 | SUCCESS => {
    "ansible_facts": {
        "ansible_distribution": "Ubuntu",
        "ansible_kernel": "6.1.0"
    }
}
"#;

    const CONFIG_STDOUT: &str = "\
web1 | SUCCESS | rc=0 >>
abc123  /etc/nginx/nginx.conf
web2 | SUCCESS | rc=0 >>
abc123  /etc/nginx/nginx.conf
def456  /etc/redis/redis.conf
";

    const SERVICE_STDOUT: &str = "\
web1 | SUCCESS | rc=0 >>
nginx.service   loaded active running   web server
web2 | SUCCESS | rc=0 >>
nginx.service   loaded active running   web server
redis.service   loaded active running   key-value store
";

    #[tokio::test]
    async fn test_capture_fills_all_categories() {
        let dir = tempfile::tempdir().unwrap();
        let gateway = Arc::new(ScriptedGateway::with_reports([
            ExecutionReport::success(FACTS_STDOUT),
            ExecutionReport::success(CONFIG_STDOUT),
            ExecutionReport::success(SERVICE_STDOUT),
        ]));
        let capturer = SnapshotCapturer::new(gateway, SnapshotStore::new(dir.path()));

        let snapshot = capturer.capture("baseline", "hosts", None).await.unwrap();

        assert_eq!(snapshot.facts.len(), 2);
        assert_eq!(snapshot.config_hashes["web2"].len(), 2);
        assert!(snapshot.services["web2"].contains("redis.service"));
        assert!(snapshot.id.has_name("baseline"));

        // persisted and reloadable
        let loaded = capturer.store().load(&snapshot.id).unwrap();
        assert_eq!(loaded, snapshot);
    }

    #[tokio::test]
    async fn test_partial_capture_is_still_valid() {
        let dir = tempfile::tempdir().unwrap();
        // fact query fails, the other two succeed
        let gateway = Arc::new(ScriptedGateway::with_reports([
            ExecutionReport::failure(4, "unreachable"),
            ExecutionReport::success(CONFIG_STDOUT),
            ExecutionReport::success(SERVICE_STDOUT),
        ]));
        let capturer = SnapshotCapturer::new(gateway, SnapshotStore::new(dir.path()));

        let snapshot = capturer.capture("partial", "hosts", None).await.unwrap();

        assert!(snapshot.facts.is_empty());
        assert!(!snapshot.config_hashes.is_empty());
        assert!(!snapshot.services.is_empty());
        assert!(!snapshot.is_empty());
    }
}
