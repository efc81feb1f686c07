//! Check-mode change verification.
//!
//! Runs the executor in check+diff mode to find changes the fleet would
//! undergo that are not yet captured in code, typically manual debugging
//! edits that never made it back into the playbooks.

use std::time::Duration;

use tracing::{info, instrument};

use convoy_executor::{parser, ExecSpec, ExecutorGateway};
use convoy_types::CheckModeReport;

use crate::error::Result;

/// How many change summaries a report carries for display.
const SUMMARY_LIMIT: usize = 5;

/// Time budget for the check-mode execution.
const CHECK_TIMEOUT: Duration = Duration::from_secs(300);

/// Run a playbook in check+diff mode and summarize what it would change.
#[instrument(skip(gateway, playbook, inventory))]
pub async fn verify_check_mode<G: ExecutorGateway>(
    gateway: &G,
    playbook: &str,
    inventory: &str,
) -> Result<CheckModeReport> {
    let spec = ExecSpec::CheckMode {
        playbook: playbook.to_string(),
        inventory: inventory.to_string(),
        extra_vars: Default::default(),
    };

    let report = gateway.execute(&spec, CHECK_TIMEOUT, None).await?;

    let has_untracked_changes = parser::has_check_mode_diffs(&report.stdout);
    let changes = parser::parse_check_mode_changes(&report.stdout);

    info!(
        %playbook,
        passed = report.succeeded(),
        untracked = has_untracked_changes,
        changes = changes.len(),
        "check-mode verification finished"
    );

    let recommendation = if has_untracked_changes {
        "Review detected changes and update the deployment code".to_string()
    } else {
        "No untracked changes detected".to_string()
    };

    Ok(CheckModeReport {
        playbook: playbook.to_string(),
        passed: report.succeeded(),
        has_untracked_changes,
        changes_detected: changes.len(),
        change_summary: changes.into_iter().take(SUMMARY_LIMIT).collect(),
        recommendation,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use convoy_executor::{ExecutionReport, ScriptedGateway};

    #[tokio::test]
    async fn test_clean_check_mode_run() {
        let gateway = ScriptedGateway::with_reports([ExecutionReport::success(
            "PLAY [all] ****\nok: [web1]\n",
        )]);

        let report = verify_check_mode(&gateway, "site.yml", "hosts")
            .await
            .unwrap();

        assert!(report.passed);
        assert!(!report.has_untracked_changes);
        assert_eq!(report.changes_detected, 0);
        assert_eq!(report.recommendation, "No untracked changes detected");
    }

    #[tokio::test]
    async fn test_untracked_changes_reported() {
        let stdout = "\
TASK [write motd] ****
--- before: /etc/motd
+++ after: /etc/motd
@@ -1 +1 @@
-old greeting
+new greeting
changed: [web1]
";
        let gateway = ScriptedGateway::with_reports([ExecutionReport::success(stdout)]);

        let report = verify_check_mode(&gateway, "site.yml", "hosts")
            .await
            .unwrap();

        assert!(report.has_untracked_changes);
        assert!(report.changes_detected >= 1);
        assert!(report.recommendation.contains("update the deployment code"));
    }
}
