//! Idempotence analysis over repeated executions.
//!
//! Runs the same playbook N times, capturing a snapshot before and after
//! each execution, and judges the deployment idempotent only when every
//! iteration exits zero and every iteration's change-key set equals
//! iteration 1's. The strict equality rule is deliberate: it also accepts
//! a deployment whose steady state always reports the same benign changes,
//! while rejecting one that settles down after the first run. The looser
//! settle-after-first reading is available as an explicit policy, never as
//! a default.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{info, instrument, warn};

use convoy_executor::{parser, ExecSpec, ExecutorGateway};
use convoy_snapshot::{diff, SnapshotCapturer, SnapshotStore};
use convoy_types::{
    IdempotenceIssue, IdempotencePolicy, IdempotenceReport, IterationRecord, Severity,
};

use crate::error::Result;

/// Time budget for each targeted execution.
const EXECUTION_TIMEOUT: Duration = Duration::from_secs(300);

/// Drives repeated executions of one playbook and judges convergence.
pub struct IdempotenceAnalyzer<G> {
    gateway: Arc<G>,
    capturer: SnapshotCapturer<G>,
    policy: IdempotencePolicy,
}

impl<G: ExecutorGateway> IdempotenceAnalyzer<G> {
    pub fn new(gateway: Arc<G>, store: SnapshotStore) -> Self {
        Self {
            capturer: SnapshotCapturer::new(gateway.clone(), store),
            gateway,
            policy: IdempotencePolicy::default(),
        }
    }

    /// Opt in to a non-default verdict policy.
    pub fn with_policy(mut self, policy: IdempotencePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Execute the playbook `iterations` times and report on idempotence.
    ///
    /// Each iteration is a single targeted execution, not a run through the
    /// multi-stage controller: the question here is what one playbook does
    /// to an already-converged fleet.
    #[instrument(skip(self, playbook, inventory))]
    pub async fn test_idempotence(
        &self,
        playbook: &str,
        inventory: &str,
        iterations: u32,
    ) -> Result<IdempotenceReport> {
        info!(%playbook, iterations, "starting idempotence test");

        let spec = ExecSpec::Playbook {
            playbook: playbook.to_string(),
            inventory: inventory.to_string(),
            extra_vars: Default::default(),
        };

        let mut runs = Vec::new();

        for iteration in 1..=iterations {
            info!(iteration, iterations, "idempotence iteration");

            let pre = self
                .capturer
                .capture(&format!("iter_{}_pre", iteration), inventory, None)
                .await?;

            let report = self.gateway.execute(&spec, EXECUTION_TIMEOUT, None).await?;

            let post = self
                .capturer
                .capture(&format!("iter_{}_post", iteration), inventory, None)
                .await?;

            let changes = diff(&pre, &post);
            let changed_tasks = parser::changed_tasks(&report.stdout);

            if report.succeeded() {
                info!(
                    iteration,
                    changes = changes.total_changes(),
                    tasks_changed = changed_tasks.len(),
                    "iteration completed"
                );
            } else {
                warn!(
                    iteration,
                    exit_code = report.exit_code,
                    "iteration failed"
                );
            }

            runs.push(IterationRecord {
                iteration,
                exit_code: report.exit_code,
                succeeded: report.succeeded(),
                changes,
                changed_tasks,
            });
        }

        let issues = analyze(&runs, self.policy);
        let consistency_score = score(&issues);
        let idempotent = issues.is_empty();
        let recommendations = recommend(&issues);

        Ok(IdempotenceReport {
            playbook: playbook.to_string(),
            inventory: inventory.to_string(),
            iterations,
            generated_at: Utc::now(),
            runs,
            idempotent,
            consistency_score,
            issues,
            recommendations,
        })
    }
}

/// Coarse linear penalty: 10 points per issue, floored at zero.
fn score(issues: &[IdempotenceIssue]) -> u8 {
    100u8.saturating_sub((issues.len() as u8).saturating_mul(10))
}

fn analyze(runs: &[IterationRecord], policy: IdempotencePolicy) -> Vec<IdempotenceIssue> {
    let mut issues = Vec::new();

    let failed: Vec<u32> = runs
        .iter()
        .filter(|run| !run.succeeded)
        .map(|run| run.iteration)
        .collect();
    if !failed.is_empty() {
        issues.push(IdempotenceIssue::ExecutionFailure { iterations: failed });
    }

    if runs.len() > 1 {
        let first_changes = runs[0].changes.change_keys();
        let first_tasks = runs[0].changed_tasks.clone();

        for run in &runs[1..] {
            let expected_changes = match policy {
                IdempotencePolicy::Strict => first_changes.clone(),
                IdempotencePolicy::SettleAfterFirst => BTreeSet::new(),
            };
            let expected_tasks = match policy {
                IdempotencePolicy::Strict => first_tasks.clone(),
                IdempotencePolicy::SettleAfterFirst => BTreeSet::new(),
            };

            let changes = run.changes.change_keys();
            if changes != expected_changes {
                issues.push(IdempotenceIssue::InconsistentChanges {
                    iteration: run.iteration,
                    differences: symmetric_difference(&changes, &expected_changes),
                });
            }

            if run.changed_tasks != expected_tasks {
                issues.push(IdempotenceIssue::InconsistentTasks {
                    iteration: run.iteration,
                    differences: symmetric_difference(&run.changed_tasks, &expected_tasks),
                });
            }
        }
    }

    issues
}

fn symmetric_difference(a: &BTreeSet<String>, b: &BTreeSet<String>) -> Vec<String> {
    a.symmetric_difference(b).cloned().collect()
}

fn recommend(issues: &[IdempotenceIssue]) -> Vec<String> {
    let mut recommendations = Vec::new();

    if issues
        .iter()
        .any(|issue| matches!(issue, IdempotenceIssue::ExecutionFailure { .. }))
    {
        recommendations
            .push("Fix playbook execution failures before testing idempotence".to_string());
    }
    if issues
        .iter()
        .any(|issue| matches!(issue, IdempotenceIssue::InconsistentChanges { .. }))
    {
        recommendations.push(
            "Review playbook for non-idempotent operations (e.g. commands without proper conditionals)"
                .to_string(),
        );
    }
    if issues
        .iter()
        .any(|issue| matches!(issue, IdempotenceIssue::InconsistentTasks { .. }))
    {
        recommendations
            .push("Ensure tasks use proper when conditions and check modes".to_string());
    }
    if issues.is_empty() {
        recommendations.push(
            "Playbook appears to be idempotent - consider adding to production pipeline"
                .to_string(),
        );
    }

    recommendations
}

/// Highest severity among a report's issues, if any.
pub fn worst_severity(report: &IdempotenceReport) -> Option<Severity> {
    report.issues.iter().map(IdempotenceIssue::severity).max()
}

#[cfg(test)]
mod tests {
    use super::*;
    use convoy_executor::{ExecutionReport, ScriptedGateway};

    const EMPTY_FACTS: &str = "";
    const EMPTY_SERVICES: &str = "";

    fn configs_stdout(hash: &str) -> String {
        format!(
            "web1 | SUCCESS | rc=0 >>\n{}  /etc/a.conf\n",
            hash
        )
    }

    /// One capture is three gateway queries in a fixed order:
    /// facts, config hashes, services.
    fn capture_reports(config_hash: &str) -> [ExecutionReport; 3] {
        [
            ExecutionReport::success(EMPTY_FACTS),
            ExecutionReport::success(configs_stdout(config_hash)),
            ExecutionReport::success(EMPTY_SERVICES),
        ]
    }

    fn analyzer_in(
        dir: &tempfile::TempDir,
        gateway: Arc<ScriptedGateway>,
    ) -> IdempotenceAnalyzer<ScriptedGateway> {
        IdempotenceAnalyzer::new(gateway, SnapshotStore::new(dir.path()))
    }

    #[tokio::test]
    async fn test_converging_then_silent_run_is_not_idempotent_under_strict_rule() {
        let dir = tempfile::tempdir().unwrap();
        let gateway = Arc::new(ScriptedGateway::new());

        // Iteration 1: config changes aaa -> bbb, one changed task.
        for report in capture_reports("aaa") {
            gateway.enqueue(report);
        }
        gateway.enqueue(ExecutionReport::success(
            "TASK [write config] ****\nchanged: [web1]\n",
        ));
        for report in capture_reports("bbb") {
            gateway.enqueue(report);
        }

        // Iteration 2: nothing changes.
        for report in capture_reports("bbb") {
            gateway.enqueue(report);
        }
        gateway.enqueue(ExecutionReport::success("TASK [write config] ****\nok: [web1]\n"));
        for report in capture_reports("bbb") {
            gateway.enqueue(report);
        }

        let analyzer = analyzer_in(&dir, gateway);
        let report = analyzer
            .test_idempotence("site.yml", "hosts", 2)
            .await
            .unwrap();

        // Iteration 1 changed {web1:config:/etc/a.conf}, iteration 2 {}:
        // inconsistent under the strict equality rule.
        assert!(!report.idempotent);
        assert_eq!(report.runs[0].changes.total_changes(), 1);
        assert_eq!(report.runs[1].changes.total_changes(), 0);
        assert_eq!(report.issues.len(), 2); // changes + changed-task drift
        assert_eq!(report.consistency_score, 80);
        assert!(report
            .issues
            .iter()
            .any(|issue| matches!(issue, IdempotenceIssue::InconsistentChanges { iteration: 2, .. })));
    }

    #[tokio::test]
    async fn test_stable_change_set_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let gateway = Arc::new(ScriptedGateway::new());

        // Both iterations report the same benign change set.
        for _ in 0..2 {
            for report in capture_reports("aaa") {
                gateway.enqueue(report);
            }
            gateway.enqueue(ExecutionReport::success(
                "TASK [touch timestamp] ****\nchanged: [web1]\n",
            ));
            for report in capture_reports("bbb") {
                gateway.enqueue(report);
            }
        }

        let analyzer = analyzer_in(&dir, gateway);
        let report = analyzer
            .test_idempotence("site.yml", "hosts", 2)
            .await
            .unwrap();

        assert!(report.idempotent);
        assert_eq!(report.consistency_score, 100);
        assert_eq!(
            report.recommendations,
            vec!["Playbook appears to be idempotent - consider adding to production pipeline"]
        );
    }

    #[tokio::test]
    async fn test_failed_iteration_is_high_severity() {
        let dir = tempfile::tempdir().unwrap();
        let gateway = Arc::new(ScriptedGateway::new());

        for report in capture_reports("aaa") {
            gateway.enqueue(report);
        }
        gateway.enqueue(ExecutionReport::failure(2, "task error"));
        for report in capture_reports("aaa") {
            gateway.enqueue(report);
        }

        let analyzer = analyzer_in(&dir, gateway);
        let report = analyzer
            .test_idempotence("site.yml", "hosts", 1)
            .await
            .unwrap();

        assert!(!report.idempotent);
        assert_eq!(
            report.issues,
            vec![IdempotenceIssue::ExecutionFailure {
                iterations: vec![1]
            }]
        );
        assert_eq!(worst_severity(&report), Some(Severity::High));
        assert!(report.recommendations[0].contains("execution failures"));
    }

    #[tokio::test]
    async fn test_settle_after_first_policy_accepts_quiet_second_run() {
        let dir = tempfile::tempdir().unwrap();
        let gateway = Arc::new(ScriptedGateway::new());

        // Iteration 1 converges, iteration 2 is silent.
        for report in capture_reports("aaa") {
            gateway.enqueue(report);
        }
        gateway.enqueue(ExecutionReport::success(
            "TASK [write config] ****\nchanged: [web1]\n",
        ));
        for report in capture_reports("bbb") {
            gateway.enqueue(report);
        }
        for report in capture_reports("bbb") {
            gateway.enqueue(report);
        }
        gateway.enqueue(ExecutionReport::success("ok: [web1]\n"));
        for report in capture_reports("bbb") {
            gateway.enqueue(report);
        }

        let analyzer = analyzer_in(&dir, gateway)
            .with_policy(IdempotencePolicy::SettleAfterFirst);
        let report = analyzer
            .test_idempotence("site.yml", "hosts", 2)
            .await
            .unwrap();

        assert!(report.idempotent);
    }
}
