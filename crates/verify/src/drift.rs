//! Drift detection against a trusted baseline.
//!
//! Drift is orthogonal to any deployment run: it answers whether the fleet
//! has diverged from a previously captured baseline, whoever or whatever
//! caused the divergence. The comparison is the snapshot differ's; drift
//! adds severity. A service that disappeared or a config file that was
//! rewritten is HIGH; new services and added/removed config files are
//! MEDIUM.

use chrono::Utc;
use tracing::{info, instrument};

use convoy_snapshot::diff;
use convoy_types::{
    ChangeKind, DriftItem, DriftReport, DriftSummary, ServiceTransition, Severity, Snapshot,
};

/// Compare a live snapshot against the trusted baseline.
#[instrument(skip(baseline, current), fields(baseline = %baseline.id, current = %current.id))]
pub fn detect_drift(baseline: &Snapshot, current: &Snapshot) -> DriftReport {
    let changes = diff(baseline, current);
    let mut items = Vec::new();

    for change in changes.configs {
        let severity = match change.change {
            ChangeKind::Modified => Severity::High,
            ChangeKind::Added | ChangeKind::Removed => Severity::Medium,
        };
        items.push(DriftItem::Config {
            host: change.host,
            file: change.file,
            change: change.change,
            baseline_hash: change.before_hash,
            current_hash: change.after_hash,
            severity,
        });
    }

    for change in changes.services {
        let severity = match change.change {
            ServiceTransition::Stopped => Severity::High,
            ServiceTransition::Started => Severity::Medium,
        };
        items.push(DriftItem::Service {
            host: change.host,
            service: change.service,
            change: change.change,
            severity,
        });
    }

    let summary = summarize(&items);
    info!(
        total = summary.total,
        high = summary.high,
        "drift detection finished"
    );

    DriftReport {
        baseline: baseline.id.clone(),
        current: current.id.clone(),
        generated_at: Utc::now(),
        drift_detected: !items.is_empty(),
        items,
        summary,
    }
}

fn summarize(items: &[DriftItem]) -> DriftSummary {
    DriftSummary {
        total: items.len(),
        config: items
            .iter()
            .filter(|item| matches!(item, DriftItem::Config { .. }))
            .count(),
        service: items
            .iter()
            .filter(|item| matches!(item, DriftItem::Service { .. }))
            .count(),
        high: items
            .iter()
            .filter(|item| item.severity() == Severity::High)
            .count(),
        medium: items
            .iter()
            .filter(|item| item.severity() == Severity::Medium)
            .count(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use convoy_types::SnapshotId;

    fn snapshot(label: &str) -> Snapshot {
        let at = Utc::now();
        Snapshot::new(SnapshotId::new(label, at), None, at)
    }

    #[test]
    fn test_removed_service_is_high_severity() {
        let mut baseline = snapshot("baseline");
        baseline
            .services
            .entry("web1".to_string())
            .or_default()
            .insert("nginx.service".to_string());
        let current = snapshot("current");

        let report = detect_drift(&baseline, &current);
        assert!(report.drift_detected);
        assert_eq!(report.items.len(), 1);
        assert_eq!(report.items[0].severity(), Severity::High);
        assert_eq!(report.summary.high, 1);
        assert_eq!(report.summary.service, 1);
    }

    #[test]
    fn test_added_config_is_medium_severity() {
        let baseline = snapshot("baseline");
        let mut current = snapshot("current");
        current
            .config_hashes
            .entry("web1".to_string())
            .or_default()
            .insert("/etc/new.conf".to_string(), "abc".to_string());

        let report = detect_drift(&baseline, &current);
        assert_eq!(report.items.len(), 1);
        assert_eq!(report.items[0].severity(), Severity::Medium);
        assert_eq!(report.items[0].item(), "/etc/new.conf");
    }

    #[test]
    fn test_modified_config_is_high_severity() {
        let mut baseline = snapshot("baseline");
        baseline
            .config_hashes
            .entry("web1".to_string())
            .or_default()
            .insert("/etc/a.conf".to_string(), "aaa".to_string());
        let mut current = snapshot("current");
        current
            .config_hashes
            .entry("web1".to_string())
            .or_default()
            .insert("/etc/a.conf".to_string(), "bbb".to_string());

        let report = detect_drift(&baseline, &current);
        assert_eq!(report.items.len(), 1);
        match &report.items[0] {
            DriftItem::Config {
                severity,
                baseline_hash,
                current_hash,
                ..
            } => {
                assert_eq!(*severity, Severity::High);
                assert_eq!(baseline_hash.as_deref(), Some("aaa"));
                assert_eq!(current_hash.as_deref(), Some("bbb"));
            }
            other => panic!("unexpected item: {:?}", other),
        }
    }

    #[test]
    fn test_unchanged_fleet_has_no_drift() {
        let mut baseline = snapshot("baseline");
        baseline
            .services
            .entry("web1".to_string())
            .or_default()
            .insert("nginx.service".to_string());
        let mut current = snapshot("current");
        current
            .services
            .entry("web1".to_string())
            .or_default()
            .insert("nginx.service".to_string());

        let report = detect_drift(&baseline, &current);
        assert!(!report.drift_detected);
        assert_eq!(report.summary.total, 0);
    }
}
