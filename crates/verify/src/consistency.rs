//! Cross-host consistency checking.
//!
//! A fleet is consistent when every invariant fact field agrees across all
//! hosts and no host is missing a service that every other host runs. The
//! service heuristic uses the intersection of running-service sets as the
//! expected common baseline; an intentionally heterogeneous fleet will be
//! flagged, and that is accepted behavior.

use std::collections::BTreeMap;

use tracing::debug;

use convoy_types::{ConsistencyIssue, ConsistencyReport, Snapshot, CONSISTENCY_FIELDS};

/// Check one snapshot for cross-host agreement.
///
/// Consistency is undefined for fewer than two fact-bearing hosts; such a
/// snapshot yields an inconsistent report with an explicit finding.
pub fn check_consistency(snapshot: &Snapshot) -> ConsistencyReport {
    let hosts_checked = snapshot.facts.len();

    if hosts_checked < 2 {
        return ConsistencyReport {
            consistent: false,
            hosts_checked,
            issues: vec![ConsistencyIssue::InsufficientHosts {
                hosts: hosts_checked,
            }],
        };
    }

    let mut issues = Vec::new();

    // Invariant fields: group hosts by observed value.
    for field in CONSISTENCY_FIELDS {
        let mut values: BTreeMap<String, Vec<String>> = BTreeMap::new();

        for (host, facts) in &snapshot.facts {
            if let Some(value) = facts.get(*field) {
                values
                    .entry(render_value(value))
                    .or_default()
                    .push(host.clone());
            }
        }

        if values.len() > 1 {
            issues.push(ConsistencyIssue::FieldMismatch {
                field: field.to_string(),
                values,
            });
        }
    }

    // Services: each host is expected to run at least the intersection of
    // what every other host runs. A service missing from a single host
    // stays in that baseline and gets flagged.
    if snapshot.services.len() > 1 {
        for (host, services) in &snapshot.services {
            let mut others = snapshot
                .services
                .iter()
                .filter(|(other, _)| *other != host)
                .map(|(_, set)| set);

            let mut baseline = others.next().cloned().unwrap_or_default();
            for set in others {
                baseline = baseline.intersection(set).cloned().collect();
            }

            let missing: std::collections::BTreeSet<String> =
                baseline.difference(services).cloned().collect();
            if !missing.is_empty() {
                issues.push(ConsistencyIssue::MissingServices {
                    host: host.clone(),
                    missing,
                });
            }
        }
    }

    debug!(
        hosts = hosts_checked,
        issues = issues.len(),
        "consistency check finished"
    );

    ConsistencyReport {
        consistent: issues.is_empty(),
        hosts_checked,
        issues,
    }
}

/// Render a fact value the way operators read it: bare strings unquoted,
/// everything else as JSON.
fn render_value(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use convoy_types::SnapshotId;

    fn snapshot_with_facts(facts: &[(&str, &str, &str)]) -> Snapshot {
        let at = Utc::now();
        let mut snapshot = Snapshot::new(SnapshotId::new("check", at), None, at);
        for (host, field, value) in facts {
            snapshot
                .facts
                .entry(host.to_string())
                .or_default()
                .insert(field.to_string(), (*value).into());
        }
        snapshot
    }

    #[test]
    fn test_uniform_fleet_is_consistent() {
        let snapshot = snapshot_with_facts(&[
            ("h1", "ansible_distribution", "Ubuntu"),
            ("h2", "ansible_distribution", "Ubuntu"),
        ]);

        let report = check_consistency(&snapshot);
        assert!(report.consistent);
        assert_eq!(report.hosts_checked, 2);
        assert!(report.issues.is_empty());
    }

    #[test]
    fn test_split_field_reports_grouping() {
        let snapshot = snapshot_with_facts(&[
            ("h1", "ansible_distribution", "Ubuntu"),
            ("h2", "ansible_distribution", "CentOS"),
        ]);

        let report = check_consistency(&snapshot);
        assert!(!report.consistent);
        assert_eq!(report.issues.len(), 1);

        match &report.issues[0] {
            ConsistencyIssue::FieldMismatch { field, values } => {
                assert_eq!(field, "ansible_distribution");
                assert_eq!(values["Ubuntu"], vec!["h1".to_string()]);
                assert_eq!(values["CentOS"], vec!["h2".to_string()]);
            }
            other => panic!("unexpected issue: {:?}", other),
        }
    }

    #[test]
    fn test_single_host_is_undefined() {
        let snapshot = snapshot_with_facts(&[("h1", "ansible_distribution", "Ubuntu")]);

        let report = check_consistency(&snapshot);
        assert!(!report.consistent);
        assert_eq!(
            report.issues,
            vec![ConsistencyIssue::InsufficientHosts { hosts: 1 }]
        );
    }

    #[test]
    fn test_uniform_services_pass() {
        let mut snapshot = snapshot_with_facts(&[
            ("h1", "ansible_distribution", "Ubuntu"),
            ("h2", "ansible_distribution", "Ubuntu"),
        ]);

        for host in ["h1", "h2"] {
            for service in ["nginx.service", "sshd.service"] {
                snapshot
                    .services
                    .entry(host.to_string())
                    .or_default()
                    .insert(service.to_string());
            }
        }

        let report = check_consistency(&snapshot);
        assert!(report.consistent);
    }

    #[test]
    fn test_host_missing_universal_service_flagged() {
        let mut snapshot = snapshot_with_facts(&[
            ("h1", "ansible_distribution", "Ubuntu"),
            ("h2", "ansible_distribution", "Ubuntu"),
        ]);

        for host in ["h1", "h2"] {
            for service in ["nginx.service", "sshd.service"] {
                snapshot
                    .services
                    .entry(host.to_string())
                    .or_default()
                    .insert(service.to_string());
            }
        }
        // h3 lacks sshd, which every other host runs
        snapshot
            .services
            .entry("h3".to_string())
            .or_default()
            .insert("nginx.service".to_string());

        let report = check_consistency(&snapshot);
        assert!(!report.consistent);

        let missing: Vec<_> = report
            .issues
            .iter()
            .filter_map(|issue| match issue {
                ConsistencyIssue::MissingServices { host, missing } => {
                    Some((host.clone(), missing.clone()))
                }
                _ => None,
            })
            .collect();
        assert_eq!(missing.len(), 1);
        assert_eq!(missing[0].0, "h3");
        assert!(missing[0].1.contains("sshd.service"));
        // h1 and h2 are not flagged: the intersection of the other hosts'
        // sets never contains a service they lack
        assert!(!missing.iter().any(|(host, _)| host == "h1" || host == "h2"));
    }
}
