//! Structural diff between two snapshots.
//!
//! Each category walks the union of host keys on both sides, then the
//! union of item keys per host: an item only in `before` is a removal,
//! only in `after` an addition, in both with different values a
//! modification. Services are presence-only, so they yield start/stop
//! transitions instead.

use std::collections::BTreeSet;

use convoy_types::{
    ChangeKind, DiffResult, FieldChange, FileChange, ServiceChange, ServiceTransition, Snapshot,
    FACT_DIFF_FIELDS,
};

/// Compute the structural difference between two snapshots.
pub fn diff(before: &Snapshot, after: &Snapshot) -> DiffResult {
    DiffResult {
        facts: diff_facts(before, after),
        configs: diff_configs(before, after),
        services: diff_services(before, after),
    }
}

fn union_hosts<'a, T>(
    before: &'a std::collections::BTreeMap<String, T>,
    after: &'a std::collections::BTreeMap<String, T>,
) -> BTreeSet<&'a str> {
    before
        .keys()
        .chain(after.keys())
        .map(String::as_str)
        .collect()
}

/// Fact comparison is restricted to the operational allow-list; diffing the
/// full fact set would drown real changes in noise from ephemeral fields.
fn diff_facts(before: &Snapshot, after: &Snapshot) -> Vec<FieldChange> {
    let mut changes = Vec::new();

    for host in union_hosts(&before.facts, &after.facts) {
        let before_facts = before.facts.get(host);
        let after_facts = after.facts.get(host);

        for field in FACT_DIFF_FIELDS {
            let before_value = before_facts.and_then(|facts| facts.get(*field)).cloned();
            let after_value = after_facts.and_then(|facts| facts.get(*field)).cloned();

            if before_value != after_value {
                changes.push(FieldChange {
                    host: host.to_string(),
                    field: field.to_string(),
                    before: before_value,
                    after: after_value,
                });
            }
        }
    }

    changes
}

fn diff_configs(before: &Snapshot, after: &Snapshot) -> Vec<FileChange> {
    let mut changes = Vec::new();
    let empty = std::collections::BTreeMap::new();

    for host in union_hosts(&before.config_hashes, &after.config_hashes) {
        let before_hashes = before.config_hashes.get(host).unwrap_or(&empty);
        let after_hashes = after.config_hashes.get(host).unwrap_or(&empty);

        let files: BTreeSet<&str> = before_hashes
            .keys()
            .chain(after_hashes.keys())
            .map(String::as_str)
            .collect();

        for file in files {
            let before_hash = before_hashes.get(file);
            let after_hash = after_hashes.get(file);

            let change = match (before_hash, after_hash) {
                (None, Some(_)) => ChangeKind::Added,
                (Some(_), None) => ChangeKind::Removed,
                (Some(b), Some(a)) if b != a => ChangeKind::Modified,
                _ => continue,
            };

            changes.push(FileChange {
                host: host.to_string(),
                file: file.to_string(),
                change,
                before_hash: before_hash.cloned(),
                after_hash: after_hash.cloned(),
            });
        }
    }

    changes
}

fn diff_services(before: &Snapshot, after: &Snapshot) -> Vec<ServiceChange> {
    let mut changes = Vec::new();
    let empty = BTreeSet::new();

    for host in union_hosts(&before.services, &after.services) {
        let before_services = before.services.get(host).unwrap_or(&empty);
        let after_services = after.services.get(host).unwrap_or(&empty);

        for service in after_services.difference(before_services) {
            changes.push(ServiceChange {
                host: host.to_string(),
                service: service.clone(),
                change: ServiceTransition::Started,
            });
        }
        for service in before_services.difference(after_services) {
            changes.push(ServiceChange {
                host: host.to_string(),
                service: service.clone(),
                change: ServiceTransition::Stopped,
            });
        }
    }

    changes
}
