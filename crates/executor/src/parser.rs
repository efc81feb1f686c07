//! Parser for the executor's line-oriented text output.
//!
//! All format-sensitive logic lives here so that a future structured-output
//! mode can replace this module without touching the controller, differ or
//! analyzer.
//!
//! Accepted grammar, line by line:
//!
//! - Host block headers open a per-host block and attribute all following
//!   content lines to that host until the next header:
//!   - `<host> | SUCCESS | rc=0 >>`: shell-style block, content follows
//!     on subsequent lines.
//!   - `<host> | SUCCESS => {`: JSON payload block; the remainder of the
//!     header line is the first payload line.
//!   - `<host> | FAILED ...` / `<host> | UNREACHABLE! ...`: closes any open
//!     block; the failed host contributes no content.
//! - `<hash>  <path>`: one checksum entry (md5sum convention, two-space
//!   separator) inside a shell block.
//! - `<unit>.service ... running ...`: one running service unit inside a
//!   shell block; the first whitespace-separated field is the unit name.
//! - `TASK [<name>]`: playbook task header; tracked for changed-task
//!   attribution.
//! - `changed: [<host>]`: the current task changed state on `<host>`;
//!   `<host> | CHANGED => ...` is the ad-hoc equivalent.
//! - stderr containing `timeout` / `timed out` (case-insensitive) marks a
//!   timeout-class failure.
//! - `--- `, `+++ ` and `@@` prefixes are unified-diff markers emitted in
//!   check mode.
//!
//! No fixed line count per host is assumed anywhere.

use std::collections::{BTreeMap, BTreeSet};

use convoy_types::{CheckModeChange, FactMap};
use tracing::warn;

/// How a host block header reported the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HeaderKind {
    /// `| SUCCESS |` shell-style block.
    Shell,
    /// `| SUCCESS =>` JSON payload block.
    Json,
    /// `FAILED` / `UNREACHABLE`: host produced no usable content.
    Failed,
}

/// Parse a host block header line, if this line is one.
fn host_header(line: &str) -> Option<(&str, HeaderKind, Option<&str>)> {
    let (host, rest) = line.split_once(" | ")?;
    let host = host.trim();
    if host.is_empty() || host.contains(char::is_whitespace) {
        return None;
    }
    if rest.starts_with("SUCCESS | ") {
        Some((host, HeaderKind::Shell, None))
    } else if let Some(payload) = rest.strip_prefix("SUCCESS => ") {
        Some((host, HeaderKind::Json, Some(payload)))
    } else if rest.starts_with("FAILED") || rest.starts_with("UNREACHABLE") {
        Some((host, HeaderKind::Failed, None))
    } else if rest.starts_with("CHANGED => ") {
        // Ad-hoc changed result; treated as a JSON block for parsing purposes.
        Some((host, HeaderKind::Json, rest.strip_prefix("CHANGED => ")))
    } else {
        None
    }
}

/// Split output into per-host content blocks.
///
/// Content lines before any header, and blocks for failed or unreachable
/// hosts, are dropped.
pub fn parse_host_blocks(output: &str) -> BTreeMap<String, Vec<String>> {
    let mut blocks: BTreeMap<String, Vec<String>> = BTreeMap::new();
    let mut current: Option<String> = None;

    for line in output.lines() {
        if let Some((host, kind, payload)) = host_header(line) {
            match kind {
                HeaderKind::Failed => current = None,
                HeaderKind::Shell => {
                    blocks.entry(host.to_string()).or_default();
                    current = Some(host.to_string());
                }
                HeaderKind::Json => {
                    let entry = blocks.entry(host.to_string()).or_default();
                    if let Some(payload) = payload {
                        entry.push(payload.to_string());
                    }
                    current = Some(host.to_string());
                }
            }
        } else if let Some(host) = &current {
            if !line.trim().is_empty() {
                blocks
                    .entry(host.clone())
                    .or_default()
                    .push(line.to_string());
            }
        }
    }

    blocks
}

/// Per-host configuration file hashes from checksum-listing output.
pub fn parse_config_hashes(output: &str) -> BTreeMap<String, BTreeMap<String, String>> {
    parse_host_blocks(output)
        .into_iter()
        .map(|(host, lines)| {
            let hashes = lines
                .iter()
                .filter_map(|line| {
                    let (hash, path) = line.trim().split_once("  ")?;
                    let hash = hash.trim();
                    // checksum fields are hex strings, never contain spaces
                    if hash.is_empty() || hash.contains(char::is_whitespace) {
                        return None;
                    }
                    Some((path.trim().to_string(), hash.to_string()))
                })
                .collect();
            (host, hashes)
        })
        .collect()
}

/// Per-host running service sets from unit-listing output.
pub fn parse_running_services(output: &str) -> BTreeMap<String, BTreeSet<String>> {
    parse_host_blocks(output)
        .into_iter()
        .map(|(host, lines)| {
            let services = lines
                .iter()
                .filter(|line| line.contains(".service") && line.contains("running"))
                .filter_map(|line| line.split_whitespace().next())
                .map(|unit| unit.trim_start_matches('●').to_string())
                .filter(|unit| unit.ends_with(".service"))
                .collect();
            (host, services)
        })
        .collect()
}

/// Per-host fact maps from fact-gathering output.
///
/// Each host block is expected to hold one JSON object; an `ansible_facts`
/// wrapper is unwrapped when present. Hosts whose payload does not parse
/// are skipped with a warning rather than failing the capture.
pub fn parse_host_facts(output: &str) -> BTreeMap<String, FactMap> {
    let mut facts = BTreeMap::new();

    for (host, lines) in parse_host_blocks(output) {
        let payload = lines.join("\n");
        match serde_json::from_str::<serde_json::Value>(&payload) {
            Ok(value) => {
                let object = match value.get("ansible_facts") {
                    Some(inner) => inner.clone(),
                    None => value,
                };
                match object {
                    serde_json::Value::Object(map) => {
                        facts.insert(host, map.into_iter().collect());
                    }
                    _ => warn!(host = %host, "fact payload is not a JSON object"),
                }
            }
            Err(error) => warn!(host = %host, %error, "unparseable fact payload"),
        }
    }

    facts
}

/// Extract `host:task` keys for every task the executor reported as changed.
pub fn changed_tasks(output: &str) -> BTreeSet<String> {
    let mut tasks = BTreeSet::new();
    let mut current_task: Option<String> = None;

    for line in output.lines() {
        let trimmed = line.trim();

        if let Some(rest) = trimmed.strip_prefix("TASK [") {
            if let Some(name) = rest.split(']').next() {
                current_task = Some(name.to_string());
            }
            continue;
        }

        if let Some(rest) = trimmed.strip_prefix("changed:") {
            if let Some(host) = rest.trim().strip_prefix('[').and_then(|r| r.split(']').next()) {
                let task = current_task.as_deref().unwrap_or("unknown");
                tasks.insert(format!("{}:{}", host, task));
            }
            continue;
        }

        // Ad-hoc form: `<host> | CHANGED => ...`
        if let Some((host, rest)) = trimmed.split_once(" | ") {
            if rest.starts_with("CHANGED") {
                let task = current_task.as_deref().unwrap_or("unknown");
                tasks.insert(format!("{}:{}", host, task));
            }
        }
    }

    tasks
}

/// Whether stderr indicates a timeout-class failure worth retrying with a
/// bigger budget.
pub fn indicates_timeout(stderr: &str) -> bool {
    let lower = stderr.to_lowercase();
    lower.contains("timed out") || lower.contains("timeout")
}

/// Whether check-mode output contains unified-diff markers, i.e. the
/// playbook would change something not yet captured in code.
pub fn has_check_mode_diffs(stdout: &str) -> bool {
    stdout.lines().any(|line| {
        line.starts_with("--- ") || line.starts_with("+++ ") || line.starts_with("@@")
    })
}

/// Summarize the changes a check-mode run reported.
pub fn parse_check_mode_changes(stdout: &str) -> Vec<CheckModeChange> {
    let mut changes = Vec::new();
    let mut current_file: Option<String> = None;

    for line in stdout.lines() {
        if line.starts_with("--- ") || line.starts_with("+++ ") {
            let name = line
                .split_once('\t')
                .map(|(head, _)| head)
                .unwrap_or(line)
                .trim_start_matches("--- ")
                .trim_start_matches("+++ ");
            current_file = Some(name.to_string());
        } else if line.starts_with("@@") {
            if let Some(file) = &current_file {
                changes.push(CheckModeChange {
                    file: file.clone(),
                    change_type: "content_diff".to_string(),
                    summary: line.trim().to_string(),
                });
            }
        } else if line.trim_start().starts_with("changed:") {
            changes.push(CheckModeChange {
                file: current_file.clone().unwrap_or_else(|| "unknown".to_string()),
                change_type: "state_change".to_string(),
                summary: line.trim().to_string(),
            });
        }
    }

    changes
}

#[cfg(test)]
mod tests {
    use super::*;

    const SHELL_OUTPUT: &str = "\
web1 | SUCCESS | rc=0 >>
d41d8cd98f00b204e9800998ecf8427e  /etc/nginx/nginx.conf
9e107d9d372bb6826bd81d3542a419d6  /etc/ssh/sshd_config
web2 | SUCCESS | rc=0 >>
d41d8cd98f00b204e9800998ecf8427e  /etc/nginx/nginx.conf
db1 | FAILED | rc=1 >>
find: permission denied
";

    #[test]
    fn test_host_blocks_uneven_line_counts() {
        let blocks = parse_host_blocks(SHELL_OUTPUT);
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks["web1"].len(), 2);
        assert_eq!(blocks["web2"].len(), 1);
        // failed host contributes nothing, and its content is not
        // attributed to the previous block
        assert!(!blocks.contains_key("db1"));
        assert!(!blocks["web2"].iter().any(|l| l.contains("denied")));
    }

    #[test]
    fn test_config_hash_parsing() {
        let hashes = parse_config_hashes(SHELL_OUTPUT);
        assert_eq!(
            hashes["web1"]["/etc/nginx/nginx.conf"],
            "d41d8cd98f00b204e9800998ecf8427e"
        );
        assert_eq!(hashes["web1"].len(), 2);
        assert_eq!(hashes["web2"].len(), 1);
    }

    #[test]
    fn test_running_services_parsing() {
        let output = "\
web1 | SUCCESS | rc=0 >>
nginx.service     loaded active running   A high performance web server
sshd.service      loaded active running   OpenSSH server daemon
cron.service      loaded active exited    Regular background jobs
UNIT              LOAD   ACTIVE SUB       DESCRIPTION
";
        let services = parse_running_services(output);
        let web1 = &services["web1"];
        assert!(web1.contains("nginx.service"));
        assert!(web1.contains("sshd.service"));
        assert!(!web1.contains("cron.service"));
        assert_eq!(web1.len(), 2);
    }

    #[test]
    fn test_fact_parsing_unwraps_ansible_facts() {
        let output = r#"web1 | SUCCESS => {
    "ansible_facts": {
        "ansible_distribution": "Ubuntu",
        "ansible_processor_cores": 4
    },
    "changed": false
}
web2 | SUCCESS => {
    "ansible_distribution": "Debian"
}
"#;
        let facts = parse_host_facts(output);
        assert_eq!(facts["web1"]["ansible_distribution"], "Ubuntu");
        assert_eq!(facts["web1"]["ansible_processor_cores"], 4);
        assert_eq!(facts["web2"]["ansible_distribution"], "Debian");
    }

    #[test]
    fn test_changed_task_extraction() {
        let output = "\
PLAY [all] *********************************************************************

TASK [Gathering Facts] *********************************************************
ok: [web1]
ok: [web2]

TASK [install packages] ********************************************************
changed: [web1]
ok: [web2]

TASK [write config] ************************************************************
changed: [web1]
changed: [web2]
";
        let tasks = changed_tasks(output);
        assert_eq!(tasks.len(), 3);
        assert!(tasks.contains("web1:install packages"));
        assert!(tasks.contains("web1:write config"));
        assert!(tasks.contains("web2:write config"));
    }

    #[test]
    fn test_timeout_detection() {
        assert!(indicates_timeout("ERROR! Timeout (12s) waiting for connection"));
        assert!(indicates_timeout("operation timed out"));
        assert!(!indicates_timeout("ERROR! syntax error near line 3"));
    }

    #[test]
    fn test_check_mode_diff_markers() {
        let output = "\
--- before: /etc/motd
+++ after: /etc/motd
@@ -1 +1 @@
-old greeting
+new greeting
";
        assert!(has_check_mode_diffs(output));
        let changes = parse_check_mode_changes(output);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].change_type, "content_diff");
        assert!(changes[0].file.contains("/etc/motd"));
        assert!(!has_check_mode_diffs("ok: [web1]\n"));
    }
}
