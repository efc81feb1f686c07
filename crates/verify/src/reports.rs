//! Persistence for verification reports.

use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::info;

use crate::error::{Result, VerifyError};

/// Write a report as a timestamped JSON artifact under `dir`, returning
/// the file path, e.g. `idempotence_report_20241201_120000.json`.
pub fn save_report<T: serde::Serialize>(dir: &Path, prefix: &str, report: &T) -> Result<PathBuf> {
    std::fs::create_dir_all(dir).map_err(|source| VerifyError::ReportWrite {
        path: dir.to_path_buf(),
        source,
    })?;

    let path = dir.join(format!(
        "{}_report_{}.json",
        prefix,
        Utc::now().format("%Y%m%d_%H%M%S")
    ));
    let contents = serde_json::to_string_pretty(report)?;
    std::fs::write(&path, contents).map_err(|source| VerifyError::ReportWrite {
        path: path.clone(),
        source,
    })?;

    info!(path = %path.display(), "report saved");
    Ok(path)
}
