//! On-disk snapshot store.
//!
//! One directory per snapshot, named by the snapshot id
//! (`<name>_<timestamp>`), holding `facts/`, `configs/` and `services/`
//! subdirectories with one JSON file per host per category, plus a
//! `snapshot.json` rollup used as the reload path. Directories are uniquely
//! named, so independent captures never collide.

use std::path::{Path, PathBuf};

use tracing::debug;

use convoy_types::{Snapshot, SnapshotId};

use crate::error::{Result, SnapshotError};

const ROLLUP_FILE: &str = "snapshot.json";

/// Directory-backed store for snapshot artifacts.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    root: PathBuf,
}

impl SnapshotStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory a snapshot lives in.
    pub fn dir(&self, id: &SnapshotId) -> PathBuf {
        self.root.join(id.as_str())
    }

    /// Persist a snapshot: per-host category files plus the rollup.
    pub fn save(&self, snapshot: &Snapshot) -> Result<PathBuf> {
        let dir = self.dir(&snapshot.id);

        for (category, entries) in [
            ("facts", per_host_json(&snapshot.facts)?),
            ("configs", per_host_json(&snapshot.config_hashes)?),
            ("services", per_host_json(&snapshot.services)?),
        ] {
            let category_dir = dir.join(category);
            create_dir(&category_dir)?;
            for (host, contents) in entries {
                write_file(&category_dir.join(format!("{}.json", host)), &contents)?;
            }
        }

        let rollup = serde_json::to_string_pretty(snapshot).map_err(|source| {
            SnapshotError::Parse {
                path: dir.join(ROLLUP_FILE),
                source,
            }
        })?;
        write_file(&dir.join(ROLLUP_FILE), &rollup)?;

        debug!(id = %snapshot.id, dir = %dir.display(), "snapshot persisted");
        Ok(dir)
    }

    /// Load a snapshot by id.
    pub fn load(&self, id: &SnapshotId) -> Result<Snapshot> {
        let path = self.dir(id).join(ROLLUP_FILE);
        if !path.exists() {
            return Err(SnapshotError::NotFound {
                id: id.as_str().to_string(),
                root: self.root.clone(),
            });
        }

        let contents = std::fs::read_to_string(&path).map_err(|source| SnapshotError::Read {
            path: path.clone(),
            source,
        })?;
        serde_json::from_str(&contents).map_err(|source| SnapshotError::Parse { path, source })
    }

    /// All snapshot ids under the root, sorted ascending. The id format
    /// sorts chronologically within one snapshot name.
    pub fn list(&self) -> Result<Vec<SnapshotId>> {
        let entries = match std::fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(SnapshotError::Read {
                    path: self.root.clone(),
                    source,
                })
            }
        };

        let mut ids: Vec<SnapshotId> = entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().join(ROLLUP_FILE).exists())
            .filter_map(|entry| entry.file_name().into_string().ok())
            .map(SnapshotId::from_string)
            .collect();
        ids.sort();
        Ok(ids)
    }

    /// Most recent snapshot captured under the given name.
    pub fn latest(&self, name: &str) -> Result<Option<SnapshotId>> {
        Ok(self
            .list()?
            .into_iter()
            .filter(|id| id.has_name(name))
            .next_back())
    }
}

fn per_host_json<T: serde::Serialize>(
    map: &std::collections::BTreeMap<String, T>,
) -> Result<Vec<(String, String)>> {
    map.iter()
        .map(|(host, value)| {
            let contents = serde_json::to_string_pretty(value).map_err(|source| {
                SnapshotError::Parse {
                    path: PathBuf::from(host),
                    source,
                }
            })?;
            Ok((host.clone(), contents))
        })
        .collect()
}

fn create_dir(path: &Path) -> Result<()> {
    std::fs::create_dir_all(path).map_err(|source| SnapshotError::Write {
        path: path.to_path_buf(),
        source,
    })
}

fn write_file(path: &Path, contents: &str) -> Result<()> {
    std::fs::write(path, contents).map_err(|source| SnapshotError::Write {
        path: path.to_path_buf(),
        source,
    })
}
