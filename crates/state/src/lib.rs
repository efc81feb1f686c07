//! Persistent deployment state with backup-before-overwrite.
//!
//! The state file is the single source of truth for resumability. Every
//! save first renames the previous file to a `.backup` suffix (one
//! generation, not a log) and then writes the new state; a reset renames
//! the file to `.reset_backup` and leaves no active state behind.
//!
//! The store provides no locking. One controller per state file at a time
//! is the caller's responsibility; the controller runs stages sequentially
//! on a single task, so within one run there is never a second writer.

mod error;

use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::{debug, warn};

use convoy_types::DeploymentState;

pub use error::{Result, StateError};

/// File-backed store for [`DeploymentState`].
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The state file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the persisted state.
    ///
    /// A missing file is a fresh start and a corrupt file is treated the
    /// same way (with a warning): either yields an empty state. This
    /// operation never fails.
    pub fn load(&self) -> DeploymentState {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no prior state file");
                return DeploymentState::default();
            }
            Err(error) => {
                warn!(path = %self.path.display(), %error, "state file unreadable, starting empty");
                return DeploymentState::default();
            }
        };

        match serde_json::from_str(&contents) {
            Ok(state) => state,
            Err(error) => {
                warn!(path = %self.path.display(), %error, "state file unparseable, starting empty");
                DeploymentState::default()
            }
        }
    }

    /// Persist the state, stamping `last_updated` first.
    ///
    /// An existing file is renamed to `<file>.backup` before the new one is
    /// written, so the previous generation survives a crash mid-write.
    pub fn save(&self, state: &mut DeploymentState) -> Result<()> {
        state.last_updated = Some(Utc::now());

        if self.path.exists() {
            let backup = self.suffixed("backup");
            std::fs::rename(&self.path, &backup).map_err(|source| StateError::Backup {
                path: self.path.clone(),
                source,
            })?;
        }

        let contents = serde_json::to_string_pretty(state)?;
        std::fs::write(&self.path, contents).map_err(|source| StateError::Write {
            path: self.path.clone(),
            source,
        })?;

        debug!(path = %self.path.display(), "deployment state saved");
        Ok(())
    }

    /// Retire the current state file to `<file>.reset_backup`.
    ///
    /// Returns whether a state file existed. The next [`load`](Self::load)
    /// returns an empty state.
    pub fn reset(&self) -> Result<bool> {
        if !self.path.exists() {
            return Ok(false);
        }

        let backup = self.suffixed("reset_backup");
        std::fs::rename(&self.path, &backup).map_err(|source| StateError::Backup {
            path: self.path.clone(),
            source,
        })?;

        debug!(path = %self.path.display(), backup = %backup.display(), "state reset");
        Ok(true)
    }

    fn suffixed(&self, suffix: &str) -> PathBuf {
        let mut name = self.path.as_os_str().to_os_string();
        name.push(".");
        name.push(suffix);
        PathBuf::from(name)
    }
}
