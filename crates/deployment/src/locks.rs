//! Pre-stage check for transient package-manager locks.
//!
//! A held dpkg/apt lock makes the executor fail in ways it cannot clear
//! itself, so the controller checks before invoking it and fails the stage
//! fast instead of burning the retry budget.

use std::path::PathBuf;
use std::time::Duration;

use tracing::{debug, info, warn};

/// Lock files that block package operations while held.
pub fn default_lock_paths() -> Vec<PathBuf> {
    vec![
        PathBuf::from("/var/lib/dpkg/lock"),
        PathBuf::from("/var/lib/apt/lists/lock"),
        PathBuf::from("/var/cache/apt/archives.lock"),
    ]
}

/// Checks a fixed set of lock files, granting one bounded wait for
/// transient locks to clear.
#[derive(Debug, Clone)]
pub struct LockCheck {
    paths: Vec<PathBuf>,
    wait: Duration,
}

impl LockCheck {
    pub fn new(paths: Vec<PathBuf>, wait: Duration) -> Self {
        Self { paths, wait }
    }

    fn held(&self) -> Vec<&PathBuf> {
        self.paths.iter().filter(|path| path.exists()).collect()
    }

    /// Returns true when no lock is held, waiting once for transient locks
    /// to clear before giving up.
    pub async fn ensure_clear(&self) -> bool {
        let held = self.held();
        if held.is_empty() {
            debug!("no transient locks detected");
            return true;
        }

        info!(
            locks = ?held,
            wait_secs = self.wait.as_secs(),
            "transient locks detected, waiting for them to clear"
        );
        tokio::time::sleep(self.wait).await;

        let held = self.held();
        if held.is_empty() {
            true
        } else {
            warn!(locks = ?held, "locks still held after wait");
            false
        }
    }
}

impl Default for LockCheck {
    fn default() -> Self {
        Self::new(default_lock_paths(), Duration::from_secs(30))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_clear_when_no_locks() {
        let dir = tempfile::tempdir().unwrap();
        let check = LockCheck::new(
            vec![dir.path().join("dpkg.lock")],
            Duration::from_millis(1),
        );
        assert!(check.ensure_clear().await);
    }

    #[tokio::test]
    async fn test_held_lock_reported_after_wait() {
        let dir = tempfile::tempdir().unwrap();
        let lock = dir.path().join("dpkg.lock");
        std::fs::write(&lock, "").unwrap();

        let check = LockCheck::new(vec![lock], Duration::from_millis(1));
        assert!(!check.ensure_clear().await);
    }

    #[tokio::test]
    async fn test_lock_released_during_wait() {
        let dir = tempfile::tempdir().unwrap();
        let lock = dir.path().join("dpkg.lock");
        std::fs::write(&lock, "").unwrap();

        let check = LockCheck::new(vec![lock.clone()], Duration::from_millis(100));
        let release = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            std::fs::remove_file(&lock).ok();
        });

        assert!(check.ensure_clear().await);
        release.await.unwrap();
    }
}
