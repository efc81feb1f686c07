//! Fleet state snapshots: capture, persistence and structural diff.
//!
//! A snapshot records facts, configuration-file hashes and running services
//! per host at one point in time. Snapshots are append-only artifacts: once
//! captured, nothing mutates them. The differ compares any two snapshots,
//! including partial ones, and feeds the idempotence analyzer and the
//! drift detector.

mod capture;
mod diff;
mod error;
mod store;

pub use capture::SnapshotCapturer;
pub use diff::diff;
pub use error::{Result, SnapshotError};
pub use store::SnapshotStore;
