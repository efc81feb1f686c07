//! Convergence verification for deployed fleets.
//!
//! Four complementary judgements over captured snapshots and executor
//! output:
//!
//! - **Consistency**: do all hosts agree on invariant facts and common
//!   services right now?
//! - **Idempotence**: does repeating the same deployment produce the same
//!   change set every time?
//! - **Drift**: has the fleet diverged from a trusted baseline, deployment
//!   or not?
//! - **Check-mode verification**: would the playbook change anything that
//!   is not yet captured in code?

mod checkmode;
mod consistency;
mod drift;
mod error;
mod idempotence;
mod reports;

pub use checkmode::verify_check_mode;
pub use consistency::check_consistency;
pub use drift::detect_drift;
pub use error::{Result, VerifyError};
pub use idempotence::{worst_severity, IdempotenceAnalyzer};
pub use reports::save_report;
