//! Progressive deployment controller.
//!
//! Consumes a stage plan and the hardware profiler's capacity tier, derives
//! per-stage timeout/retry/streaming parameters, and drives each stage
//! through the executor gateway with exponential timeout backoff. Outcomes
//! are persisted after every stage, so an interrupted or failed run can be
//! restarted (completed stages skip) or resumed (the failed stage re-runs).

mod controller;
mod error;
mod locks;
mod plan;

pub use controller::{ControllerConfig, DeploymentController, RunOutcome};
pub use error::{DeployError, Result};
pub use locks::{default_lock_paths, LockCheck};
pub use plan::{DeploymentPlan, ResolvedStage};
