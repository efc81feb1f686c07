//! Deployment plans and per-run stage resolution

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use convoy_types::{OptimizationProfile, StageConfig};

use crate::error::{DeployError, Result};

/// Fallback base timeout for stages that specify none.
const DEFAULT_STAGE_TIMEOUT_SECS: u64 = 300;

/// Ordered list of stages making up one deployment, loaded once per run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentPlan {
    pub stages: Vec<StageConfig>,
}

impl DeploymentPlan {
    /// Load and validate a plan from its YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| DeployError::PlanRead {
            path: path.to_path_buf(),
            source,
        })?;
        let plan: DeploymentPlan =
            serde_yaml::from_str(&contents).map_err(|source| DeployError::PlanParse {
                path: path.to_path_buf(),
                source,
            })?;
        plan.validate()?;
        Ok(plan)
    }

    /// Stage names must be unique; outcomes are keyed by name.
    pub fn validate(&self) -> Result<()> {
        let mut seen = std::collections::BTreeSet::new();
        for stage in &self.stages {
            if !seen.insert(stage.name.as_str()) {
                return Err(DeployError::DuplicateStage(stage.name.clone()));
            }
        }
        Ok(())
    }

    /// Look up a stage by name.
    pub fn stage(&self, name: &str) -> Option<&StageConfig> {
        self.stages.iter().find(|stage| stage.name == name)
    }
}

/// A stage with every optional field resolved for this run.
///
/// Resolution overlays the run's [`OptimizationProfile`] defaults under the
/// author's explicit values; the author's [`StageConfig`] is left untouched.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedStage {
    pub name: String,
    pub playbook: String,
    /// Base timeout for attempt 0, already scaled by the hardware
    /// multiplier.
    pub timeout: Duration,
    pub retries: u32,
    pub run_async: bool,
    pub pre_commands: Vec<String>,
    pub check_locks: bool,
    pub estimated_duration: u64,
}

impl ResolvedStage {
    pub fn resolve(config: &StageConfig, opts: &OptimizationProfile) -> Self {
        let base_secs = config.timeout_secs.unwrap_or(DEFAULT_STAGE_TIMEOUT_SECS);
        let scaled_secs = ((base_secs as f64) * opts.timeout_multiplier).round().max(1.0) as u64;

        Self {
            name: config.name.clone(),
            playbook: config.playbook.clone(),
            timeout: Duration::from_secs(scaled_secs),
            retries: config.retries.unwrap_or(opts.retry_count).max(1),
            run_async: config.run_async.unwrap_or(opts.async_enabled),
            pre_commands: config.pre_commands.clone(),
            check_locks: config.check_locks,
            estimated_duration: config.estimated_duration,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use convoy_types::{HardwareProfile, OptimizationProfile};

    const PLAN_YAML: &str = r#"
stages:
  - name: base_system
    playbook: playbooks/base.yml
    timeout: 600
    retries: 2
    pre_commands:
      - apt-get update
  - name: app_deploy
    playbook: playbooks/app.yml
    async: true
    check_locks: false
"#;

    fn standard_opts() -> OptimizationProfile {
        // 8 cores / 16 GB: multiplier 1.0, 3 retries, async on
        OptimizationProfile::for_profile(&HardwareProfile::new(
            8,
            2400,
            16.0,
            100.0,
            [0.0, 0.0, 0.0],
        ))
    }

    #[test]
    fn test_plan_parses_and_validates() {
        let plan: DeploymentPlan = serde_yaml::from_str(PLAN_YAML).unwrap();
        plan.validate().unwrap();
        assert_eq!(plan.stages.len(), 2);
        assert_eq!(plan.stage("app_deploy").unwrap().run_async, Some(true));
        assert!(plan.stage("missing").is_none());
    }

    #[test]
    fn test_duplicate_stage_rejected() {
        let mut plan: DeploymentPlan = serde_yaml::from_str(PLAN_YAML).unwrap();
        plan.stages[1].name = "base_system".to_string();
        assert!(matches!(
            plan.validate(),
            Err(DeployError::DuplicateStage(name)) if name == "base_system"
        ));
    }

    #[test]
    fn test_resolution_prefers_explicit_fields() {
        let plan: DeploymentPlan = serde_yaml::from_str(PLAN_YAML).unwrap();
        let opts = standard_opts();

        let base = ResolvedStage::resolve(plan.stage("base_system").unwrap(), &opts);
        assert_eq!(base.timeout, Duration::from_secs(600));
        assert_eq!(base.retries, 2);
        assert_eq!(base.pre_commands, vec!["apt-get update".to_string()]);
    }

    #[test]
    fn test_resolution_fills_defaults() {
        let plan: DeploymentPlan = serde_yaml::from_str(PLAN_YAML).unwrap();
        let opts = standard_opts();

        let app = ResolvedStage::resolve(plan.stage("app_deploy").unwrap(), &opts);
        assert_eq!(app.timeout, Duration::from_secs(300));
        assert_eq!(app.retries, opts.retry_count);
        assert!(app.run_async);
        assert!(!app.check_locks);
    }

    #[test]
    fn test_timeout_scaled_by_multiplier() {
        let plan: DeploymentPlan = serde_yaml::from_str(PLAN_YAML).unwrap();
        // 2 cores / 2 GB: resource constrained, multiplier 2.0
        let opts = OptimizationProfile::for_profile(&HardwareProfile::new(
            2,
            1200,
            2.0,
            20.0,
            [0.0, 0.0, 0.0],
        ));

        let base = ResolvedStage::resolve(plan.stage("base_system").unwrap(), &opts);
        assert_eq!(base.timeout, Duration::from_secs(1200));
    }
}
