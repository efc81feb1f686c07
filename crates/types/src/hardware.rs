//! Hardware capacity tiers and the execution parameters derived from them
//!
//! The profiler measures the local host once per run; everything downstream
//! is a pure function of those measurements. Tiers gate how aggressively the
//! controller parallelizes and how much timeout headroom each stage gets.

use serde::{Deserialize, Serialize};

/// Capacity classification of the controller host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapacityTier {
    /// Fewer than 4 cores or less than 8 GB of memory.
    ResourceConstrained,

    /// At least 4 cores and 8 GB.
    Minimal,

    /// At least 8 cores and 16 GB.
    Standard,

    /// At least 16 cores and 32 GB.
    HighPerformance,
}

impl CapacityTier {
    /// Classify a host by core count and memory size.
    pub fn classify(cpu_count: usize, memory_gb: f64) -> Self {
        if cpu_count >= 16 && memory_gb >= 32.0 {
            CapacityTier::HighPerformance
        } else if cpu_count >= 8 && memory_gb >= 16.0 {
            CapacityTier::Standard
        } else if cpu_count >= 4 && memory_gb >= 8.0 {
            CapacityTier::Minimal
        } else {
            CapacityTier::ResourceConstrained
        }
    }
}

impl std::fmt::Display for CapacityTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CapacityTier::ResourceConstrained => write!(f, "resource_constrained"),
            CapacityTier::Minimal => write!(f, "minimal"),
            CapacityTier::Standard => write!(f, "standard"),
            CapacityTier::HighPerformance => write!(f, "high_performance"),
        }
    }
}

/// Point-in-time measurements of the controller host.
///
/// Immutable for the duration of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HardwareProfile {
    /// Logical CPU count.
    pub cpu_count: usize,

    /// Current CPU frequency in MHz, 0 when unreadable.
    pub cpu_freq_mhz: u64,

    /// Total memory in GB.
    pub memory_gb: f64,

    /// Total size of the root filesystem in GB, 0 when unreadable.
    pub disk_gb: f64,

    /// 1/5/15 minute load averages.
    pub load_avg: [f64; 3],

    /// Derived capacity tier.
    pub tier: CapacityTier,
}

impl HardwareProfile {
    /// Build a profile from raw measurements, deriving the tier.
    pub fn new(
        cpu_count: usize,
        cpu_freq_mhz: u64,
        memory_gb: f64,
        disk_gb: f64,
        load_avg: [f64; 3],
    ) -> Self {
        Self {
            cpu_count,
            cpu_freq_mhz,
            memory_gb,
            disk_gb,
            load_avg,
            tier: CapacityTier::classify(cpu_count, memory_gb),
        }
    }

    /// Profile assumed when the host cannot be measured: 1 core, 4 GB.
    pub fn conservative_default() -> Self {
        Self::new(1, 0, 4.0, 0.0, [0.0, 0.0, 0.0])
    }
}

/// Execution parameters derived from a hardware profile.
///
/// These are the defaults applied to every stage; explicit stage
/// configuration always wins over them.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OptimizationProfile {
    /// Executor fork count.
    pub forks: u32,

    /// Multiplier applied to each stage's base timeout.
    pub timeout_multiplier: f64,

    /// Default retry budget per stage.
    pub retry_count: u32,

    /// Whether stages stream executor output by default.
    pub async_enabled: bool,

    /// Stage-level parallelism hint. The controller itself is strictly
    /// sequential; this only sizes executor-side parallelism.
    pub parallel_stages: u32,
}

impl OptimizationProfile {
    /// Derive execution parameters from a hardware profile.
    pub fn for_profile(profile: &HardwareProfile) -> Self {
        let cpu = profile.cpu_count as u32;
        match profile.tier {
            CapacityTier::HighPerformance => Self {
                forks: cpu.min(20),
                timeout_multiplier: 0.8,
                retry_count: 2,
                async_enabled: true,
                parallel_stages: 2,
            },
            CapacityTier::Standard => Self {
                forks: cpu.min(10),
                timeout_multiplier: 1.0,
                retry_count: 3,
                async_enabled: true,
                parallel_stages: 1,
            },
            CapacityTier::Minimal => Self {
                forks: cpu.min(5),
                timeout_multiplier: 1.5,
                retry_count: 4,
                async_enabled: false,
                parallel_stages: 1,
            },
            CapacityTier::ResourceConstrained => Self {
                forks: 2,
                timeout_multiplier: 2.0,
                retry_count: 5,
                async_enabled: false,
                parallel_stages: 1,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_thresholds() {
        assert_eq!(
            CapacityTier::classify(16, 32.0),
            CapacityTier::HighPerformance
        );
        assert_eq!(CapacityTier::classify(16, 31.9), CapacityTier::Standard);
        assert_eq!(CapacityTier::classify(8, 16.0), CapacityTier::Standard);
        assert_eq!(CapacityTier::classify(4, 8.0), CapacityTier::Minimal);
        assert_eq!(
            CapacityTier::classify(4, 7.5),
            CapacityTier::ResourceConstrained
        );
        assert_eq!(
            CapacityTier::classify(2, 64.0),
            CapacityTier::ResourceConstrained
        );
    }

    #[test]
    fn test_conservative_default() {
        let profile = HardwareProfile::conservative_default();
        assert_eq!(profile.cpu_count, 1);
        assert_eq!(profile.tier, CapacityTier::ResourceConstrained);
    }

    #[test]
    fn test_optimization_forks_capped() {
        let big = HardwareProfile::new(64, 3000, 128.0, 500.0, [0.0, 0.0, 0.0]);
        let opts = OptimizationProfile::for_profile(&big);
        assert_eq!(opts.forks, 20);
        assert_eq!(opts.retry_count, 2);
        assert!(opts.async_enabled);

        let small = HardwareProfile::new(2, 1200, 2.0, 20.0, [0.0, 0.0, 0.0]);
        let opts = OptimizationProfile::for_profile(&small);
        assert_eq!(opts.forks, 2);
        assert_eq!(opts.timeout_multiplier, 2.0);
        assert_eq!(opts.retry_count, 5);
    }
}
