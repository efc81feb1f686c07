//! Local hardware profiling for deployment optimization.
//!
//! The profiler takes one reading of the controller host at run start; the
//! resulting [`HardwareProfile`] stays fixed for the run and drives the
//! derived [`OptimizationProfile`](convoy_types::OptimizationProfile).
//!
//! Profiling never fails: any metric that cannot be read degrades to a
//! conservative value, and a host that cannot be measured at all is treated
//! as a 1-core / 4 GB machine.

use std::path::Path;

use sysinfo::{Disks, System};
use tracing::{debug, warn};

use convoy_types::HardwareProfile;

const BYTES_PER_GB: f64 = 1_073_741_824.0;

/// Read-only profiler for the local host.
#[derive(Debug, Default, Clone, Copy)]
pub struct HardwareProfiler;

impl HardwareProfiler {
    pub fn new() -> Self {
        Self
    }

    /// Measure the local host and classify it into a capacity tier.
    pub fn profile(&self) -> HardwareProfile {
        let mut sys = System::new_all();
        sys.refresh_all();

        let cpus = sys.cpus();
        let cpu_count = if cpus.is_empty() {
            warn!("no CPUs reported, assuming a single core");
            1
        } else {
            cpus.len()
        };
        let cpu_freq_mhz = cpus.first().map(|cpu| cpu.frequency()).unwrap_or(0);

        let memory_bytes = sys.total_memory();
        let memory_gb = if memory_bytes == 0 {
            warn!("total memory unreadable, assuming 4 GB");
            4.0
        } else {
            memory_bytes as f64 / BYTES_PER_GB
        };

        let disk_gb = root_disk_gb();

        let load = System::load_average();
        let load_avg = [load.one, load.five, load.fifteen];

        let profile = HardwareProfile::new(cpu_count, cpu_freq_mhz, memory_gb, disk_gb, load_avg);
        debug!(
            tier = %profile.tier,
            cpu_count = profile.cpu_count,
            memory_gb = format!("{:.1}", profile.memory_gb),
            "hardware profile measured"
        );
        profile
    }
}

/// Total size of the filesystem holding `/`, or the largest mounted disk
/// when no disk is mounted exactly at the root. 0 when nothing is readable.
fn root_disk_gb() -> f64 {
    let disks = Disks::new_with_refreshed_list();

    let root = disks
        .iter()
        .find(|disk| disk.mount_point() == Path::new("/"))
        .map(|disk| disk.total_space());

    let best = root.or_else(|| disks.iter().map(|disk| disk.total_space()).max());

    match best {
        Some(bytes) if bytes > 0 => bytes as f64 / BYTES_PER_GB,
        _ => {
            warn!("disk size unreadable, reporting 0");
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use convoy_types::CapacityTier;

    #[test]
    fn test_profile_is_plausible() {
        let profile = HardwareProfiler::new().profile();
        assert!(profile.cpu_count >= 1);
        assert!(profile.memory_gb > 0.0);
    }

    #[test]
    fn test_profile_tier_matches_measurements() {
        let profile = HardwareProfiler::new().profile();
        assert_eq!(
            profile.tier,
            CapacityTier::classify(profile.cpu_count, profile.memory_gb)
        );
    }
}
