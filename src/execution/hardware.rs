//! Hardware detection and worker sizing.
//!
//! Detection runs once and is cached to a JSON file keyed by a hardware
//! signature; later runs load the cache and only re-profile when the
//! signature no longer matches the machine. Memory per worker is estimated
//! by running one sample backtest and reading the process RSS afterwards.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use sysinfo::System;
use tracing::{info, warn};

use crate::config::ParallelMode;

/// Conservative estimate used when no sample backtest is available.
const DEFAULT_MEMORY_PER_WORKER_MB: f64 = 500.0;

/// Lower bound on the per-worker memory estimate.
const MIN_MEMORY_PER_WORKER_MB: f64 = 300.0;

/// Headroom multiplier over the sampled peak.
const MEMORY_HEADROOM: f64 = 1.2;

/// Detected hardware capabilities plus the per-worker memory estimate.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[non_exhaustive]
pub struct HardwareProfile {
    /// Physical CPU cores
    pub physical_cores: usize,
    /// Logical CPU cores (with SMT)
    pub logical_cores: usize,
    /// Total RAM in GiB
    pub total_ram_gb: f64,
    /// Estimated peak memory of one worker, in MiB
    pub memory_per_worker_mb: f64,
    /// `"{physical_cores}c_{total_ram_gb}gb"` — cache validity key
    pub signature: String,
}

impl HardwareProfile {
    /// Load the cached profile, or detect and cache when the file is
    /// missing, corrupt, or was produced on different hardware.
    ///
    /// `sample_backtest` runs one representative backtest so the profiler
    /// can observe real memory usage; pass `None` to fall back to the
    /// conservative default estimate.
    pub fn get_or_create(cache_path: &Path, sample_backtest: Option<&dyn Fn()>) -> Self {
        if let Some(profile) = Self::load(cache_path) {
            if profile.signature == Self::current_signature() {
                return profile;
            }
            info!(
                cached = %profile.signature,
                current = %Self::current_signature(),
                "hardware signature changed, re-profiling"
            );
        }

        let profile = Self::detect(sample_backtest);
        profile.save(cache_path);
        profile
    }

    /// Signature of the machine this process runs on.
    pub fn current_signature() -> String {
        let physical = num_cpus::get_physical();
        let ram_gb = total_ram_bytes() / (1024 * 1024 * 1024);
        format!("{physical}c_{ram_gb}gb")
    }

    fn detect(sample_backtest: Option<&dyn Fn()>) -> Self {
        let physical_cores = num_cpus::get_physical();
        let logical_cores = num_cpus::get();
        let total_ram_gb = total_ram_bytes() as f64 / (1024.0 * 1024.0 * 1024.0);
        let memory_per_worker_mb = profile_memory(sample_backtest);

        Self {
            physical_cores,
            logical_cores,
            total_ram_gb,
            memory_per_worker_mb,
            signature: Self::current_signature(),
        }
    }

    fn load(path: &Path) -> Option<Self> {
        let raw = fs::read_to_string(path).ok()?;
        match serde_json::from_str(&raw) {
            Ok(profile) => Some(profile),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "corrupt hardware profile cache");
                None
            }
        }
    }

    /// Persist the profile atomically (write-then-rename) so concurrent
    /// processes never read a torn file.
    fn save(&self, path: &Path) {
        let Ok(raw) = serde_json::to_string_pretty(self) else {
            return;
        };
        if let Some(parent) = path.parent() {
            let _ = fs::create_dir_all(parent);
        }
        let tmp = path.with_extension("json.tmp");
        if fs::write(&tmp, raw).and_then(|()| fs::rename(&tmp, path)).is_err() {
            warn!(path = %path.display(), "failed to cache hardware profile");
        }
    }

    /// Optimal worker count for `num_tasks` independent backtests.
    ///
    /// Manual mode returns the requested count. Tiny runs (≤ 3 tasks) stay
    /// single-threaded to avoid pool overhead. Otherwise the count is capped
    /// by reserved-adjusted physical cores, by the RAM budget
    /// (`total × memory_safety / per_worker`), and by the task count.
    pub fn optimal_workers(
        &self,
        num_tasks: usize,
        mode: ParallelMode,
        manual_count: Option<usize>,
        memory_safety_factor: f64,
        cpu_reserve_cores: usize,
    ) -> usize {
        if mode == ParallelMode::Manual {
            if let Some(count) = manual_count {
                return count.max(1);
            }
        }

        if num_tasks <= 3 {
            return 1;
        }

        let max_by_cpu = self.physical_cores.saturating_sub(cpu_reserve_cores).max(1);
        let ram_mb = self.total_ram_gb * 1024.0;
        let max_by_memory =
            (ram_mb * memory_safety_factor / self.memory_per_worker_mb).floor() as usize;

        max_by_cpu.min(max_by_memory).min(num_tasks).max(1)
    }
}

fn total_ram_bytes() -> u64 {
    let mut system = System::new();
    system.refresh_memory();
    system.total_memory()
}

/// Estimate per-worker memory: run the sample backtest, read this process'
/// RSS, and pad by 20% with a 300 MB floor. No sample → conservative 500 MB.
fn profile_memory(sample_backtest: Option<&dyn Fn()>) -> f64 {
    let Some(sample) = sample_backtest else {
        return DEFAULT_MEMORY_PER_WORKER_MB;
    };

    sample();

    let Ok(pid) = sysinfo::get_current_pid() else {
        return DEFAULT_MEMORY_PER_WORKER_MB;
    };
    let mut system = System::new();
    system.refresh_processes(sysinfo::ProcessesToUpdate::Some(&[pid]), true);
    match system.process(pid) {
        Some(process) => {
            let rss_mb = process.memory() as f64 / (1024.0 * 1024.0);
            (rss_mb * MEMORY_HEADROOM).max(MIN_MEMORY_PER_WORKER_MB)
        }
        None => DEFAULT_MEMORY_PER_WORKER_MB,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn profile(cores: usize, ram_gb: f64, per_worker_mb: f64) -> HardwareProfile {
        HardwareProfile {
            physical_cores: cores,
            logical_cores: cores * 2,
            total_ram_gb: ram_gb,
            memory_per_worker_mb: per_worker_mb,
            signature: format!("{cores}c_{}gb", ram_gb as u64),
        }
    }

    #[test]
    fn test_manual_mode_returns_requested_count() {
        let hw = profile(8, 16.0, 500.0);
        assert_eq!(hw.optimal_workers(100, ParallelMode::Manual, Some(3), 0.75, 1), 3);
        assert_eq!(hw.optimal_workers(100, ParallelMode::Manual, Some(0), 0.75, 1), 1);
    }

    #[test]
    fn test_small_runs_stay_serial() {
        let hw = profile(8, 16.0, 500.0);
        assert_eq!(hw.optimal_workers(3, ParallelMode::Auto, None, 0.75, 1), 1);
        assert_eq!(hw.optimal_workers(1, ParallelMode::Auto, None, 0.75, 1), 1);
    }

    #[test]
    fn test_cpu_bound() {
        // Plenty of RAM: 16 GB × 0.75 / 500 MB = 24 workers by memory
        let hw = profile(8, 16.0, 500.0);
        assert_eq!(hw.optimal_workers(100, ParallelMode::Auto, None, 0.75, 1), 7);
    }

    #[test]
    fn test_memory_bound() {
        // 4 GB × 0.75 / 1500 MB = 2 workers by memory, 7 by CPU
        let hw = profile(8, 4.0, 1_500.0);
        assert_eq!(hw.optimal_workers(100, ParallelMode::Auto, None, 0.75, 1), 2);
    }

    #[test]
    fn test_task_bound() {
        let hw = profile(16, 64.0, 300.0);
        assert_eq!(hw.optimal_workers(5, ParallelMode::Auto, None, 0.75, 1), 5);
    }

    #[test]
    fn test_never_below_one_worker() {
        let hw = profile(1, 0.5, 2_000.0);
        assert_eq!(hw.optimal_workers(50, ParallelMode::Auto, None, 0.75, 1), 1);
    }

    #[test]
    fn test_cache_round_trip_and_signature_check() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hardware_profile.json");

        let first = HardwareProfile::get_or_create(&path, None);
        assert!(path.exists());
        assert_eq!(first.signature, HardwareProfile::current_signature());
        assert_eq!(first.memory_per_worker_mb, DEFAULT_MEMORY_PER_WORKER_MB);

        // Second call loads the cache rather than re-detecting
        let second = HardwareProfile::get_or_create(&path, None);
        assert_eq!(second.signature, first.signature);

        // A stale signature forces re-profiling
        let stale = HardwareProfile { signature: "0c_0gb".to_string(), ..first.clone() };
        fs::write(&path, serde_json::to_string(&stale).unwrap()).unwrap();
        let refreshed = HardwareProfile::get_or_create(&path, None);
        assert_eq!(refreshed.signature, HardwareProfile::current_signature());
    }

    #[test]
    fn test_corrupt_cache_recreated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hardware_profile.json");
        fs::write(&path, "not json").unwrap();
        let profile = HardwareProfile::get_or_create(&path, None);
        assert_eq!(profile.signature, HardwareProfile::current_signature());
    }
}
