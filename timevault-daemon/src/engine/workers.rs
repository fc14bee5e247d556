//! Adaptive worker sizing for the copy pool.
//!
//! Recomputed at every Running entry: spinning media get a hard cap, SSDs
//! scale with the 1-second CPU utilization sample.

use crate::config::DiskType;
use std::time::Duration;
use sysinfo::System;

/// Parallel writers help an HDD very little and hurt seek times a lot.
const HDD_WORKER_CAP: usize = 2;

const MIN_WORKERS: usize = 2;
const MAX_WORKERS: usize = 16;
pub const INITIAL_WORKERS: usize = 4;

const HIGH_CPU_PCT: f32 = 75.0;
const LOW_CPU_PCT: f32 = 20.0;

/// Worker count for the upcoming cycle, carried from the previous one.
pub async fn effective_workers(disk: DiskType, previous: usize) -> usize {
    if disk == DiskType::Hdd {
        return HDD_WORKER_CAP;
    }
    let cpu = sample_cpu_percent().await;
    let workers = scale(previous, cpu);
    tracing::debug!(cpu_pct = cpu, workers, "worker pool sized");
    workers
}

/// Halve under load (floor 2), double when idle (ceiling 16), hold
/// otherwise.
fn scale(previous: usize, cpu_pct: f32) -> usize {
    let previous = previous.clamp(MIN_WORKERS, MAX_WORKERS);
    if cpu_pct > HIGH_CPU_PCT {
        (previous / 2).max(MIN_WORKERS)
    } else if cpu_pct < LOW_CPU_PCT {
        (previous * 2).min(MAX_WORKERS)
    } else {
        previous
    }
}

/// Overall CPU utilization over a one-second window.
async fn sample_cpu_percent() -> f32 {
    let mut sys = System::new();
    sys.refresh_cpu_usage();
    tokio::time::sleep(Duration::from_secs(1)).await;
    sys.refresh_cpu_usage();
    sys.global_cpu_usage()
}
