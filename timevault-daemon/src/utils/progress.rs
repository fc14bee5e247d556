//! Run counters and progress/ETA formatting.
//!
//! Counters are plain atomics so workers can update them without touching
//! the engine lock; the progress broadcaster reads a consistent-enough
//! snapshot once a second.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Instant;

/// Shared per-run counters, reset at the start of every cycle.
#[derive(Debug, Default)]
pub struct RunCounters {
    files_planned: AtomicUsize,
    bytes_planned: AtomicU64,
    files_done: AtomicUsize,
    bytes_done: AtomicU64,
    files_failed: AtomicUsize,
    started: Mutex<Option<Instant>>,
}

impl RunCounters {
    pub fn start_run(&self, files_planned: usize, bytes_planned: u64) {
        self.files_planned.store(files_planned, Ordering::Relaxed);
        self.bytes_planned.store(bytes_planned, Ordering::Relaxed);
        self.files_done.store(0, Ordering::Relaxed);
        self.bytes_done.store(0, Ordering::Relaxed);
        self.files_failed.store(0, Ordering::Relaxed);
        *self
            .started
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(Instant::now());
    }

    /// One finished file; hardlinked files report zero bytes.
    pub fn add_done(&self, bytes: u64) {
        self.files_done.fetch_add(1, Ordering::Relaxed);
        self.bytes_done.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn add_failed(&self) {
        self.files_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        let elapsed_secs = self
            .started
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .map(|t| t.elapsed().as_secs())
            .unwrap_or(0);
        ProgressSnapshot {
            files_planned: self.files_planned.load(Ordering::Relaxed),
            bytes_planned: self.bytes_planned.load(Ordering::Relaxed),
            files_done: self.files_done.load(Ordering::Relaxed),
            bytes_done: self.bytes_done.load(Ordering::Relaxed),
            files_failed: self.files_failed.load(Ordering::Relaxed),
            elapsed_secs,
        }
    }
}

/// Point-in-time view of a running cycle.
#[derive(Debug, Clone, Default)]
pub struct ProgressSnapshot {
    pub files_planned: usize,
    pub bytes_planned: u64,
    pub files_done: usize,
    pub bytes_done: u64,
    pub files_failed: usize,
    pub elapsed_secs: u64,
}

impl ProgressSnapshot {
    /// Fraction complete in `[0, 1]`. Byte-weighted when the plan copies
    /// bytes; file-count-weighted for hardlink-only plans.
    pub fn progress(&self) -> f64 {
        let ratio = if self.bytes_planned > 0 {
            self.bytes_done as f64 / self.bytes_planned as f64
        } else if self.files_planned > 0 {
            (self.files_done + self.files_failed) as f64 / self.files_planned as f64
        } else {
            1.0
        };
        ratio.clamp(0.0, 1.0)
    }

    /// Human-readable time remaining, `"--"` before a rate is known.
    pub fn eta(&self) -> String {
        if self.elapsed_secs == 0 || self.bytes_done == 0 {
            return "--".to_string();
        }
        let rate = self.bytes_done / self.elapsed_secs.max(1);
        if rate == 0 {
            return "--".to_string();
        }
        let remaining = self.bytes_planned.saturating_sub(self.bytes_done) / rate;
        format_duration(remaining)
    }

    pub fn speed(&self) -> u64 {
        if self.elapsed_secs == 0 {
            0
        } else {
            self.bytes_done / self.elapsed_secs
        }
    }
}

/// Format bytes as human-readable string
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    format!("{:.2} {}", size, UNITS[unit_index])
}

/// Format speed as human-readable string
pub fn format_speed(bytes_per_second: u64) -> String {
    format!("{}/s", format_bytes(bytes_per_second))
}

/// Format duration as human-readable string
pub fn format_duration(seconds: u64) -> String {
    if seconds < 60 {
        format!("{}s", seconds)
    } else if seconds < 3600 {
        format!("{}m {}s", seconds / 60, seconds % 60)
    } else {
        format!("{}h {}m", seconds / 3600, (seconds % 3600) / 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_lifecycle() {
        let counters = RunCounters::default();
        counters.start_run(10, 1000);

        counters.add_done(500);
        counters.add_done(0);
        counters.add_failed();

        let snap = counters.snapshot();
        assert_eq!(snap.files_planned, 10);
        assert_eq!(snap.bytes_planned, 1000);
        assert_eq!(snap.files_done, 2);
        assert_eq!(snap.bytes_done, 500);
        assert_eq!(snap.files_failed, 1);
        assert!((snap.progress() - 0.5).abs() < 0.01);
    }

    #[test]
    fn test_progress_without_bytes() {
        // Hardlink-only plans track by file count
        let snap = ProgressSnapshot {
            files_planned: 4,
            files_done: 2,
            ..Default::default()
        };
        assert!((snap.progress() - 0.5).abs() < 0.01);

        let empty = ProgressSnapshot::default();
        assert!((empty.progress() - 1.0).abs() < 0.01);
    }

    #[test]
    fn test_eta_unknown_before_rate() {
        let snap = ProgressSnapshot {
            files_planned: 1,
            bytes_planned: 100,
            ..Default::default()
        };
        assert_eq!(snap.eta(), "--");
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(0), "0.00 B");
        assert_eq!(format_bytes(1023), "1023.00 B");
        assert_eq!(format_bytes(1024), "1.00 KB");
        assert_eq!(format_bytes(1024 * 1024), "1.00 MB");
        assert_eq!(format_bytes(1024 * 1024 * 1024), "1.00 GB");
    }

    #[test]
    fn test_format_speed() {
        assert_eq!(format_speed(1024), "1.00 KB/s");
        assert_eq!(format_speed(1024 * 1024), "1.00 MB/s");
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(30), "30s");
        assert_eq!(format_duration(90), "1m 30s");
        assert_eq!(format_duration(3665), "1h 1m");
    }
}
