use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use log::{info, trace};

/// Counts pairwise comparisons for monitoring a grouping or matrix run
#[derive(Debug)]
pub struct ComparisonMetrics {
    comparisons: AtomicU64,
    unknown_results: AtomicU64,
    failures: AtomicU64,
    start_time: Instant,
}

impl ComparisonMetrics {
    pub fn new() -> Self {
        Self {
            comparisons: AtomicU64::new(0),
            unknown_results: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn increment_comparisons(&self) {
        self.comparisons.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_unknown(&self) {
        self.unknown_results.fetch_add(1, Ordering::Relaxed);
    }

    /// A failure also yields an unknown result, so both counters move
    pub fn increment_failures(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
        self.unknown_results.fetch_add(1, Ordering::Relaxed);
        trace!("Comparison failure recorded. Total failures: {}", self.failures.load(Ordering::Relaxed));
    }

    pub fn get_stats(&self) -> ComparisonStats {
        let uptime = self.start_time.elapsed();
        let comparisons = self.comparisons.load(Ordering::Relaxed);
        ComparisonStats {
            comparisons,
            unknown_results: self.unknown_results.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            uptime_seconds: uptime.as_secs_f64(),
            comparisons_per_second: if uptime.as_secs_f64() > 0.0 {
                comparisons as f64 / uptime.as_secs_f64()
            } else {
                0.0
            },
        }
    }

    pub fn log_summary(&self, label: &str) {
        let stats = self.get_stats();
        info!(
            "{}: {} comparisons ({} unknown, {} failed) in {:.2}s, {:.0}/s",
            label,
            stats.comparisons,
            stats.unknown_results,
            stats.failures,
            stats.uptime_seconds,
            stats.comparisons_per_second
        );
    }
}

impl Default for ComparisonMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone)]
pub struct ComparisonStats {
    pub comparisons: u64,
    pub unknown_results: u64,
    pub failures: u64,
    pub uptime_seconds: f64,
    pub comparisons_per_second: f64,
}
