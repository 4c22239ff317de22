//! Stats Module - Safepoint Performance Monitoring
//!
//! Metrics:
//! - Outermost and nested pause counts
//! - Time-to-safepoint distribution
//! - Pause duration distribution

pub mod histogram;
pub mod timer;

pub use histogram::Histogram;
pub use timer::PauseTimer;

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// SafepointStats - statistics collector for one coordinator
pub struct SafepointStats {
    /// Outermost pauses, i.e. pauses that actually stopped threads
    pauses: AtomicU64,
    /// Pause requests satisfied by an already active pause
    nested_pauses: AtomicU64,
    /// Running threads that had to report, summed over all pauses
    threads_stopped: AtomicU64,
    /// Request-to-all-parked latency (ns)
    time_to_safepoint: Histogram,
    /// Reached-to-released latency (ns)
    pause_duration: Histogram,
    start_time: Instant,
}

impl SafepointStats {
    /// Create new stats collector
    pub fn new() -> Self {
        Self {
            pauses: AtomicU64::new(0),
            nested_pauses: AtomicU64::new(0),
            threads_stopped: AtomicU64::new(0),
            time_to_safepoint: Histogram::new(),
            pause_duration: Histogram::new(),
            start_time: Instant::now(),
        }
    }

    /// Record an outermost pause reaching its safepoint
    pub fn record_safepoint_reached(&self, running_threads: usize, time_to_safepoint_ns: u64) {
        self.pauses.fetch_add(1, Ordering::Relaxed);
        self.threads_stopped
            .fetch_add(running_threads as u64, Ordering::Relaxed);
        self.time_to_safepoint.record(time_to_safepoint_ns);
    }

    /// Record a nested pause request
    pub fn record_nested(&self) {
        self.nested_pauses.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an outermost pause being released
    pub fn record_release(&self, duration_ns: u64) {
        self.pause_duration.record(duration_ns);
    }

    /// Time-to-safepoint histogram
    pub fn time_to_safepoint(&self) -> &Histogram {
        &self.time_to_safepoint
    }

    /// Pause duration histogram
    pub fn pause_duration(&self) -> &Histogram {
        &self.pause_duration
    }

    /// Get summary statistics
    pub fn summary(&self) -> SafepointSummary {
        SafepointSummary {
            pauses: self.pauses.load(Ordering::Relaxed),
            nested_pauses: self.nested_pauses.load(Ordering::Relaxed),
            threads_stopped: self.threads_stopped.load(Ordering::Relaxed),
            avg_time_to_safepoint_us: self.time_to_safepoint.mean() as f64 / 1_000.0,
            max_time_to_safepoint_us: self.time_to_safepoint.max() as f64 / 1_000.0,
            avg_pause_us: self.pause_duration.mean() as f64 / 1_000.0,
            max_pause_us: self.pause_duration.max() as f64 / 1_000.0,
            uptime_secs: self.start_time.elapsed().as_secs(),
        }
    }

    /// Reset statistics
    pub fn reset(&self) {
        self.pauses.store(0, Ordering::Relaxed);
        self.nested_pauses.store(0, Ordering::Relaxed);
        self.threads_stopped.store(0, Ordering::Relaxed);
        self.time_to_safepoint.clear();
        self.pause_duration.clear();
    }
}

impl Default for SafepointStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Summary statistics
#[derive(Debug, Default, Clone, Serialize)]
pub struct SafepointSummary {
    pub pauses: u64,
    pub nested_pauses: u64,
    pub threads_stopped: u64,
    pub avg_time_to_safepoint_us: f64,
    pub max_time_to_safepoint_us: f64,
    pub avg_pause_us: f64,
    pub max_pause_us: f64,
    pub uptime_secs: u64,
}
