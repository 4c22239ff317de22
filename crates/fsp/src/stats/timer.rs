//! Pause Timer - Timing Utilities
//!
//! High-precision timer for measuring time-to-safepoint and pause length.

use std::time::{Duration, Instant};

/// PauseTimer - timer for measuring safepoint operations
#[derive(Debug, Clone, Copy)]
pub struct PauseTimer {
    start: Instant,
}

impl PauseTimer {
    /// Create new timer
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Get elapsed time
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Get elapsed nanoseconds
    pub fn elapsed_ns(&self) -> u64 {
        self.elapsed().as_nanos() as u64
    }

    /// Get elapsed microseconds
    pub fn elapsed_us(&self) -> u64 {
        self.elapsed().as_micros() as u64
    }
}

impl Default for PauseTimer {
    fn default() -> Self {
        Self::new()
    }
}
