//! Lightweight wall-clock timing.
//!
//! Disabled by default. Enable with the `QSS_TIMING` environment variable or
//! programmatically with [`enable_timing`]. Reports go to stderr so they never
//! mix with data written to stdout.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

static ENABLED: AtomicBool = AtomicBool::new(false);

/// Enable performance timing globally.
pub fn enable_timing() {
    ENABLED.store(true, Ordering::Relaxed);
}

/// Check if timing is enabled.
pub fn is_enabled() -> bool {
    ENABLED.load(Ordering::Relaxed) || std::env::var("QSS_TIMING").is_ok()
}

/// A simple timer that measures elapsed time.
pub struct Timer {
    start: Instant,
    enabled: bool,
}

impl Timer {
    /// Create and start a new timer.
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
            enabled: is_enabled(),
        }
    }

    /// Stop the timer and return elapsed time in seconds.
    /// If timing is disabled, returns None.
    pub fn stop(self) -> Option<f64> {
        if self.enabled {
            Some(self.start.elapsed().as_secs_f64())
        } else {
            None
        }
    }
}

/// Wall-clock breakdown of one simulation run.
#[derive(Default, Debug, Clone)]
pub struct RunTimings {
    pub setup_time_s: f64,
    pub run_time_s: f64,
    pub firings: usize,
}

impl RunTimings {
    /// Print a formatted summary of the statistics.
    pub fn print_summary(&self) {
        if !is_enabled() {
            return;
        }

        eprintln!("\n=== Run Summary ===");
        eprintln!("Setup time:      {:.3}s", self.setup_time_s);
        eprintln!("Run time:        {:.3}s", self.run_time_s);
        if self.firings > 0 {
            eprintln!("  Firings:       {}", self.firings);
            eprintln!(
                "  Avg firing:    {:.3}us",
                self.run_time_s / self.firings as f64 * 1e6
            );
        }
        eprintln!("===================\n");
    }
}
