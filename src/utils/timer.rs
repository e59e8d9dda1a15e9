//! Timer utilities
//!
//! Wall-clock measurement for test invocations and whole runs.

use std::time::{Duration, Instant};

/// Simple timer for measuring elapsed time
#[derive(Debug)]
pub struct Timer {
    start: Instant,
    label: String,
}

impl Timer {
    /// Create and start a new timer
    pub fn start(label: impl Into<String>) -> Self {
        Self {
            start: Instant::now(),
            label: label.into(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.elapsed().as_millis() as u64
    }

    /// Stop timer and return elapsed time
    pub fn stop(self) -> Duration {
        let elapsed = self.elapsed();
        tracing::trace!("{}: {}ms", self.label, elapsed.as_millis());
        elapsed
    }
}

/// Time an async step, returning its output and duration
pub async fn measure<F, T>(label: &str, fut: F) -> (T, Duration)
where
    F: std::future::Future<Output = T>,
{
    let timer = Timer::start(label);
    let value = fut.await;
    (value, timer.stop())
}
