//! Rolled-up run counters

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign};
use std::time::Duration;

/// Counts and elapsed time for a subtree of tests.
///
/// `passed()` is implicit: `total - failed - skipped - not_run`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub total: u32,
    pub failed: u32,
    pub skipped: u32,
    pub not_run: u32,
    pub time: Duration,
}

impl RunSummary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn passed() -> Self {
        Self {
            total: 1,
            ..Default::default()
        }
    }

    pub fn failed() -> Self {
        Self {
            total: 1,
            failed: 1,
            ..Default::default()
        }
    }

    pub fn skipped() -> Self {
        Self {
            total: 1,
            skipped: 1,
            ..Default::default()
        }
    }

    pub fn not_run() -> Self {
        Self {
            total: 1,
            not_run: 1,
            ..Default::default()
        }
    }

    pub fn with_time(mut self, time: Duration) -> Self {
        self.time = time;
        self
    }

    /// Fold a child's summary into this one
    pub fn aggregate(&mut self, other: RunSummary) {
        *self += other;
    }

    pub fn passed_count(&self) -> u32 {
        self.total
            .saturating_sub(self.failed + self.skipped + self.not_run)
    }

    pub fn is_empty(&self) -> bool {
        self.total == 0
    }

    pub fn pass_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            (self.passed_count() as f64 / self.total as f64) * 100.0
        }
    }
}

impl Add for RunSummary {
    type Output = RunSummary;

    fn add(mut self, rhs: RunSummary) -> RunSummary {
        self += rhs;
        self
    }
}

impl AddAssign for RunSummary {
    fn add_assign(&mut self, rhs: RunSummary) {
        self.total += rhs.total;
        self.failed += rhs.failed;
        self.skipped += rhs.skipped;
        self.not_run += rhs.not_run;
        self.time += rhs.time;
    }
}

impl std::iter::Sum for RunSummary {
    fn sum<I: Iterator<Item = RunSummary>>(iter: I) -> Self {
        iter.fold(RunSummary::default(), Add::add)
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Total: {} | Pass: {} | Fail: {} | Skip: {} | Not run: {} | Time: {:.3}s",
            self.total,
            self.passed_count(),
            self.failed,
            self.skipped,
            self.not_run,
            self.time.as_secs_f64()
        )
    }
}
