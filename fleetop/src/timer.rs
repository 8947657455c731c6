//! Elapsed-time and countdown primitives used to pace refreshes.

use std::time::{Duration, Instant};

/// Stopwatch: seconds elapsed since creation or last reset.
#[derive(Debug, Clone, Copy)]
pub struct Counter {
    started: Instant,
}

impl Counter {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
        }
    }

    pub fn reset(&mut self) {
        self.started = Instant::now();
    }

    pub fn get(&self) -> Duration {
        self.started.elapsed()
    }
}

impl Default for Counter {
    fn default() -> Self {
        Self::new()
    }
}

/// Countdown that finishes once `duration` has passed since the last start.
#[derive(Debug, Clone, Copy)]
pub struct Timer {
    duration: Duration,
    target: Instant,
}

impl Timer {
    pub fn new(duration: Duration) -> Self {
        Self {
            duration,
            target: Instant::now() + duration,
        }
    }

    pub fn reset(&mut self, duration: Option<Duration>) {
        if let Some(d) = duration {
            self.duration = d;
        }
        self.target = Instant::now() + self.duration;
    }

    /// Time already consumed from the countdown.
    pub fn get(&self) -> Duration {
        self.duration
            .saturating_sub(self.target.saturating_duration_since(Instant::now()))
    }

    pub fn remaining(&self) -> Duration {
        self.target.saturating_duration_since(Instant::now())
    }

    pub fn finished(&self) -> bool {
        Instant::now() >= self.target
    }
}

/// Wait left in a refresh period after `spent` was consumed by update and export.
/// Never negative: a slow cycle yields an immediate next refresh.
pub fn adapted_refresh(refresh: Duration, spent: Duration) -> Duration {
    refresh.saturating_sub(spent)
}
