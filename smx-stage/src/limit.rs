//! Rate limiting for configuration writes.
//!
//! Config writes hit the stage's EEPROM, so the interface enforces a
//! minimum spacing between them and reports the remaining wait instead of
//! blocking.

use std::time::{Duration, Instant};

/// Time source for the write window; swapped for a fake in tests.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// The system monotonic clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct MonotonicClock;

impl Clock for MonotonicClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Tracks the most recent claimed write and enforces the spacing.
#[derive(Debug)]
pub struct WriteWindow {
    min_interval: Duration,
    last: Option<Instant>,
}

impl WriteWindow {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last: None,
        }
    }

    /// Claim the window at `now`. On rejection returns how long until the
    /// window reopens; the claim is not recorded.
    pub fn try_claim(&mut self, now: Instant) -> Result<(), Duration> {
        if let Some(last) = self.last {
            let elapsed = now.saturating_duration_since(last);
            if elapsed < self.min_interval {
                return Err(self.min_interval - elapsed);
            }
        }
        self.last = Some(now);
        Ok(())
    }
}
