//! # Exponential Backoff
//!
//! Provides the per-key retry delay policy used by the queue.
//!
//! The policy is kept as its own component rather than buried inside the
//! queue so the sequence can be tested on its own: the delay starts at a base
//! value, doubles on every consecutive failure, and is capped at a maximum.

use std::time::Duration;

/// Exponential backoff calculator.
///
/// `next_delay` returns the current delay and doubles it for the following
/// call, capped at the configured maximum. `reset` restarts the sequence
/// from the base delay.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    /// Base delay, returned first and after a reset
    base: Duration,
    /// Delay returned by the next `next_delay` call
    current: Duration,
    /// Ceiling for the delay sequence
    max: Duration,
}

impl ExponentialBackoff {
    /// Create a backoff with the given base delay and ceiling.
    #[must_use]
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            current: base,
            max,
        }
    }

    /// Get the next delay and advance the sequence.
    ///
    /// The sequence is base, 2x base, 4x base, ... capped at the maximum.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = std::cmp::min(self.current * 2, self.max);
        delay
    }

    /// Restart the sequence from the base delay.
    pub fn reset(&mut self) {
        self.current = self.base;
    }
}
