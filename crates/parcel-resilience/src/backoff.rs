//! Jittered exponential backoff for per-chunk retry.
//!
//! Delay grows as `base * 2^attempt`, scaled by a uniform random factor in
//! `[0.5, 1.0)` (multiplicative half-jitter) so a burst of chunks failing
//! at the same instant doesn't retry in lockstep and hammer the server
//! again on the same schedule.

use rand::Rng;
use std::time::Duration;

/// A bounded exponential backoff schedule.
#[derive(Debug, Clone, Copy)]
pub struct BackoffPolicy {
    base: Duration,
    max_attempts: u32,
}

impl BackoffPolicy {
    pub fn new(base: Duration, max_attempts: u32) -> Self {
        Self { base, max_attempts }
    }

    /// Maximum number of attempts this policy allows, including the first.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Whether another attempt is allowed after `attempt` (0-indexed)
    /// failures so far.
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt + 1 < self.max_attempts
    }

    /// Delay to wait before retry attempt number `attempt` (0-indexed: the
    /// delay before the *second* try is `delay_for(0)`).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2f64.powi(attempt as i32);
        let jitter = rand::rng().random_range(0.5..1.0);
        Duration::from_secs_f64(self.base.as_secs_f64() * factor * jitter)
    }
}
