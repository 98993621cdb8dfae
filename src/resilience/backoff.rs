//! Retry pacing for a failing accept loop.

use std::time::Duration;
use rand::Rng;

/// First delay after an accept failure.
pub const ACCEPT_BACKOFF_BASE: Duration = Duration::from_millis(5);

/// Upper bound on the delay between consecutive accept retries.
pub const ACCEPT_BACKOFF_MAX: Duration = Duration::from_secs(1);

/// Doubling delay with up to 10% jitter, capped at `max`.
///
/// Counts consecutive failures; a successful accept resets it.
#[derive(Debug, Clone)]
pub struct AcceptBackoff {
    base: Duration,
    max: Duration,
    failures: u32,
}

impl Default for AcceptBackoff {
    fn default() -> Self {
        Self::new(ACCEPT_BACKOFF_BASE, ACCEPT_BACKOFF_MAX)
    }
}

impl AcceptBackoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self { base, max, failures: 0 }
    }

    /// Record a failure and return how long to wait before the next accept.
    pub fn on_failure(&mut self) -> Duration {
        self.failures = self.failures.saturating_add(1);
        let shift = (self.failures - 1).min(31);
        let delay = self.base.saturating_mul(1u32 << shift).min(self.max);

        let jitter_ms = delay.as_millis() as u64 / 10;
        if jitter_ms == 0 {
            return delay;
        }
        delay + Duration::from_millis(rand::thread_rng().gen_range(0..jitter_ms))
    }

    pub fn reset(&mut self) {
        self.failures = 0;
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.failures
    }
}
