//! Bounded retry policy with capped exponential backoff.

use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::Rng;

use crate::settings::SyncSettings;

/// Backoff and attempt bounds for background pushes.
///
/// Owned by the repository; nothing else schedules retries, and nothing
/// retries implicitly inside the remote client.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    base: Duration,
    max_exponent: u32,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base: Duration, max_exponent: u32) -> Self {
        Self {
            max_attempts,
            base,
            // Anything past 30 doubles into meaninglessness.
            max_exponent: max_exponent.min(30),
        }
    }

    pub fn from_settings(settings: &SyncSettings) -> Self {
        Self::new(
            settings.max_push_attempts,
            settings.backoff_base,
            settings.backoff_max_exponent,
        )
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// True while another push attempt is allowed after `attempts` failures.
    pub fn allows(&self, attempts: u32) -> bool {
        attempts < self.max_attempts
    }

    /// Capped exponential backoff: `base * 2^attempts`.
    pub fn backoff(&self, attempts: u32) -> Duration {
        let exponent = attempts.min(self.max_exponent);
        self.base.saturating_mul(1_u32 << exponent)
    }

    /// Absolute due time for the next attempt: backoff plus up to 20%
    /// jitter so reconnecting clients do not retry in lockstep.
    pub fn next_attempt_at(&self, attempts: u32, now: DateTime<Utc>) -> DateTime<Utc> {
        let backoff = self.backoff(attempts);
        let jitter_cap = (backoff.as_millis() as u64 / 5).max(1);
        let jitter_ms = rand::thread_rng().gen_range(0..=jitter_cap);
        let total_ms = backoff.as_millis() as u64 + jitter_ms;
        now + chrono::Duration::milliseconds(total_ms.min(i64::MAX as u64) as i64)
    }
}
