//! Tunable policy settings injected into repositories.

use std::time::Duration;

/// Knobs for the local-first sync policy.
///
/// Passed explicitly into repository constructors; nothing in the core reads
/// ambient global state. The retry bounds implement the
/// bounded-retry-then-flag-conflict policy.
#[derive(Debug, Clone)]
pub struct SyncSettings {
    /// Failed push attempts before a pending record is flagged `Conflict`.
    pub max_push_attempts: u32,
    /// Base delay for the exponential push backoff.
    pub backoff_base: Duration,
    /// Exponent clamp for the backoff curve.
    pub backoff_max_exponent: u32,
    /// Remote augmentation is skipped when the last successful refresh for
    /// an owner is younger than this.
    pub read_refresh_interval: Duration,
    /// Clean records whose local timestamp is older than this are eligible
    /// for cache eviction after a confirmed remote reconcile.
    pub retention: Duration,
    /// Default page size for paged reads.
    pub default_page_size: u32,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            max_push_attempts: 5,
            backoff_base: Duration::from_secs(5),
            backoff_max_exponent: 8,
            read_refresh_interval: Duration::from_secs(45),
            retention: Duration::from_secs(60 * 60 * 24 * 180),
            default_page_size: 20,
        }
    }
}
