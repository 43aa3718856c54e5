//! Retry policy and backoff math.
//!
//! The async execution lives in `rym-store`, which owns the runtime and the
//! error classification. This module only holds the numbers.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default number of attempts, the first one included.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;
/// Default delay before the first retry in milliseconds.
pub const DEFAULT_BASE_DELAY_MS: u64 = 50;

/// Exponential backoff parameters.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts before giving up (at least 1).
    pub max_attempts: u32,
    /// Delay after the first failed attempt; doubles after each further failure.
    pub base_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay_ms: DEFAULT_BASE_DELAY_MS,
        }
    }
}

impl RetryPolicy {
    /// Policy with explicit values. `max_attempts` is clamped to at least 1.
    #[must_use]
    pub fn new(max_attempts: u32, base_delay_ms: u64) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay_ms,
        }
    }

    /// Delay to wait after the failed attempt with zero-based index `attempt`.
    ///
    /// `base * 2^attempt`, saturating.
    #[must_use]
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let factor = 1u64 << attempt.min(31);
        Duration::from_millis(self.base_delay_ms.saturating_mul(factor))
    }

    /// Whether another attempt is allowed after `attempts` have been made.
    #[must_use]
    pub fn has_attempts_left(&self, attempts: u32) -> bool {
        attempts < self.max_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_values() {
        let p = RetryPolicy::default();
        assert_eq!(p.max_attempts, 5);
        assert_eq!(p.base_delay_ms, 50);
    }

    #[test]
    fn backoff_doubles() {
        let p = RetryPolicy::default();
        assert_eq!(p.backoff_delay(0), Duration::from_millis(50));
        assert_eq!(p.backoff_delay(1), Duration::from_millis(100));
        assert_eq!(p.backoff_delay(2), Duration::from_millis(200));
        assert_eq!(p.backoff_delay(3), Duration::from_millis(400));
    }

    #[test]
    fn backoff_saturates() {
        let p = RetryPolicy::new(3, u64::MAX / 2);
        assert_eq!(p.backoff_delay(40), Duration::from_millis(u64::MAX));
    }

    #[test]
    fn zero_attempts_clamped() {
        let p = RetryPolicy::new(0, 10);
        assert_eq!(p.max_attempts, 1);
        assert!(p.has_attempts_left(0));
        assert!(!p.has_attempts_left(1));
    }
}
