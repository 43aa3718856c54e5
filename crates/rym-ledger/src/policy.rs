//! Credit policy: interval, cap and the global pause switch.
//!
//! [`SharedPolicy`] is read at the start of every ledger operation, so an
//! admin update takes effect on the next evaluation without touching stored
//! timestamps.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use rym_settings::CreditSettings;

/// Replenishment parameters.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CreditPolicy {
    /// Time per earned credit. Never zero.
    pub interval: Duration,
    /// Balance cap.
    pub max: u32,
    /// Replenishment frozen.
    pub paused: bool,
}

impl CreditPolicy {
    /// Interval in milliseconds, at least 1.
    #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
    pub fn interval_ms(&self) -> i64 {
        (self.interval.as_millis().min(i64::MAX as u128) as i64).max(1)
    }
}

impl From<&CreditSettings> for CreditPolicy {
    fn from(settings: &CreditSettings) -> Self {
        Self {
            interval: settings.interval(),
            max: settings.max,
            paused: settings.voting_paused,
        }
    }
}

impl Default for CreditPolicy {
    fn default() -> Self {
        Self::from(&CreditSettings::default())
    }
}

/// Policy shared between the ledger and the admin surface.
#[derive(Clone, Debug, Default)]
pub struct SharedPolicy(Arc<RwLock<CreditPolicy>>);

impl SharedPolicy {
    /// Wrap an initial policy.
    pub fn new(policy: CreditPolicy) -> Self {
        Self(Arc::new(RwLock::new(policy)))
    }

    /// Current values.
    pub fn get(&self) -> CreditPolicy {
        *self.0.read()
    }

    /// Replace the policy. Returns the previous one.
    pub fn set(&self, policy: CreditPolicy) -> CreditPolicy {
        std::mem::replace(&mut *self.0.write(), policy)
    }

    /// Flip the pause switch. Returns the previous value.
    pub fn set_paused(&self, paused: bool) -> bool {
        std::mem::replace(&mut self.0.write().paused, paused)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_settings() {
        let p = CreditPolicy::from(&CreditSettings {
            interval_minutes: 10,
            max: 7,
            voting_paused: true,
        });
        assert_eq!(p.interval, Duration::from_secs(600));
        assert_eq!(p.interval_ms(), 600_000);
        assert_eq!(p.max, 7);
        assert!(p.paused);
    }

    #[test]
    fn shared_updates_are_visible_to_clones() {
        let shared = SharedPolicy::new(CreditPolicy::default());
        let other = shared.clone();
        assert!(!shared.set_paused(true));
        assert!(other.get().paused);

        let prev = other.set(CreditPolicy {
            max: 3,
            ..other.get()
        });
        assert_eq!(prev.max, 10);
        assert_eq!(shared.get().max, 3);
    }

    #[test]
    fn zero_interval_is_clamped() {
        let p = CreditPolicy {
            interval: Duration::ZERO,
            max: 1,
            paused: false,
        };
        assert_eq!(p.interval_ms(), 1);
    }
}
