//! Lazy replenishment math.
//!
//! Credits are never granted by a background ticker. Each read or spend
//! evaluates how many whole intervals elapsed since the stored timestamp and
//! advances the timestamp by exactly that many intervals, so partial progress
//! toward the next credit carries over.

use std::time::Duration;

use crate::policy::CreditPolicy;

/// Balance and replenishment timestamp of one user.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CreditState {
    /// Spendable credits.
    pub balance: u32,
    /// Last replenishment instant, unix milliseconds.
    pub last_replenish_ms: i64,
}

/// Apply elapsed whole intervals to `state`.
///
/// Returns `None` when nothing changes: paused, or less than one interval
/// elapsed. The new balance is capped at `policy.max`; the new timestamp is
/// `last + k * interval`, never later than `now_ms`.
pub fn replenish(state: CreditState, policy: &CreditPolicy, now_ms: i64) -> Option<CreditState> {
    if policy.paused {
        return None;
    }

    let interval = policy.interval_ms();
    let elapsed = now_ms.saturating_sub(state.last_replenish_ms);
    let whole = elapsed / interval;
    if whole <= 0 {
        return None;
    }

    let earned = u32::try_from(whole).unwrap_or(u32::MAX);
    let balance = state.balance.saturating_add(earned).min(policy.max);
    let last_replenish_ms = state
        .last_replenish_ms
        .saturating_add(whole.saturating_mul(interval))
        .min(now_ms);

    Some(CreditState {
        balance,
        last_replenish_ms,
    })
}

/// Time until the next credit is earned.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NextCredit {
    /// Replenishment is paused.
    Disabled,
    /// Remaining wait; zero at the cap.
    In(Duration),
}

impl NextCredit {
    /// Whole seconds remaining, `-1` when disabled.
    #[allow(clippy::cast_possible_wrap)]
    pub fn as_secs(&self) -> i64 {
        match self {
            Self::Disabled => -1,
            Self::In(d) => d.as_secs() as i64,
        }
    }
}

/// Derive [`NextCredit`] from an already replenished state.
#[allow(clippy::cast_sign_loss)]
pub fn next_credit(state: CreditState, policy: &CreditPolicy, now_ms: i64) -> NextCredit {
    if policy.paused {
        return NextCredit::Disabled;
    }
    if state.balance >= policy.max {
        return NextCredit::In(Duration::ZERO);
    }
    let elapsed = now_ms.saturating_sub(state.last_replenish_ms).max(0);
    let remaining = policy.interval_ms().saturating_sub(elapsed).max(0);
    NextCredit::In(Duration::from_millis(remaining as u64))
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIN: i64 = 60_000;

    fn policy(max: u32) -> CreditPolicy {
        CreditPolicy {
            interval: Duration::from_secs(600),
            max,
            paused: false,
        }
    }

    fn state(balance: u32, last: i64) -> CreditState {
        CreditState {
            balance,
            last_replenish_ms: last,
        }
    }

    #[test]
    fn partial_interval_is_preserved() {
        let next = replenish(state(3, 0), &policy(10), 25 * MIN).unwrap();
        assert_eq!(next.balance, 5);
        assert_eq!(next.last_replenish_ms, 20 * MIN);
    }

    #[test]
    fn balance_caps_at_max() {
        let next = replenish(state(9, 0), &policy(10), 100 * MIN).unwrap();
        assert_eq!(next.balance, 10);
        assert_eq!(next.last_replenish_ms, 100 * MIN);
    }

    #[test]
    fn at_cap_timestamp_still_advances() {
        let next = replenish(state(10, 0), &policy(10), 15 * MIN).unwrap();
        assert_eq!(next.balance, 10);
        assert_eq!(next.last_replenish_ms, 10 * MIN);
    }

    #[test]
    fn less_than_one_interval_is_noop() {
        assert_eq!(replenish(state(3, 0), &policy(10), 9 * MIN), None);
    }

    #[test]
    fn paused_is_noop() {
        let mut p = policy(10);
        p.paused = true;
        assert_eq!(replenish(state(3, 0), &p, 100 * MIN), None);
    }

    #[test]
    fn clock_behind_timestamp_is_noop() {
        assert_eq!(replenish(state(3, 50 * MIN), &policy(10), 10 * MIN), None);
    }

    #[test]
    fn lowered_cap_clamps_balance() {
        let next = replenish(state(8, 0), &policy(5), 10 * MIN).unwrap();
        assert_eq!(next.balance, 5);
    }

    #[test]
    fn timestamp_never_passes_now() {
        for now in [10 * MIN, 10 * MIN + 1, 19 * MIN, 123 * MIN + 7] {
            let next = replenish(state(0, 0), &policy(100), now).unwrap();
            assert!(next.last_replenish_ms <= now);
            assert!(now - next.last_replenish_ms < 10 * MIN);
        }
    }

    #[test]
    fn next_credit_variants() {
        let p = policy(10);
        assert_eq!(
            next_credit(state(3, 0), &p, 4 * MIN),
            NextCredit::In(Duration::from_secs(6 * 60))
        );
        assert_eq!(next_credit(state(10, 0), &p, 4 * MIN), NextCredit::In(Duration::ZERO));

        let mut paused = p;
        paused.paused = true;
        assert_eq!(next_credit(state(3, 0), &paused, 4 * MIN), NextCredit::Disabled);
        assert_eq!(NextCredit::Disabled.as_secs(), -1);
        assert_eq!(NextCredit::In(Duration::from_millis(1_500)).as_secs(), 1);
    }
}
