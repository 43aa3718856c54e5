//! The credit ledger.
//!
//! Balances live only in storage. Every operation is a conditional write, so
//! concurrent requests (and several ledger instances sharing one database)
//! cannot overdraw a balance. No in-process lock guards the balance.

use std::sync::Arc;

use metrics::counter;
use rusqlite::Connection;
use rym_core::UserId;
use rym_store::{NewUser, Store, StoreError, UserRepo, UserRow};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use crate::clock::{Clock, SystemClock};
use crate::errors::{LedgerError, Result};
use crate::policy::{CreditPolicy, SharedPolicy};
use crate::replenish::{CreditState, NextCredit, next_credit, replenish};

/// Credits spent on votes (counter).
pub const CREDITS_SPENT_TOTAL: &str = "credits_spent_total";

/// Rounds of read-compute-swap before giving up on persisting replenishment.
const MAX_CAS_ROUNDS: u32 = 8;

/// Balance snapshot returned to clients.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CreditStatus {
    /// Current balance after lazy replenishment.
    pub credits: u32,
    /// Cap in force.
    pub max: u32,
    /// Wait until the next credit.
    pub next_credit: NextCredit,
}

enum SpendOutcome {
    Spent(u32),
    Short(u32),
    Missing,
}

/// Per-user replenishing credit counter backed by the store.
#[derive(Clone)]
pub struct CreditLedger {
    store: Store,
    policy: SharedPolicy,
    clock: Arc<dyn Clock>,
}

impl CreditLedger {
    /// Ledger on the system clock.
    pub fn new(store: Store, policy: SharedPolicy) -> Self {
        Self::with_clock(store, policy, Arc::new(SystemClock))
    }

    /// Ledger on an explicit clock.
    pub fn with_clock(store: Store, policy: SharedPolicy, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            policy,
            clock,
        }
    }

    /// Shared policy handle.
    pub fn policy(&self) -> &SharedPolicy {
        &self.policy
    }

    /// Create the credit record at first sight, or refresh the profile.
    ///
    /// New users start at zero with the replenishment clock at now.
    /// Returns the row and whether it was created.
    #[instrument(skip(self, cancel, profile), fields(steam_id = %profile.steam_id))]
    pub async fn ensure_user(
        &self,
        cancel: &CancellationToken,
        profile: NewUser,
    ) -> Result<(UserRow, bool)> {
        let now_ms = self.clock.now_ms();
        let (row, created) = self
            .store
            .write(cancel, move |conn| UserRepo::upsert(conn, &profile, now_ms))
            .await?;
        if created {
            info!(user_id = %row.id, "credit record created");
        }
        Ok((row, created))
    }

    /// Balance after lazy replenishment.
    pub async fn current_balance(&self, cancel: &CancellationToken, user: UserId) -> Result<u32> {
        Ok(self.refresh(cancel, user).await?.balance)
    }

    /// Balance, cap and time until the next credit.
    pub async fn snapshot(&self, cancel: &CancellationToken, user: UserId) -> Result<CreditStatus> {
        let policy = self.policy.get();
        let state = self.refresh(cancel, user).await?;
        Ok(CreditStatus {
            credits: state.balance,
            max: policy.max,
            next_credit: next_credit(state, &policy, self.clock.now_ms()),
        })
    }

    /// Time until the next credit for `user`.
    pub async fn time_until_next_credit(
        &self,
        cancel: &CancellationToken,
        user: UserId,
    ) -> Result<NextCredit> {
        Ok(self.snapshot(cancel, user).await?.next_credit)
    }

    /// Atomically deduct `cost`. Returns the remaining balance.
    ///
    /// Replenishment is applied first. The deduction itself is a single
    /// decrement-if-sufficient write; a short balance is left untouched and
    /// reported as [`LedgerError::InsufficientCredits`].
    #[instrument(skip(self, cancel), fields(user_id = %user))]
    pub async fn spend(&self, cancel: &CancellationToken, user: UserId, cost: u32) -> Result<u32> {
        let policy = self.policy.get();
        let now_ms = self.clock.now_ms();

        let outcome = self
            .store
            .write(cancel, move |conn| {
                if refresh_in(conn, user, &policy, now_ms)?.is_none() {
                    return Ok(SpendOutcome::Missing);
                }
                Ok(match UserRepo::spend(conn, user, cost)? {
                    Some(remaining) => SpendOutcome::Spent(remaining),
                    None => match UserRepo::get(conn, user)? {
                        Some(row) => SpendOutcome::Short(row.credits),
                        None => SpendOutcome::Missing,
                    },
                })
            })
            .await?;

        match outcome {
            SpendOutcome::Spent(remaining) => {
                counter!(CREDITS_SPENT_TOTAL).increment(u64::from(cost));
                debug!(cost, remaining, "credits spent");
                Ok(remaining)
            }
            SpendOutcome::Short(balance) => {
                debug!(cost, balance, "insufficient credits");
                Err(LedgerError::InsufficientCredits { balance, cost })
            }
            SpendOutcome::Missing => Err(LedgerError::UserNotFound(user)),
        }
    }

    /// Return `amount` credits, capped at the current max.
    ///
    /// Used when a step after a successful spend fails.
    #[instrument(skip(self, cancel), fields(user_id = %user))]
    pub async fn refund(&self, cancel: &CancellationToken, user: UserId, amount: u32) -> Result<()> {
        let max = self.policy.get().max;
        let _ = self
            .store
            .write(cancel, move |conn| UserRepo::refund(conn, user, amount, max))
            .await?;
        debug!(amount, "credits refunded");
        Ok(())
    }

    /// Give every user one credit, each capped at `max`. Returns how many changed.
    #[instrument(skip(self, cancel))]
    pub async fn replenish_all(&self, cancel: &CancellationToken, max: u32) -> Result<usize> {
        let changed = self
            .store
            .write(cancel, move |conn| UserRepo::give_everyone_credit(conn, max))
            .await?;
        info!(changed, "gave everyone a credit");
        Ok(changed)
    }

    /// Zero every balance. Returns how many users were affected.
    #[instrument(skip(self, cancel))]
    pub async fn reset_all(&self, cancel: &CancellationToken) -> Result<usize> {
        let changed = self.store.write(cancel, UserRepo::reset_all_credits).await?;
        info!(changed, "reset all credits");
        Ok(changed)
    }

    async fn refresh(&self, cancel: &CancellationToken, user: UserId) -> Result<CreditState> {
        let policy = self.policy.get();
        let now_ms = self.clock.now_ms();
        self.store
            .write(cancel, move |conn| refresh_in(conn, user, &policy, now_ms))
            .await?
            .ok_or(LedgerError::UserNotFound(user))
    }
}

/// Read, replenish and persist with compare-and-swap on one connection.
///
/// `Ok(None)` means the user does not exist.
fn refresh_in(
    conn: &Connection,
    user: UserId,
    policy: &CreditPolicy,
    now_ms: i64,
) -> std::result::Result<Option<CreditState>, StoreError> {
    for _ in 0..MAX_CAS_ROUNDS {
        let Some(row) = UserRepo::get(conn, user)? else {
            return Ok(None);
        };
        let current = CreditState {
            balance: row.credits,
            last_replenish_ms: row.last_credit_at,
        };
        let Some(next) = replenish(current, policy, now_ms) else {
            return Ok(Some(current));
        };
        if UserRepo::compare_and_set_credits(
            conn,
            user,
            (current.balance, current.last_replenish_ms),
            (next.balance, next.last_replenish_ms),
        )? {
            debug!(
                user_id = %user,
                from = current.balance,
                to = next.balance,
                "credits replenished"
            );
            return Ok(Some(next));
        }
    }
    Err(StoreError::Internal(format!(
        "credit record for user {user} kept changing during replenishment"
    )))
}
