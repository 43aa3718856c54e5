//! Ledger error types.

use rym_core::UserId;
use rym_store::StoreError;
use thiserror::Error;

/// Errors returned by [`CreditLedger`](crate::CreditLedger) operations.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// The balance is below the cost. Expected; callers branch on it.
    #[error("insufficient credits: have {balance}, need {cost}")]
    InsufficientCredits {
        /// Balance after lazy replenishment.
        balance: u32,
        /// Requested cost.
        cost: u32,
    },

    /// No credit record for this user.
    #[error("user not found: {0}")]
    UserNotFound(UserId),

    /// Storage failure, including exhausted contention retries.
    #[error(transparent)]
    Storage(#[from] StoreError),
}

impl LedgerError {
    /// Whether storage stayed busy through every retry.
    pub fn is_resource_busy(&self) -> bool {
        matches!(self, Self::Storage(StoreError::ResourceBusy { .. }))
    }
}

/// Result type for ledger operations.
pub type Result<T> = std::result::Result<T, LedgerError>;
