//! # rym-ledger
//!
//! Per-user voting credits that replenish with time.
//!
//! Replenishment is lazy: nothing ticks in the background. Whenever a balance
//! is read or spent, the whole intervals elapsed since the stored timestamp
//! are converted into credits (capped at the policy max) and persisted with a
//! compare-and-swap. Spending is a single conditional decrement in storage.

#![deny(unsafe_code)]

pub mod clock;
pub mod errors;
pub mod ledger;
pub mod policy;
pub mod replenish;

pub use clock::{Clock, ManualClock, SystemClock};
pub use errors::{LedgerError, Result};
pub use ledger::{CREDITS_SPENT_TOTAL, CreditLedger, CreditStatus};
pub use policy::{CreditPolicy, SharedPolicy};
pub use replenish::NextCredit;
