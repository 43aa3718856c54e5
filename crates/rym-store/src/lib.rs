//! # rym-store
//!
//! Persistence for Rate-Your-Mate.
//!
//! - [`sqlite`]: connection pool, migrations, row types and stateless repositories
//! - [`retry`]: the contention retry executor used for every write
//! - [`Store`]: async facade running repository closures on the blocking pool
//!
//! Write contention on `SQLite` (`SQLITE_BUSY` / `SQLITE_LOCKED`) is retried with
//! exponential backoff; once attempts run out callers see
//! [`StoreError::ResourceBusy`].

#![deny(unsafe_code)]

pub mod errors;
pub mod retry;
pub mod sqlite;
pub mod store;

pub use errors::{Result, StoreError};
pub use retry::RetryExecutor;
pub use sqlite::repositories::{UserRepo, VoteRepo};
pub use sqlite::row_types::{NewUser, RecipientTally, UserRow, VoteDetailsRow};
pub use store::Store;
