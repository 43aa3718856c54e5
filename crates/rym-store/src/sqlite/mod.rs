//! `SQLite` backend.
//!
//! - **[`connection`]**: `r2d2` pool with WAL, foreign keys and busy timeout
//!   applied to every connection.
//! - **[`migrations`]**: version-tracked schema, embedded at compile time.
//! - **[`row_types`]**: raw row structs.
//! - **[`repositories`]**: stateless repositories; each method takes
//!   `&Connection` and executes SQL.

pub mod connection;
pub mod migrations;
pub mod repositories;
pub mod row_types;

pub use connection::{
    ConnectionConfig, ConnectionPool, PooledConnection, PragmaState, new_file, verify_pragmas,
};
pub use migrations::{current_version, latest_version, run_migrations};
