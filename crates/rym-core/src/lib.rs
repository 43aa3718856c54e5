//! # rym-core
//!
//! Foundation types shared by every Rate-Your-Mate crate:
//!
//! - **IDs**: `UserId`, `VoteId` as integer newtypes
//! - **Messages**: the `{ "type", "payload" }` envelope pushed to clients
//! - **Achievements**: the static catalog votes refer to
//! - **Retry**: contention retry policy and backoff math
//! - **Logging**: `tracing` subscriber bootstrap

#![deny(unsafe_code)]

pub mod achievements;
pub mod ids;
pub mod logging;
pub mod messages;
pub mod retry;

pub use ids::{UserId, VoteId};
pub use messages::{
    Envelope, ErrorPayload, MessageKind, SettingsPayload, UserJoinedPayload, VotePayload,
};
