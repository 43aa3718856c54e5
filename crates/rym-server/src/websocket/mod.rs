//! Connection hub and per-client sessions.

pub mod hub;
pub mod session;

pub use hub::{DeliveryReport, Frame, Hub, HubCommand, Registry, SessionEntry, SessionId};
pub use session::run_session;
