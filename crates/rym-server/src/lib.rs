//! # rym-server
//!
//! Axum HTTP + WebSocket server for Rate-Your-Mate.
//!
//! - [`websocket`]: the connection hub actor and per-client sessions
//! - [`handlers`]: REST routes for votes, credits, settings and lookups
//! - [`auth`]: bearer-token verification and admin gating
//! - [`server`]: router assembly, shared state and the listener
//! - [`shutdown`]: cancellation-token based graceful shutdown
//! - [`metrics`]: Prometheus recorder and metric names

#![deny(unsafe_code)]

pub mod auth;
pub mod config;
pub mod errors;
pub mod handlers;
pub mod health;
pub mod metrics;
pub mod server;
pub mod shutdown;
pub mod websocket;

pub use auth::{AdminUser, AuthUser, Claims, TokenKeys};
pub use config::{ServerConfig, SessionConfig};
pub use errors::ApiError;
pub use server::{AppState, RymServer};
pub use shutdown::{ShutdownCoordinator, shutdown_signal};
pub use websocket::Hub;
