//! Server configuration.

use std::time::Duration;

use rym_settings::{Settings, WebSocketSettings};

/// Configuration for the HTTP listener and the connection hub.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Host to bind.
    pub host: String,
    /// Port to bind (`0` for auto-assign).
    pub port: u16,
    /// Origin allowed by CORS.
    pub frontend_url: String,
    /// Per-connection timing and buffering.
    pub session: SessionConfig,
    /// Capacity of the hub's command queue.
    pub hub_queue: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            frontend_url: "http://localhost:4200".into(),
            session: SessionConfig::default(),
            hub_queue: 1024,
        }
    }
}

impl From<&Settings> for ServerConfig {
    fn from(settings: &Settings) -> Self {
        Self {
            host: settings.server.host.clone(),
            port: settings.server.port,
            frontend_url: settings.server.frontend_url.clone(),
            session: SessionConfig::from(&settings.websocket),
            ..Self::default()
        }
    }
}

/// Liveness cadence and buffering of one client connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SessionConfig {
    /// Period of server-initiated Ping frames. Must be below `pong_wait`.
    pub ping_interval: Duration,
    /// Read deadline, refreshed by every Pong.
    pub pong_wait: Duration,
    /// Deadline for each outbound frame.
    pub write_wait: Duration,
    /// Largest inbound frame accepted.
    pub max_message_size: usize,
    /// Outbound mailbox capacity. Overflow tears the session down.
    pub mailbox_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::from(&WebSocketSettings::default())
    }
}

impl From<&WebSocketSettings> for SessionConfig {
    fn from(ws: &WebSocketSettings) -> Self {
        Self {
            ping_interval: Duration::from_secs(ws.ping_interval_secs),
            pong_wait: Duration::from_secs(ws.pong_wait_secs),
            write_wait: Duration::from_secs(ws.write_wait_secs),
            max_message_size: ws.max_message_size,
            mailbox_capacity: ws.mailbox_capacity.max(1),
        }
    }
}
