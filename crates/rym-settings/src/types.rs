//! Settings type definitions.
//!
//! Every section implements [`Default`] with production values and is marked
//! `#[serde(default)]`, so a partial JSON file only needs the keys it changes.

use std::time::Duration;

use rym_core::retry::RetryPolicy;
use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Allowed range for `credits.interval_minutes`.
pub const CREDIT_INTERVAL_RANGE: (u32, u32) = (1, 60);
/// Allowed range for `credits.max`.
pub const CREDIT_MAX_RANGE: (u32, u32) = (1, 100);

/// Root settings type.
///
/// ```json
/// {
///   "server": { "port": 9090 },
///   "credits": { "interval_minutes": 5 }
/// }
/// ```
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// HTTP listener.
    pub server: ServerSettings,
    /// Storage engine.
    pub database: DatabaseSettings,
    /// Credit economy.
    pub credits: CreditSettings,
    /// Token verification and admin list.
    pub auth: AuthSettings,
    /// Session timing and buffering.
    pub websocket: WebSocketSettings,
    /// Contention retry.
    pub retry: RetrySettings,
    /// Log output.
    pub logging: LoggingSettings,
}

impl Settings {
    /// Check cross-field and range constraints.
    pub fn validate(&self) -> Result<()> {
        if self.auth.jwt_secret.trim().is_empty() {
            return Err(SettingsError::InvalidValue(
                "auth.jwt_secret must be set".to_string(),
            ));
        }
        let (lo, hi) = CREDIT_INTERVAL_RANGE;
        if !(lo..=hi).contains(&self.credits.interval_minutes) {
            return Err(SettingsError::InvalidValue(format!(
                "credits.interval_minutes must be between {lo} and {hi}"
            )));
        }
        let (lo, hi) = CREDIT_MAX_RANGE;
        if !(lo..=hi).contains(&self.credits.max) {
            return Err(SettingsError::InvalidValue(format!(
                "credits.max must be between {lo} and {hi}"
            )));
        }
        if self.websocket.ping_interval_secs >= self.websocket.pong_wait_secs {
            return Err(SettingsError::InvalidValue(
                "websocket.ping_interval_secs must be below websocket.pong_wait_secs".to_string(),
            ));
        }
        if self.websocket.mailbox_capacity == 0 {
            return Err(SettingsError::InvalidValue(
                "websocket.mailbox_capacity must be positive".to_string(),
            ));
        }
        if self.database.pool_size == 0 {
            return Err(SettingsError::InvalidValue(
                "database.pool_size must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// HTTP listener settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Bind port (0 picks an ephemeral port).
    pub port: u16,
    /// Allowed CORS origin.
    pub frontend_url: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            frontend_url: "http://localhost:4200".to_string(),
        }
    }
}

/// Which storage engine backs the store.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatabaseBackend {
    /// Embedded single-writer engine; writes retry on contention.
    #[default]
    Sqlite,
    /// Engine with native concurrent writers; writes run once.
    Concurrent,
}

impl std::str::FromStr for DatabaseBackend {
    type Err = SettingsError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sqlite" => Ok(Self::Sqlite),
            "concurrent" | "mysql" => Ok(Self::Concurrent),
            other => Err(SettingsError::InvalidValue(format!(
                "unknown database backend '{other}'"
            ))),
        }
    }
}

/// Storage settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    /// Database file path.
    pub path: String,
    /// Storage engine kind.
    pub backend: DatabaseBackend,
    /// Maximum pooled connections.
    pub pool_size: u32,
    /// `SQLite` busy timeout per statement.
    pub busy_timeout_ms: u64,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            path: "data/rym.db".to_string(),
            backend: DatabaseBackend::Sqlite,
            pool_size: 5,
            busy_timeout_ms: 10_000,
        }
    }
}

/// Credit economy settings. Admins can change these at runtime.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CreditSettings {
    /// Minutes per earned credit.
    pub interval_minutes: u32,
    /// Balance cap.
    pub max: u32,
    /// Freeze credit generation.
    pub voting_paused: bool,
}

impl Default for CreditSettings {
    fn default() -> Self {
        Self {
            interval_minutes: 10,
            max: 10,
            voting_paused: false,
        }
    }
}

impl CreditSettings {
    /// Interval as a [`Duration`].
    pub fn interval(&self) -> Duration {
        Duration::from_secs(u64::from(self.interval_minutes) * 60)
    }
}

/// Authentication settings.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthSettings {
    /// HS256 secret shared with the login service.
    pub jwt_secret: String,
    /// Steam IDs allowed to use admin routes.
    pub admin_steam_ids: Vec<String>,
}

impl AuthSettings {
    /// Whether `steam_id` is on the admin list.
    pub fn is_admin(&self, steam_id: &str) -> bool {
        self.admin_steam_ids.iter().any(|id| id == steam_id)
    }
}

/// Session timing and buffering.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct WebSocketSettings {
    /// Seconds between liveness probes.
    pub ping_interval_secs: u64,
    /// Seconds without a pong before the peer is considered dead.
    pub pong_wait_secs: u64,
    /// Seconds allowed per outbound frame.
    pub write_wait_secs: u64,
    /// Largest accepted inbound frame in bytes.
    pub max_message_size: usize,
    /// Outbound mailbox slots per session.
    pub mailbox_capacity: usize,
}

impl Default for WebSocketSettings {
    fn default() -> Self {
        Self {
            ping_interval_secs: 54,
            pong_wait_secs: 60,
            write_wait_secs: 10,
            max_message_size: 512,
            mailbox_capacity: 256,
        }
    }
}

/// Contention retry settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    /// Attempts including the first.
    pub max_attempts: u32,
    /// First backoff delay.
    pub base_delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            max_attempts: policy.max_attempts,
            base_delay_ms: policy.base_delay_ms,
        }
    }
}

impl RetrySettings {
    /// Convert to the executor's policy.
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_attempts, self.base_delay_ms)
    }
}

/// Log output settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Default filter directive.
    pub level: String,
    /// One JSON object per line.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}
