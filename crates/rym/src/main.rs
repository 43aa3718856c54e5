//! # rym
//!
//! Rate-Your-Mate server binary. Loads settings, opens the store, wires the
//! credit ledger into the HTTP/WebSocket server and runs until signalled.

#![deny(unsafe_code)]

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use rym_core::logging::init_subscriber;
use rym_ledger::{CreditLedger, CreditPolicy, SharedPolicy};
use rym_server::metrics::install_recorder;
use rym_server::{RymServer, ServerConfig, shutdown_signal};
use rym_settings::{Settings, load_settings_from_path, settings_path};
use rym_store::Store;
use tracing::{info, warn};

/// Rate-Your-Mate LAN party server.
#[derive(Parser, Debug)]
#[command(name = "rym", about = "Rate-Your-Mate LAN party server")]
struct Cli {
    /// Settings file (defaults to `$RYM_CONFIG`, then `rym.json`).
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, 0 for auto-assign (overrides settings).
    #[arg(long)]
    port: Option<u16>,

    /// Database file (overrides settings).
    #[arg(long)]
    db_path: Option<PathBuf>,
}

impl Cli {
    fn apply(&self, settings: &mut Settings) {
        if let Some(host) = &self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(path) = &self.db_path {
            settings.database.path = path.to_string_lossy().into_owned();
        }
    }
}

fn load(cli: &Cli) -> Result<Settings> {
    let path = cli.config.clone().unwrap_or_else(settings_path);
    let mut settings = load_settings_from_path(&path)
        .with_context(|| format!("Failed to load settings from {}", path.display()))?;
    cli.apply(&mut settings);
    settings.validate().context("Invalid settings")?;
    Ok(settings)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = load(&cli)?;
    init_subscriber(&settings.logging.level, settings.logging.json);

    let store = Store::open(&settings.database, settings.retry.policy())
        .with_context(|| format!("Failed to open database at {}", settings.database.path))?;
    let policy = SharedPolicy::new(CreditPolicy::from(&settings.credits));
    let ledger = CreditLedger::new(store.clone(), policy);

    let mut server = RymServer::new(
        ServerConfig::from(&settings),
        store,
        ledger,
        settings.auth.clone(),
    );
    match install_recorder() {
        Ok(handle) => server = server.with_metrics(handle),
        Err(e) => warn!(error = %e, "metrics recorder not installed"),
    }

    let (addr, handle) = server.listen().await.context("Failed to bind listener")?;
    info!(
        %addr,
        credit_interval_minutes = settings.credits.interval_minutes,
        credit_max = settings.credits.max,
        admins = settings.auth.admin_steam_ids.len(),
        "rate-your-mate server ready"
    );

    shutdown_signal().await;
    info!("shutting down");
    server.stop(handle).await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_defaults() {
        let cli = Cli::parse_from(["rym"]);
        assert!(cli.config.is_none());
        assert!(cli.host.is_none());
        assert!(cli.port.is_none());
    }

    #[test]
    fn cli_overrides_apply() {
        let cli = Cli::parse_from([
            "rym", "--config", "/etc/rym.json", "--host", "127.0.0.1", "--port", "0", "--db-path",
            "/tmp/x.db",
        ]);
        assert_eq!(cli.config, Some(PathBuf::from("/etc/rym.json")));

        let mut settings = Settings::default();
        cli.apply(&mut settings);
        assert_eq!(settings.server.host, "127.0.0.1");
        assert_eq!(settings.server.port, 0);
        assert_eq!(settings.database.path, "/tmp/x.db");
    }

    #[test]
    fn load_reads_file_and_validates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rym.json");
        std::fs::write(
            &path,
            r#"{ "auth": { "jwt_secret": "s3cret" }, "credits": { "max": 3 } }"#,
        )
        .unwrap();
        let cli = Cli::parse_from(["rym", "--config", path.to_str().unwrap()]);
        let settings = load(&cli).unwrap();
        assert_eq!(settings.credits.max, 3);
        assert_eq!(settings.auth.jwt_secret, "s3cret");
    }

    #[test]
    fn load_rejects_missing_secret() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.json");
        let cli = Cli::parse_from(["rym", "--config", path.to_str().unwrap()]);
        let err = load(&cli).unwrap_err();
        assert!(format!("{err:#}").contains("jwt_secret"));
    }
}
