//! Siteprobe server binary.
//!
//! Usage: `siteprobe [--config <path>]`. Without `--config` the platform
//! config file is used when present; `SITEPROBE_*` variables override both.

use anyhow::Context;
use clap::Parser;
use siteprobe_browser::SessionPool;
use siteprobe_core::AppConfig;
use siteprobe_db::Database;
use siteprobe_scanner::{
    BroadcastReporter, FanoutReporter, FsBlobStore, HttpRelayReporter, ScanOptions,
    ScanOrchestrator,
};
use siteprobe_server::{router, AppState};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// Capacity of the in-process update channel feeding SSE clients
const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Initialize tracing subscriber for logging
fn init_tracing() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,siteprobe=debug"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(filter)
        .init();
}

#[derive(Parser, Debug)]
#[command(name = "siteprobe")]
#[command(about = "Siteprobe - website QA scan server")]
#[command(version)]
struct Cli {
    /// Configuration file path (defaults to the platform config dir)
    #[arg(short, long)]
    config: Option<PathBuf>,
}

fn load_config(cli: &Cli) -> anyhow::Result<AppConfig> {
    match &cli.config {
        Some(path) => {
            let mut config = AppConfig::load_from(path)
                .with_context(|| format!("failed to load config from {}", path.display()))?;
            config.apply_env_overrides(|key| std::env::var(key).ok());
            config.validate()?;
            Ok(config)
        }
        None => Ok(AppConfig::load_with_env()?),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing();
    info!("Starting Siteprobe v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config(&cli)?;

    let db = Database::new(&config.storage.database_path)
        .await
        .context("failed to open database")?;
    db.run_migrations()
        .await
        .context("failed to run database migrations")?;
    info!(
        "Database ready at {} (schema v{})",
        config.storage.database_path.display(),
        db.get_schema_version().await?
    );

    let events = BroadcastReporter::new(EVENT_CHANNEL_CAPACITY);
    let mut reporters = FanoutReporter::new().with(Arc::new(events.clone()));
    if let Some(relay) = &config.notifications.relay_url {
        let endpoint = url::Url::parse(relay)
            .with_context(|| format!("invalid notifications.relay_url '{relay}'"))?;
        info!("Relaying scan updates to {}", endpoint);
        reporters = reporters.with(Arc::new(HttpRelayReporter::new(endpoint)));
    }

    let sessions = Arc::new(SessionPool::new(config.browser.clone()));
    let blob_store = FsBlobStore::new(
        config.storage.screenshot_dir.clone(),
        config.storage.public_base_url.clone(),
    );

    let orchestrator = Arc::new(
        ScanOrchestrator::new(sessions, Arc::new(db), ScanOptions::from_config(&config))
            .with_default_modules(&config.audits)
            .with_reporter(Arc::new(reporters))
            .with_blob_store(Arc::new(blob_store)),
    );

    let app = router(AppState::new(orchestrator, events));
    let listener = tokio::net::TcpListener::bind(&config.server.bind_address)
        .await
        .with_context(|| format!("failed to bind {}", config.server.bind_address))?;
    info!("Listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Siteprobe stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
    info!("Shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_config_forms() {
        let cli = Cli::try_parse_from(["siteprobe"]).unwrap();
        assert!(cli.config.is_none());

        let cli = Cli::try_parse_from(["siteprobe", "--config", "/etc/siteprobe.toml"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/etc/siteprobe.toml")));

        let cli = Cli::try_parse_from(["siteprobe", "--config=/x.toml"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/x.toml")));

        let cli = Cli::try_parse_from(["siteprobe", "-c", "local.toml"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("local.toml")));
    }

    #[test]
    fn test_cli_rejects_unknown_arguments() {
        assert!(Cli::try_parse_from(["siteprobe", "--bogus"]).is_err());
        let help = Cli::try_parse_from(["siteprobe", "--help"]).unwrap_err();
        assert_eq!(help.kind(), clap::error::ErrorKind::DisplayHelp);
    }

    #[test]
    fn test_load_config_reports_missing_file() {
        let cli = Cli {
            config: Some(PathBuf::from("/nonexistent/siteprobe.toml")),
        };
        let err = load_config(&cli).unwrap_err();
        assert!(err.to_string().contains("failed to load config"));
    }
}
