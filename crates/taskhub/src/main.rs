//! # taskhub
//!
//! Real-time notification server binary: loads settings, installs logging and
//! metrics, and serves WebSocket clients until ctrl-c.

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use taskhub_core::LogFormat;
use taskhub_server::auth::JwtIdentityResolver;
use taskhub_server::config::ServerConfig;
use taskhub_server::membership::InMemoryMemberships;
use taskhub_server::server::TaskhubServer;
use taskhub_settings::TaskhubSettings;

/// taskhub real-time server.
#[derive(Parser, Debug)]
#[command(name = "taskhub", about = "taskhub real-time notification server")]
struct Cli {
    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind (overrides settings).
    #[arg(long)]
    port: Option<u16>,

    /// Settings file (default `~/.taskhub/settings.json`).
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Log filter, e.g. `info` or `taskhub_server=debug` (overrides settings).
    #[arg(long)]
    log_level: Option<String>,

    /// Log output format: `pretty` or `json` (overrides settings).
    #[arg(long)]
    log_format: Option<LogFormat>,
}

/// Settings from file and environment, with command-line flags on top.
fn resolve_settings(cli: &Cli) -> Result<TaskhubSettings> {
    let loaded = match &cli.settings {
        Some(path) => taskhub_settings::load_settings_from_path(path),
        None => taskhub_settings::load_settings(),
    };
    let mut settings = loaded.with_context(|| {
        let path = cli
            .settings
            .clone()
            .unwrap_or_else(taskhub_settings::settings_path);
        format!("Failed to load settings from {}", path.display())
    })?;

    if let Some(host) = &cli.host {
        settings.server.host.clone_from(host);
    }
    if let Some(port) = cli.port {
        settings.server.port = port;
    }
    if let Some(level) = &cli.log_level {
        settings.logging.level.clone_from(level);
    }
    if let Some(format) = cli.log_format {
        settings.logging.format = format;
    }

    settings.validate().context("Invalid settings")?;
    Ok(settings)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();
    let settings = resolve_settings(&args)?;

    taskhub_core::logging::init_subscriber(&settings.logging.level, settings.logging.format);

    let metrics_handle = match taskhub_server::metrics::install_recorder() {
        Ok(handle) => Some(handle),
        Err(e) => {
            tracing::warn!(error = %e, "metrics recorder unavailable, /metrics disabled");
            None
        }
    };

    if settings.auth.uses_default_secret() {
        tracing::warn!(
            "auth.jwtSecret is the built-in default; set TASKHUB_JWT_SECRET before exposing this server"
        );
    }
    let identity = Arc::new(JwtIdentityResolver::new(settings.auth.jwt_secret.as_bytes()));
    let memberships = Arc::new(InMemoryMemberships::new());
    let config = ServerConfig::from_settings(&settings);

    let mut server = TaskhubServer::new(config, identity, memberships);
    if let Some(handle) = metrics_handle {
        server = server.with_metrics(handle);
    }

    let (addr, http_task) = server
        .listen()
        .await
        .context("Failed to bind server")?;
    tracing::info!("taskhub listening on http://{addr} (ws://{addr}/ws)");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!("Shutting down...");
    let mut tasks = vec![http_task];
    tasks.extend(server.take_hub_task());
    server.shutdown().graceful_shutdown(tasks, None).await;

    tracing::info!("Shutdown complete");
    Ok(())
}
