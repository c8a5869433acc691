//! Ari Server - standalone headless playback orchestrator.
//!
//! Loads configuration, wires the core services against the configured audio
//! engine node and serves the WebSocket RPC and HTTP API until interrupted.

mod config;

use std::path::PathBuf;

use anyhow::{Context, Result};
use ari_core::protocol_constants::APP_NAME;
use ari_core::{bootstrap_services, start_server};
use clap::Parser;
use tokio::signal;

/// Ari Server - per-guild music playback orchestrator.
#[derive(Parser, Debug)]
#[command(name = "ari-server")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file (YAML).
    #[arg(short, long, value_name = "FILE", env = "ARI_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(short, long, default_value = "info", env = "ARI_LOG_LEVEL")]
    log_level: log::LevelFilter,

    /// Bind port (overrides config file).
    #[arg(short = 'p', long)]
    port: Option<u16>,

    /// Audio engine base URL (overrides config file).
    #[arg(short = 'e', long, value_name = "URL")]
    engine_url: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    env_logger::Builder::new()
        .filter_level(args.log_level)
        .format_timestamp_millis()
        .init();

    log::info!("{} Server v{}", APP_NAME, env!("CARGO_PKG_VERSION"));

    let mut config = config::load(args.config.as_deref()).context("Failed to load configuration")?;

    // CLI flags win over file and environment
    if let Some(port) = args.port {
        config.bind_port = port;
    }
    if let Some(url) = args.engine_url {
        config.engine.url = url;
    }

    log::info!(
        "Configuration: bind_port={}, engine={}, idle_timeout_secs={}",
        config.bind_port,
        config.engine.url,
        config.idle_timeout_secs
    );

    let services = bootstrap_services(config).context("Failed to bootstrap services")?;
    services.start_background_tasks();
    log::info!("Background tasks started");

    let app_state = services.app_state().context("Failed to build app state")?;
    let server_cancel = services.cancel_token.child_token();
    let mut server_handle = tokio::spawn(start_server(app_state, server_cancel));

    tokio::select! {
        _ = shutdown_signal() => {
            log::info!("Shutdown signal received, cleaning up...");
        }
        result = &mut server_handle => {
            services.shutdown().await;
            return match result {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => Err(e).context("Server error"),
                Err(e) => Err(e).context("Server task failed"),
            };
        }
    }

    // Cancels the server's token, disconnects guilds and closes sockets
    services.shutdown().await;

    match server_handle.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => log::error!("Server error during shutdown: {}", e),
        Err(e) => log::error!("Server task failed: {}", e),
    }

    log::info!("Shutdown complete");
    Ok(())
}

/// Waits for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            log::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                log::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
