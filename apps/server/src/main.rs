//! SyncRun Hub Server - standalone speedrun coordination hub.
//!
//! Hosts the WebSocket coordination endpoint and HTTP surface for a small
//! group of speedrunners: slot allocation, ready/travel state, countdown
//! start, and per-agent live video relay with archival.

mod config;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use syncrun_core::{bootstrap_services, start_server, AppState};
use tokio::signal;

use crate::config::ServerConfig;

/// SyncRun Hub - WebSocket coordination server for speedrun groups.
#[derive(Parser, Debug)]
#[command(name = "syncrun-server")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file (YAML).
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(short, long, default_value = "info", env = "HUB_LOG_LEVEL")]
    log_level: log::LevelFilter,

    /// Bind port (overrides config file).
    #[arg(short = 'p', long, env = "HUB_BIND_PORT")]
    port: Option<u16>,

    /// Bind host (overrides config file).
    #[arg(long, env = "HUB_BIND_HOST")]
    bind_host: Option<String>,

    /// Data directory; sets both the live and recording roots beneath it.
    #[arg(short = 'd', long, env = "HUB_DATA_DIR")]
    data_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    env_logger::Builder::new()
        .filter_level(args.log_level)
        .format_timestamp_millis()
        .init();

    log::info!("SyncRun Hub v{}", env!("CARGO_PKG_VERSION"));

    let mut config =
        ServerConfig::load(args.config.as_deref()).context("Failed to load configuration")?;

    if let Some(port) = args.port {
        config.bind_port = port;
    }
    if let Some(host) = args.bind_host {
        config.bind_host = host;
    }
    if let Some(data_dir) = args.data_dir {
        config.live_root = data_dir.join("live");
        config.recording_root = data_dir.join("recordings");
    }

    log::info!(
        "Configuration: bind={}:{}, live_root={}, recording_root={}",
        config.bind_host,
        config.bind_port,
        config.live_root.display(),
        config.recording_root.display()
    );

    let services =
        bootstrap_services(config.to_core_config()).context("Failed to bootstrap services")?;

    let app_state = AppState::new(&services);
    let bind_port = config.bind_port;

    let mut server_handle = tokio::spawn(start_server(app_state));

    log::info!("HTTP/WebSocket server started on port {bind_port}");

    tokio::select! {
        result = &mut server_handle => {
            services.shutdown().await;
            match result {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    log::error!("Server failed to start: {e}");
                    std::process::exit(1);
                }
                Err(e) => {
                    log::error!("Server task panicked: {e}");
                    std::process::exit(1);
                }
            }
        }
        () = shutdown_signal() => {
            log::info!("Shutdown signal received, cleaning up...");
            services.shutdown().await;
            server_handle.abort();
        }
    }

    log::info!("Shutdown complete");
    Ok(())
}

/// Waits for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
