//! dwm IPC daemon
//!
//! Serves window-manager state and commands over a Unix domain socket.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use dwm_ipc_config::Config;
use dwm_ipc_daemon::run_window_manager;
use tokio::signal::unix::{signal, SignalKind};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "dwm-ipcd")]
#[command(about = "IPC server for dwm")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "~/.config/dwm-ipc/config.kdl")]
    config: String,

    /// Socket path, overriding the configuration
    #[arg(short, long)]
    socket: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Expand tilde in config path
    let config_path: PathBuf = shellexpand::tilde(&args.config).into_owned().into();
    let config_found = config_path.exists();
    let config = if config_found {
        dwm_ipc_config::parse_config(&config_path)?
    } else {
        Config::default()
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.global.log_level.as_filter())),
        )
        .init();

    if config_found {
        tracing::info!("Loaded configuration from {}", config_path.display());
    } else {
        tracing::warn!(
            "No configuration at {}, using defaults",
            config_path.display()
        );
    }

    let socket_path = args
        .socket
        .unwrap_or_else(|| config.ipc.resolved_socket_path());
    let shutdown = Arc::new(AtomicBool::new(false));

    tracing::info!("dwm IPC daemon starting...");

    let mut worker = {
        let shutdown = Arc::clone(&shutdown);
        tokio::task::spawn_blocking(move || run_window_manager(&config, socket_path, &shutdown))
    };

    let mut sigterm = signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;
    tokio::select! {
        result = &mut worker => {
            return result.context("Window manager loop panicked")?;
        }
        _ = tokio::signal::ctrl_c() => tracing::info!("Received SIGINT"),
        _ = sigterm.recv() => tracing::info!("Received SIGTERM"),
    }

    tracing::info!("Shutting down...");
    shutdown.store(true, Ordering::Relaxed);
    worker.await.context("Window manager loop panicked")??;

    Ok(())
}
