//! Window-manager main loop with the IPC server attached

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::{Context, Result};
use dwm_ipc_config::Config;

use crate::command::CommandRegistry;
use crate::ipc::{IpcServer, ServerOptions};
use crate::wm::WmState;

/// Longest a loop iteration waits before re-checking the shutdown flag
pub const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Run until `shutdown` is set or a client runs `quit`
///
/// If the socket cannot be created the loop still runs, without IPC.
pub fn run_window_manager(config: &Config, socket_path: PathBuf, shutdown: &AtomicBool) -> Result<()> {
    let mut wm = WmState::from_config(config);
    tracing::info!(
        "Managing {} monitor(s), {} tag(s), {} layout(s)",
        wm.monitors.len(),
        wm.tags.len(),
        wm.layouts.len()
    );

    let mut server = match IpcServer::new(
        socket_path,
        CommandRegistry::with_defaults(),
        ServerOptions::from(&config.ipc),
        &wm,
    ) {
        Ok(server) => Some(server),
        Err(e) => {
            tracing::error!("IPC disabled: {:#}", e);
            None
        }
    };

    while wm.running && !shutdown.load(Ordering::Relaxed) {
        match server.as_mut() {
            Some(server) => server
                .poll_once(&mut wm, Some(POLL_INTERVAL))
                .context("IPC event loop failed")?,
            None => std::thread::sleep(POLL_INTERVAL),
        }
    }

    if !wm.running {
        tracing::info!("Quit requested over IPC");
    }
    Ok(())
}
