//! Error types for the IPC transport

use std::path::PathBuf;

use dwm_ipc_proto::ProtocolError;
use thiserror::Error;

/// Errors raised while serving the IPC socket
#[derive(Debug, Error)]
pub enum TransportError {
    /// The listening socket could not be created
    #[error("Failed to listen on {path}: {source}")]
    Listen {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Accepting a pending connection failed
    #[error("Failed to accept IPC connection: {0}")]
    Accept(#[source] std::io::Error),

    /// A peer sent bytes that are not a valid frame
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("Failed to read from IPC client: {0}")]
    Read(#[source] std::io::Error),

    #[error("Failed to write to IPC client: {0}")]
    Write(#[source] std::io::Error),

    /// Waiting for readiness failed
    #[error("Failed to poll IPC sockets: {0}")]
    Poll(#[source] nix::Error),
}
