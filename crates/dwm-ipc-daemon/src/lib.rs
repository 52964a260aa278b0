//! dwm IPC daemon
//!
//! Serves the dwm IPC protocol over a Unix domain socket: clients run named
//! commands, query monitors, tags, layouts and clients, and subscribe to
//! change events. The window-manager state is a headless model built from
//! the configuration and mutated only by IPC commands.

pub mod command;
pub mod daemon;
pub mod error;
pub mod ipc;
pub mod publisher;
pub mod registry;
pub mod router;
pub mod serializer;
pub mod transport;
pub mod wm;

pub use command::{Arg, ArgType, CommandError, CommandRegistry};
pub use daemon::{run_window_manager, POLL_INTERVAL};
pub use error::TransportError;
pub use ipc::{IpcServer, ServerOptions};
pub use wm::WmState;
