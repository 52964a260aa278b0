//! Configuration parsing for dwm-ipc
//!
//! This crate parses the KDL configuration file shared by the daemon and the
//! `dwm-msg` client: socket location, IPC limits, and the window-manager
//! layout (tags, layouts, monitors, seeded clients) the daemon serves.

mod error;
mod model;
mod parser;

pub use error::{ConfigError, SourceLocation};
pub use model::*;
pub use parser::{parse_config, parse_config_str};
