//! Window-manager model driven by IPC commands

pub mod actions;
mod state;

pub use state::{
    Client, ClientFlags, EnabledFlags, Layout, Monitor, Rect, SizeHints, TagState, WindowId,
    WmState,
};
