//! Wire protocol for the dwm IPC socket
//!
//! Shared by the daemon (`dwm-ipcd`) and the command-line client (`dwm-msg`).
//!
//! ## Framing
//!
//! Every message is a fixed 12-byte header followed by a UTF-8 payload:
//!
//! ```text
//! +-----------+----------------------+-----------+------------------+
//! | "DWM-IPC" | payload size (u32 LE) | type (u8) | payload (JSON)   |
//! +-----------+----------------------+-----------+------------------+
//! ```
//!
//! Integers are little-endian on every host.

mod codec;
mod error;
mod event;

pub use codec::{
    decode_header, encode, read_frame, write_frame, FrameDecoder, Header, Message, MessageType,
    HEADER_SIZE, MAGIC, MAX_MESSAGE_SIZE,
};
pub use error::ProtocolError;
pub use event::{EventKind, EventMask, SubscribeAction};
