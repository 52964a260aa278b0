//! Error types for framing operations

use thiserror::Error;

/// Errors raised while encoding or decoding frames
///
/// All of these are transport-fatal: a peer that produced one of them can no
/// longer be trusted to be aligned on frame boundaries.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The leading bytes did not match the protocol magic
    #[error("bad magic {found:?}")]
    BadMagic { found: Vec<u8> },

    /// The declared (or supplied) payload exceeds the maximum message size
    #[error("message of {size} bytes exceeds maximum of {max} bytes")]
    MessageTooLarge { size: usize, max: usize },

    /// The type tag is not one of the known message types
    #[error("unknown message type {0}")]
    UnknownMessageType(u8),

    /// The stream ended partway through a frame
    #[error("connection closed mid-frame after {read} of {expected} bytes")]
    UnexpectedEof { read: usize, expected: usize },

    /// Underlying stream error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
