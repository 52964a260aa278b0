//! Frame encoding and decoding
//!
//! Pure functions over byte slices plus an incremental [`FrameDecoder`] that
//! buffers partial reads. The blocking helpers at the bottom of this module
//! are for simple clients that own a blocking stream.

use std::fmt;
use std::io::{ErrorKind, Read, Write};

use crate::ProtocolError;

/// Protocol magic identifying dwm IPC frames
pub const MAGIC: [u8; 7] = *b"DWM-IPC";

/// Size of the fixed header in bytes: magic + u32 size + u8 type
pub const HEADER_SIZE: usize = MAGIC.len() + 4 + 1;

/// Largest payload either side will accept
pub const MAX_MESSAGE_SIZE: usize = 1_000_000;

/// Message type tag carried in every header
///
/// Discriminants are the wire values and must never be renumbered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageType {
    /// Run a named command with typed arguments
    RunCommand = 0,
    /// Query all monitors
    GetMonitors = 1,
    /// Query tag labels
    GetTags = 2,
    /// Query configured layouts
    GetLayouts = 3,
    /// Query a client by window id (defaults to the focused client)
    GetDwmClient = 4,
    /// Subscribe to or unsubscribe from an event
    Subscribe = 5,
    /// Server-pushed event
    Event = 6,
    /// Query a client by (fuzzy) name
    FindDwmClient = 7,
}

impl MessageType {
    /// Parse a wire tag
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::RunCommand),
            1 => Some(Self::GetMonitors),
            2 => Some(Self::GetTags),
            3 => Some(Self::GetLayouts),
            4 => Some(Self::GetDwmClient),
            5 => Some(Self::Subscribe),
            6 => Some(Self::Event),
            7 => Some(Self::FindDwmClient),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RunCommand => "run_command",
            Self::GetMonitors => "get_monitors",
            Self::GetTags => "get_tags",
            Self::GetLayouts => "get_layouts",
            Self::GetDwmClient => "get_dwm_client",
            Self::Subscribe => "subscribe",
            Self::Event => "event",
            Self::FindDwmClient => "find_dwm_client",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decoded frame header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Payload length in bytes, already checked against [`MAX_MESSAGE_SIZE`]
    pub size: u32,
    pub msg_type: MessageType,
}

impl Header {
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[..MAGIC.len()].copy_from_slice(&MAGIC);
        buf[MAGIC.len()..MAGIC.len() + 4].copy_from_slice(&self.size.to_le_bytes());
        buf[HEADER_SIZE - 1] = self.msg_type as u8;
        buf
    }
}

/// A complete frame: type plus payload bytes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub msg_type: MessageType,
    pub payload: Vec<u8>,
}

impl Message {
    pub fn new(msg_type: MessageType, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            msg_type,
            payload: payload.into(),
        }
    }

    /// View the payload as UTF-8 text
    pub fn payload_str(&self) -> Result<&str, std::str::Utf8Error> {
        std::str::from_utf8(&self.payload)
    }
}

/// Encode a frame (header + payload)
///
/// # Errors
///
/// Returns [`ProtocolError::MessageTooLarge`] if the payload exceeds
/// [`MAX_MESSAGE_SIZE`].
pub fn encode(msg_type: MessageType, payload: &[u8]) -> Result<Vec<u8>, ProtocolError> {
    if payload.len() > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::MessageTooLarge {
            size: payload.len(),
            max: MAX_MESSAGE_SIZE,
        });
    }

    let header = Header {
        size: payload.len() as u32,
        msg_type,
    };

    let mut frame = Vec::with_capacity(HEADER_SIZE + payload.len());
    frame.extend_from_slice(&header.to_bytes());
    frame.extend_from_slice(payload);
    Ok(frame)
}

/// Decode a fixed-size header
///
/// Checks run in wire order: magic, then declared size, then type tag. The
/// size check happens here so that callers never allocate for an oversized
/// declaration.
pub fn decode_header(bytes: &[u8; HEADER_SIZE]) -> Result<Header, ProtocolError> {
    if bytes[..MAGIC.len()] != MAGIC {
        return Err(ProtocolError::BadMagic {
            found: bytes[..MAGIC.len()].to_vec(),
        });
    }

    let size = u32::from_le_bytes([
        bytes[MAGIC.len()],
        bytes[MAGIC.len() + 1],
        bytes[MAGIC.len() + 2],
        bytes[MAGIC.len() + 3],
    ]);
    if size as usize > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::MessageTooLarge {
            size: size as usize,
            max: MAX_MESSAGE_SIZE,
        });
    }

    let tag = bytes[HEADER_SIZE - 1];
    let msg_type = MessageType::from_u8(tag).ok_or(ProtocolError::UnknownMessageType(tag))?;

    Ok(Header { size, msg_type })
}

/// Incremental decoder for a byte stream carrying frames
///
/// Bytes are appended as they arrive with [`FrameDecoder::extend`]; complete
/// frames are taken out in order with [`FrameDecoder::next_message`]. A
/// header is validated as soon as its 12 bytes are present, and a wrong magic
/// prefix is rejected even earlier.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: Vec<u8>,
    header: Option<Header>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append freshly read bytes
    pub fn extend(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Take the next complete frame, if one is buffered
    ///
    /// Returns `Ok(None)` when more bytes are needed. After an error the
    /// decoder is poisoned in the sense that the stream is misaligned; the
    /// caller is expected to drop the connection.
    pub fn next_message(&mut self) -> Result<Option<Message>, ProtocolError> {
        let header = match self.header {
            Some(header) => header,
            None => {
                let prefix = self.buf.len().min(MAGIC.len());
                if self.buf[..prefix] != MAGIC[..prefix] {
                    return Err(ProtocolError::BadMagic {
                        found: self.buf[..prefix].to_vec(),
                    });
                }
                if self.buf.len() < HEADER_SIZE {
                    return Ok(None);
                }

                let mut raw = [0u8; HEADER_SIZE];
                raw.copy_from_slice(&self.buf[..HEADER_SIZE]);
                let header = decode_header(&raw)?;
                self.buf.drain(..HEADER_SIZE);
                self.buf.reserve((header.size as usize).saturating_sub(self.buf.len()));
                self.header = Some(header);
                header
            }
        };

        let size = header.size as usize;
        if self.buf.len() < size {
            return Ok(None);
        }

        let rest = self.buf.split_off(size);
        let payload = std::mem::replace(&mut self.buf, rest);
        self.header = None;

        Ok(Some(Message {
            msg_type: header.msg_type,
            payload,
        }))
    }

    /// True if no bytes of an unfinished frame are buffered
    pub fn is_idle(&self) -> bool {
        self.header.is_none() && self.buf.is_empty()
    }

    /// True if a header has been decoded and its payload is still incomplete
    pub fn awaiting_payload(&self) -> bool {
        self.header.is_some()
    }

    /// Number of buffered bytes not yet returned as a frame
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }
}

/// Write one frame to a blocking stream
pub fn write_frame<W: Write>(
    writer: &mut W,
    msg_type: MessageType,
    payload: &[u8],
) -> Result<(), ProtocolError> {
    let frame = encode(msg_type, payload)?;
    writer.write_all(&frame)?;
    writer.flush()?;
    Ok(())
}

/// Read one frame from a blocking stream
///
/// Returns `Ok(None)` if the stream ends cleanly before the first header
/// byte. An end of stream anywhere else is [`ProtocolError::UnexpectedEof`].
pub fn read_frame<R: Read>(reader: &mut R) -> Result<Option<Message>, ProtocolError> {
    let mut raw = [0u8; HEADER_SIZE];
    let read = read_full(reader, &mut raw)?;
    if read == 0 {
        return Ok(None);
    }
    if read < HEADER_SIZE {
        return Err(ProtocolError::UnexpectedEof {
            read,
            expected: HEADER_SIZE,
        });
    }

    let header = decode_header(&raw)?;
    let mut payload = vec![0u8; header.size as usize];
    let read = read_full(reader, &mut payload)?;
    if read < payload.len() {
        return Err(ProtocolError::UnexpectedEof {
            read,
            expected: payload.len(),
        });
    }

    Ok(Some(Message {
        msg_type: header.msg_type,
        payload,
    }))
}

/// Fill `buf` unless the stream ends first; returns the number of bytes read
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_encode_then_decode_preserves_type_and_payload() {
        let payload = br#"{"command":"view","args":[2]}"#;
        let frame = encode(MessageType::RunCommand, payload).unwrap();
        assert_eq!(frame.len(), HEADER_SIZE + payload.len());

        let mut raw = [0u8; HEADER_SIZE];
        raw.copy_from_slice(&frame[..HEADER_SIZE]);
        let header = decode_header(&raw).unwrap();
        assert_eq!(header.msg_type, MessageType::RunCommand);
        assert_eq!(header.size as usize, payload.len());
        assert_eq!(&frame[HEADER_SIZE..], payload);
    }

    #[test]
    fn test_header_layout_is_little_endian() {
        let frame = encode(MessageType::GetTags, &[b'x'; 258]).unwrap();
        assert_eq!(&frame[..7], b"DWM-IPC");
        assert_eq!(&frame[7..11], &[2, 1, 0, 0]);
        assert_eq!(frame[11], 2);
    }

    #[test]
    fn test_empty_payload_frame() {
        let frame = encode(MessageType::GetMonitors, b"").unwrap();
        assert_eq!(frame.len(), HEADER_SIZE);

        let mut decoder = FrameDecoder::new();
        decoder.extend(&frame);
        let message = decoder.next_message().unwrap().unwrap();
        assert_eq!(message.msg_type, MessageType::GetMonitors);
        assert!(message.payload.is_empty());
        assert!(decoder.is_idle());
    }

    #[test]
    fn test_bad_magic_rejected() {
        let mut raw = Header {
            size: 0,
            msg_type: MessageType::GetTags,
        }
        .to_bytes();
        raw[0] = b'X';

        let err = decode_header(&raw).unwrap_err();
        assert!(matches!(err, ProtocolError::BadMagic { .. }));
    }

    #[test]
    fn test_oversized_declaration_rejected() {
        let mut raw = Header {
            size: 0,
            msg_type: MessageType::GetTags,
        }
        .to_bytes();
        raw[7..11].copy_from_slice(&(MAX_MESSAGE_SIZE as u32 + 1).to_le_bytes());

        match decode_header(&raw).unwrap_err() {
            ProtocolError::MessageTooLarge { size, max } => {
                assert_eq!(size, MAX_MESSAGE_SIZE + 1);
                assert_eq!(max, MAX_MESSAGE_SIZE);
            }
            other => panic!("Expected MessageTooLarge, got: {:?}", other),
        }
    }

    #[test]
    fn test_payload_at_maximum_is_accepted() {
        let payload = vec![b' '; MAX_MESSAGE_SIZE];
        assert!(encode(MessageType::RunCommand, &payload).is_ok());

        let payload = vec![b' '; MAX_MESSAGE_SIZE + 1];
        assert!(matches!(
            encode(MessageType::RunCommand, &payload),
            Err(ProtocolError::MessageTooLarge { .. })
        ));
    }

    #[test]
    fn test_unknown_type_rejected() {
        let mut raw = Header {
            size: 0,
            msg_type: MessageType::GetTags,
        }
        .to_bytes();
        raw[HEADER_SIZE - 1] = 42;

        assert!(matches!(
            decode_header(&raw),
            Err(ProtocolError::UnknownMessageType(42))
        ));
    }

    #[test]
    fn test_decoder_reassembles_byte_by_byte() {
        let frame = encode(MessageType::Subscribe, br#"{"event":"tag_change_event"}"#).unwrap();
        let mut decoder = FrameDecoder::new();

        for (i, byte) in frame.iter().enumerate() {
            decoder.extend(std::slice::from_ref(byte));
            let result = decoder.next_message().unwrap();
            if i + 1 < frame.len() {
                assert!(result.is_none(), "frame completed early at byte {}", i);
            } else {
                let message = result.unwrap();
                assert_eq!(message.msg_type, MessageType::Subscribe);
                assert_eq!(message.payload_str().unwrap(), r#"{"event":"tag_change_event"}"#);
            }
        }
        assert!(decoder.is_idle());
    }

    #[test]
    fn test_decoder_tracks_frame_position() {
        let frame = encode(MessageType::GetTags, b"abc").unwrap();
        let mut decoder = FrameDecoder::new();
        assert!(decoder.is_idle());

        decoder.extend(&frame[..5]);
        assert!(decoder.next_message().unwrap().is_none());
        assert!(!decoder.is_idle());
        assert!(!decoder.awaiting_payload());

        decoder.extend(&frame[5..HEADER_SIZE + 1]);
        assert!(decoder.next_message().unwrap().is_none());
        assert!(decoder.awaiting_payload());
        assert_eq!(decoder.buffered(), 1);
    }

    #[test]
    fn test_decoder_splits_back_to_back_frames_in_order() {
        let mut stream = encode(MessageType::GetTags, b"").unwrap();
        stream.extend(encode(MessageType::RunCommand, b"first").unwrap());
        stream.extend(encode(MessageType::RunCommand, b"second").unwrap());

        let mut decoder = FrameDecoder::new();
        decoder.extend(&stream);

        let types: Vec<_> = std::iter::from_fn(|| decoder.next_message().unwrap())
            .map(|m| (m.msg_type, m.payload))
            .collect();
        assert_eq!(
            types,
            vec![
                (MessageType::GetTags, b"".to_vec()),
                (MessageType::RunCommand, b"first".to_vec()),
                (MessageType::RunCommand, b"second".to_vec()),
            ]
        );
    }

    #[test]
    fn test_decoder_rejects_bad_magic_prefix_early() {
        let mut decoder = FrameDecoder::new();
        decoder.extend(b"GET");
        assert!(matches!(
            decoder.next_message(),
            Err(ProtocolError::BadMagic { .. })
        ));
    }

    #[test]
    fn test_decoder_rejects_oversize_without_buffering_payload() {
        let mut raw = Header {
            size: 0,
            msg_type: MessageType::RunCommand,
        }
        .to_bytes();
        raw[7..11].copy_from_slice(&u32::MAX.to_le_bytes());

        let mut decoder = FrameDecoder::new();
        decoder.extend(&raw);
        assert!(matches!(
            decoder.next_message(),
            Err(ProtocolError::MessageTooLarge { .. })
        ));
        assert!(decoder.buf.capacity() < 1024);
    }

    #[test]
    fn test_read_frame_clean_eof_is_none() {
        let mut cursor = Cursor::new(Vec::new());
        assert!(read_frame(&mut cursor).unwrap().is_none());
    }

    #[test]
    fn test_read_frame_truncated_payload_is_error() {
        let frame = encode(MessageType::GetLayouts, b"payload").unwrap();
        let mut cursor = Cursor::new(frame[..frame.len() - 2].to_vec());

        match read_frame(&mut cursor).unwrap_err() {
            ProtocolError::UnexpectedEof { read, expected } => {
                assert_eq!(read, 5);
                assert_eq!(expected, 7);
            }
            other => panic!("Expected UnexpectedEof, got: {:?}", other),
        }
    }

    #[test]
    fn test_write_frame_then_read_frame() {
        let mut out = Vec::new();
        write_frame(&mut out, MessageType::Event, br#"{"x":1}"#).unwrap();
        write_frame(&mut out, MessageType::GetTags, b"").unwrap();

        let mut cursor = Cursor::new(out);
        let first = read_frame(&mut cursor).unwrap().unwrap();
        assert_eq!(first, Message::new(MessageType::Event, br#"{"x":1}"#.to_vec()));
        let second = read_frame(&mut cursor).unwrap().unwrap();
        assert_eq!(second.msg_type, MessageType::GetTags);
        assert!(read_frame(&mut cursor).unwrap().is_none());
    }
}
