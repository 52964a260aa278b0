//! Non-blocking UNIX socket transport
//!
//! The listener and every accepted stream are non-blocking. Inbound bytes go
//! through a per-connection [`FrameDecoder`] so frames split across reads are
//! reassembled; outbound frames are queued and flushed as the socket accepts
//! them, so a slow reader never stalls the server loop.

use std::io::{self, ErrorKind, Read, Write};
use std::net::Shutdown;
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, RawFd};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::Path;
use std::time::Instant;

use dwm_ipc_proto::{encode, EventMask, FrameDecoder, Message, MessageType};
use nix::sys::socket::{self, AddressFamily, Backlog, SockFlag, SockType, UnixAddr};
use tracing::debug;

use crate::error::TransportError;

/// Pending connections the kernel queues before `accept`
pub const LISTEN_BACKLOG: i32 = 5;

const READ_CHUNK: usize = 4096;

/// Bind a non-blocking listening socket at `path`
///
/// Missing parent directories are created and a stale socket file left by a
/// previous run is removed first.
pub fn listen(path: &Path) -> Result<UnixListener, TransportError> {
    let io_err = |source: io::Error| TransportError::Listen {
        path: path.to_path_buf(),
        source,
    };
    let nix_err = |err: nix::Error| io_err(io::Error::from(err));

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(io_err)?;
    }
    match std::fs::remove_file(path) {
        Ok(()) => debug!("Removed stale socket file: {}", path.display()),
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => return Err(io_err(e)),
    }

    let fd = socket::socket(
        AddressFamily::Unix,
        SockType::Stream,
        SockFlag::SOCK_CLOEXEC | SockFlag::SOCK_NONBLOCK,
        None,
    )
    .map_err(nix_err)?;
    let addr = UnixAddr::new(path).map_err(nix_err)?;
    socket::bind(fd.as_raw_fd(), &addr).map_err(nix_err)?;
    let backlog = Backlog::new(LISTEN_BACKLOG).map_err(nix_err)?;
    socket::listen(&fd, backlog).map_err(nix_err)?;

    Ok(UnixListener::from(fd))
}

/// Accept one pending connection, if any
pub fn accept(listener: &UnixListener) -> Result<Option<UnixStream>, TransportError> {
    loop {
        match listener.accept() {
            Ok((stream, _addr)) => {
                stream.set_nonblocking(true).map_err(TransportError::Accept)?;
                return Ok(Some(stream));
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => return Ok(None),
            Err(e) if matches!(e.kind(), ErrorKind::Interrupted | ErrorKind::ConnectionAborted) => {
                continue
            }
            Err(e) => return Err(TransportError::Accept(e)),
        }
    }
}

/// Where in a frame the peer hung up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EofPosition {
    /// Between frames
    Clean,
    /// Part of a header had arrived
    InHeader,
    /// The header was complete, the payload was not
    InPayload,
}

#[derive(Debug, PartialEq, Eq)]
pub enum ReadOutcome {
    Message(Message),
    /// No complete frame yet
    WouldBlock,
    Eof(EofPosition),
}

/// Bytes queued for a peer
#[derive(Debug, Default)]
pub struct OutBuffer {
    pending: Vec<u8>,
}

impl OutBuffer {
    pub fn push(&mut self, bytes: &[u8]) {
        self.pending.extend_from_slice(bytes);
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Write as much as the writer takes without blocking
    ///
    /// Returns the number of bytes written. Stops early on `WouldBlock`.
    pub fn write_to<W: Write>(&mut self, writer: &mut W) -> io::Result<usize> {
        let mut written = 0;
        let result = loop {
            if written == self.pending.len() {
                break Ok(());
            }
            match writer.write(&self.pending[written..]) {
                Ok(0) => break Err(io::Error::from(ErrorKind::WriteZero)),
                Ok(n) => written += n,
                Err(e) if e.kind() == ErrorKind::WouldBlock => break Ok(()),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => break Err(e),
            }
        };
        self.pending.drain(..written);
        result.map(|()| written)
    }
}

/// One accepted client
#[derive(Debug)]
pub struct Connection {
    stream: UnixStream,
    decoder: FrameDecoder,
    outbound: OutBuffer,
    /// Events this client asked to receive
    pub subscriptions: EventMask,
    /// Last time the peer sent anything
    last_inbound: Instant,
}

impl Connection {
    pub fn new(stream: UnixStream) -> Self {
        Self {
            stream,
            decoder: FrameDecoder::new(),
            outbound: OutBuffer::default(),
            subscriptions: EventMask::empty(),
            last_inbound: Instant::now(),
        }
    }

    pub fn fd(&self) -> RawFd {
        self.stream.as_raw_fd()
    }

    /// Read until a full frame is buffered or the socket runs dry
    pub fn read_message(&mut self) -> Result<ReadOutcome, TransportError> {
        loop {
            if let Some(message) = self.decoder.next_message()? {
                return Ok(ReadOutcome::Message(message));
            }

            let mut chunk = [0u8; READ_CHUNK];
            match self.stream.read(&mut chunk) {
                Ok(0) => return Ok(ReadOutcome::Eof(self.eof_position())),
                Ok(n) => {
                    self.decoder.extend(&chunk[..n]);
                    self.last_inbound = Instant::now();
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => return Ok(ReadOutcome::WouldBlock),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(TransportError::Read(e)),
            }
        }
    }

    fn eof_position(&self) -> EofPosition {
        if self.decoder.is_idle() {
            EofPosition::Clean
        } else if self.decoder.awaiting_payload() {
            EofPosition::InPayload
        } else {
            EofPosition::InHeader
        }
    }

    /// Queue a frame for sending
    pub fn enqueue(&mut self, msg_type: MessageType, payload: &[u8]) -> Result<(), TransportError> {
        let frame = encode(msg_type, payload)?;
        self.outbound.push(&frame);
        Ok(())
    }

    /// Queue an already encoded frame
    pub fn enqueue_frame(&mut self, frame: &[u8]) {
        self.outbound.push(frame);
    }

    pub fn wants_write(&self) -> bool {
        !self.outbound.is_empty()
    }

    pub fn pending_bytes(&self) -> usize {
        self.outbound.len()
    }

    /// Flush queued frames as far as the socket allows
    pub fn write_pending(&mut self) -> Result<(), TransportError> {
        self.outbound
            .write_to(&mut self.stream)
            .map_err(TransportError::Write)?;
        Ok(())
    }

    /// When the client last sent bytes of an unfinished frame
    ///
    /// `None` while no partial frame is buffered. Outbound traffic does not
    /// count as progress.
    pub fn stalled_since(&self) -> Option<Instant> {
        (!self.decoder.is_idle()).then_some(self.last_inbound)
    }

    pub fn shutdown(&self) {
        if let Err(e) = self.stream.shutdown(Shutdown::Both) {
            debug!("Shutdown of IPC client {} failed: {}", self.fd(), e);
        }
    }
}

impl AsFd for Connection {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.stream.as_fd()
    }
}
