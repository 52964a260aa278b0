//! IPC server for dwm
//!
//! Listens on a Unix domain socket and serves framed requests from any
//! number of clients on the calling thread. Each call to
//! [`IpcServer::poll_once`] waits for readiness on the listener and every
//! client, accepts new connections, handles complete requests in arrival
//! order, runs the event publisher after every command, and flushes queued
//! output.

use std::os::fd::{AsFd, RawFd};
use std::os::unix::net::UnixListener;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use dwm_ipc_config::IpcConfig;
use nix::errno::Errno;
use nix::poll::{poll, PollFd, PollFlags, PollTimeout};

use crate::command::CommandRegistry;
use crate::error::TransportError;
use crate::publisher::EventPublisher;
use crate::registry::ClientRegistry;
use crate::router;
use crate::transport::{self, Connection, EofPosition, ReadOutcome};
use crate::wm::WmState;

/// Whether the listener is readable, plus the clients with pending events
type Readiness = (bool, Vec<(RawFd, PollFlags)>);

/// Limits applied to connected clients
#[derive(Debug, Clone, PartialEq)]
pub struct ServerOptions {
    pub max_clients: usize,
    /// Drop clients stuck inside a frame for this long
    pub idle_timeout: Option<Duration>,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self::from(&IpcConfig::default())
    }
}

impl From<&IpcConfig> for ServerOptions {
    fn from(config: &IpcConfig) -> Self {
        Self {
            max_clients: config.max_clients,
            idle_timeout: config.idle_timeout(),
        }
    }
}

/// IPC server bound to a Unix domain socket
///
/// The socket file is removed when the server is dropped.
pub struct IpcServer {
    listener: UnixListener,
    socket_path: PathBuf,
    clients: ClientRegistry,
    commands: CommandRegistry,
    publisher: EventPublisher,
    options: ServerOptions,
}

impl IpcServer {
    /// Bind the socket and record the initial window-manager state
    ///
    /// Any stale socket file at `socket_path` is replaced.
    pub fn new(
        socket_path: PathBuf,
        commands: CommandRegistry,
        options: ServerOptions,
        wm: &WmState,
    ) -> Result<Self> {
        tracing::info!("IPC socket path: {}", socket_path.display());

        let listener = transport::listen(&socket_path).with_context(|| {
            format!("Failed to create IPC socket at {}", socket_path.display())
        })?;

        let mut publisher = EventPublisher::new();
        publisher.prime(wm);

        tracing::info!(
            "IPC server listening on {} with {} commands",
            socket_path.display(),
            commands.len()
        );

        Ok(Self {
            listener,
            socket_path,
            clients: ClientRegistry::new(),
            commands,
            publisher,
            options,
        })
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    /// Wait up to `timeout` (forever if `None`) for socket activity and
    /// handle everything that is ready
    ///
    /// # Errors
    ///
    /// Only a failure of the readiness wait itself is returned; problems
    /// with individual clients drop those clients and are logged.
    pub fn poll_once(&mut self, wm: &mut WmState, timeout: Option<Duration>) -> Result<(), TransportError> {
        let (listener_ready, ready) = match self.wait(timeout)? {
            Some(ready) => ready,
            None => return Ok(()),
        };

        if listener_ready {
            self.accept_pending();
        }

        for (fd, revents) in ready {
            if revents.intersects(PollFlags::POLLERR | PollFlags::POLLNVAL) {
                self.drop_client(fd, "socket error");
                continue;
            }
            if revents.intersects(PollFlags::POLLIN | PollFlags::POLLHUP) {
                if let Err(reason) = self.read_client(fd, wm) {
                    self.drop_client(fd, &reason);
                }
            }
        }

        self.flush_all();
        self.expire_idle(Instant::now());
        Ok(())
    }

    /// Poll the listener and all clients
    ///
    /// Returns `None` if the wait was interrupted by a signal.
    fn wait(&self, timeout: Option<Duration>) -> Result<Option<Readiness>, TransportError> {
        let fds = self.clients.fds();
        let mut poll_fds = Vec::with_capacity(fds.len() + 1);
        poll_fds.push(PollFd::new(self.listener.as_fd(), PollFlags::POLLIN));
        for &fd in &fds {
            if let Some(connection) = self.clients.get(fd) {
                let mut events = PollFlags::POLLIN;
                if connection.wants_write() {
                    events |= PollFlags::POLLOUT;
                }
                poll_fds.push(PollFd::new(connection.as_fd(), events));
            }
        }

        let timeout = match timeout {
            Some(timeout) => PollTimeout::from(timeout.as_millis().min(u16::MAX as u128) as u16),
            None => PollTimeout::NONE,
        };
        match poll(&mut poll_fds, timeout) {
            Ok(_) => {}
            Err(Errno::EINTR) => return Ok(None),
            Err(e) => return Err(TransportError::Poll(e)),
        }

        let revents = |pfd: &PollFd| pfd.revents().unwrap_or(PollFlags::empty());
        let listener_ready = revents(&poll_fds[0]).contains(PollFlags::POLLIN);
        let ready = fds
            .iter()
            .zip(&poll_fds[1..])
            .map(|(&fd, pfd)| (fd, revents(pfd)))
            .filter(|(_, events)| !events.is_empty())
            .collect();
        Ok(Some((listener_ready, ready)))
    }

    fn accept_pending(&mut self) {
        loop {
            let stream = match transport::accept(&self.listener) {
                Ok(Some(stream)) => stream,
                Ok(None) => return,
                Err(e) => {
                    tracing::warn!("{}", e);
                    return;
                }
            };

            let connection = Connection::new(stream);
            if self.clients.len() >= self.options.max_clients {
                tracing::warn!(
                    "Rejecting IPC client {}: limit of {} clients reached",
                    connection.fd(),
                    self.options.max_clients
                );
                connection.shutdown();
                continue;
            }
            let fd = self.clients.add(connection);
            tracing::debug!("Accepted IPC connection {}", fd);
        }
    }

    /// Handle every complete frame a client has sent, in order
    ///
    /// Returns the reason the client must be dropped, if it must.
    fn read_client(&mut self, fd: RawFd, wm: &mut WmState) -> Result<(), String> {
        loop {
            let Some(connection) = self.clients.get_mut(fd) else {
                return Ok(());
            };

            let message = match connection.read_message() {
                Ok(ReadOutcome::Message(message)) => message,
                Ok(ReadOutcome::WouldBlock) => return Ok(()),
                Ok(ReadOutcome::Eof(EofPosition::Clean)) => return Err("connection closed".to_string()),
                Ok(ReadOutcome::Eof(EofPosition::InHeader)) => {
                    return Err("connection closed inside a header".to_string())
                }
                Ok(ReadOutcome::Eof(EofPosition::InPayload)) => {
                    return Err("connection closed inside a payload".to_string())
                }
                Err(e) => return Err(e.to_string()),
            };

            let reply = router::route(fd, &message, &mut connection.subscriptions, &self.commands, wm);
            connection
                .enqueue(reply.msg_type, reply.payload.as_bytes())
                .map_err(|e| e.to_string())?;

            if reply.ran_command {
                self.publisher.publish(wm, &mut self.clients);
            }
        }
    }

    fn flush_all(&mut self) {
        let pending: Vec<RawFd> = self
            .clients
            .iter()
            .filter(|(_, c)| c.wants_write())
            .map(|(&fd, _)| fd)
            .collect();

        for fd in pending {
            let result = match self.clients.get_mut(fd) {
                Some(connection) => connection.write_pending(),
                None => continue,
            };
            if let Err(e) = result {
                self.drop_client(fd, &e.to_string());
            }
        }
    }

    fn expire_idle(&mut self, now: Instant) {
        let Some(timeout) = self.options.idle_timeout else {
            return;
        };
        let stalled: Vec<RawFd> = self
            .clients
            .iter()
            .filter(|(_, c)| {
                c.stalled_since()
                    .is_some_and(|since| now.duration_since(since) >= timeout)
            })
            .map(|(&fd, _)| fd)
            .collect();

        for fd in stalled {
            self.drop_client(fd, "partial frame timed out");
        }
    }

    fn drop_client(&mut self, fd: RawFd, reason: &str) {
        let unsent = self.clients.get(fd).map_or(0, Connection::pending_bytes);
        if self.clients.remove(fd) {
            tracing::info!(
                "Dropped IPC client {}: {} ({} bytes unsent)",
                fd,
                reason,
                unsent
            );
        }
    }
}

impl Drop for IpcServer {
    fn drop(&mut self) {
        // Clean up socket file on shutdown
        match std::fs::remove_file(&self.socket_path) {
            Ok(()) => tracing::debug!("Removed IPC socket file: {}", self.socket_path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!("Failed to remove IPC socket file on shutdown: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dwm_ipc_config::Config;
    use dwm_ipc_proto::{read_frame, write_frame, MessageType};
    use serde_json::{json, Value};
    use std::io::{ErrorKind, Read, Write};
    use std::os::unix::net::UnixStream;
    use tempfile::TempDir;

    struct Harness {
        server: IpcServer,
        wm: WmState,
        _dir: TempDir,
    }

    impl Harness {
        fn new() -> Self {
            Self::with_options(ServerOptions::default())
        }

        fn with_options(options: ServerOptions) -> Self {
            let dir = TempDir::new().unwrap();
            let wm = WmState::from_config(&Config::default());
            let server = IpcServer::new(
                dir.path().join("dwm.sock"),
                CommandRegistry::with_defaults(),
                options,
                &wm,
            )
            .unwrap();
            Self {
                server,
                wm,
                _dir: dir,
            }
        }

        fn connect(&mut self) -> UnixStream {
            let stream = UnixStream::connect(self.server.socket_path()).unwrap();
            stream
                .set_read_timeout(Some(Duration::from_secs(2)))
                .unwrap();
            self.pump();
            stream
        }

        /// Run enough loop iterations for queued work to settle
        fn pump(&mut self) {
            for _ in 0..5 {
                self.server
                    .poll_once(&mut self.wm, Some(Duration::from_millis(10)))
                    .unwrap();
            }
        }

        fn request(&mut self, stream: &mut UnixStream, msg_type: MessageType, payload: &str) -> Value {
            write_frame(stream, msg_type, payload.as_bytes()).unwrap();
            self.pump();
            let reply = read_frame(stream).unwrap().unwrap();
            assert_eq!(reply.msg_type, msg_type);
            serde_json::from_slice(&reply.payload).unwrap()
        }
    }

    fn assert_nothing_pending(stream: &UnixStream) {
        stream.set_nonblocking(true).unwrap();
        let mut buf = [0u8; 1];
        let err = (&*stream).read(&mut buf).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::WouldBlock);
        stream.set_nonblocking(false).unwrap();
    }

    fn assert_closed(stream: &mut UnixStream) {
        let mut buf = [0u8; 1];
        match stream.read(&mut buf) {
            Ok(n) => assert_eq!(n, 0),
            Err(e) => assert_eq!(e.kind(), ErrorKind::ConnectionReset),
        }
    }

    #[test]
    fn test_get_tags_round_trip() {
        let mut h = Harness::new();
        let mut client = h.connect();
        assert_eq!(
            h.request(&mut client, MessageType::GetTags, ""),
            json!(["1", "2", "3", "4", "5", "6", "7", "8", "9"])
        );
    }

    #[test]
    fn test_run_command_view() {
        let mut h = Harness::new();
        let mut client = h.connect();
        assert_eq!(
            h.request(&mut client, MessageType::RunCommand, r#"{"command":"view","args":[4]}"#),
            json!({"result": "success"})
        );
        assert_eq!(h.wm.selmon().selected_tags(), 4);
    }

    #[test]
    fn test_unknown_command_keeps_connection_open() {
        let mut h = Harness::new();
        let mut client = h.connect();
        assert_eq!(
            h.request(&mut client, MessageType::RunCommand, r#"{"command":"bogus","args":[]}"#),
            json!({"result": "error", "reason": "Command bogus not found"})
        );
        assert_eq!(
            h.request(&mut client, MessageType::GetLayouts, "")[0],
            json!({"symbol": "[]=", "id": 0})
        );
        assert_eq!(h.server.client_count(), 1);
    }

    #[test]
    fn test_tag_change_reaches_only_subscribers() {
        let mut h = Harness::new();
        let mut subscriber = h.connect();
        let mut commander = h.connect();
        let bystander = h.connect();

        assert_eq!(
            h.request(
                &mut subscriber,
                MessageType::Subscribe,
                r#"{"event":"tag_change_event","action":"subscribe"}"#
            ),
            json!({"result": "success"})
        );
        h.request(&mut commander, MessageType::RunCommand, r#"{"command":"view","args":[2]}"#);

        let event = read_frame(&mut subscriber).unwrap().unwrap();
        assert_eq!(event.msg_type, MessageType::Event);
        let event: Value = serde_json::from_slice(&event.payload).unwrap();
        assert_eq!(event["tag_change_event"]["new_state"]["selected"], 2);
        assert_eq!(event["tag_change_event"]["old_state"]["selected"], 1);

        assert_nothing_pending(&subscriber);
        assert_nothing_pending(&commander);
        assert_nothing_pending(&bystander);
    }

    #[test]
    fn test_command_without_change_emits_nothing() {
        let mut h = Harness::new();
        let mut subscriber = h.connect();
        h.request(
            &mut subscriber,
            MessageType::Subscribe,
            r#"{"event":"tag_change_event","action":"subscribe"}"#,
        );
        // Already viewing tag 1
        h.request(&mut subscriber, MessageType::RunCommand, r#"{"command":"view","args":[1]}"#);
        assert_nothing_pending(&subscriber);
    }

    #[test]
    fn test_bad_magic_closes_without_reply() {
        let mut h = Harness::new();
        let mut client = h.connect();
        client.write_all(b"NOT-IPC\x02\x00\x00\x00\x02{}").unwrap();
        h.pump();

        assert_closed(&mut client);
        assert_eq!(h.server.client_count(), 0);
    }

    #[test]
    fn test_back_to_back_commands_reply_in_order() {
        let mut h = Harness::new();
        let mut client = h.connect();

        let mut batch = Vec::new();
        batch.extend(dwm_ipc_proto::encode(MessageType::RunCommand, br#"{"command":"view","args":[2]}"#).unwrap());
        batch.extend(dwm_ipc_proto::encode(MessageType::RunCommand, br#"{"command":"nope"}"#).unwrap());
        client.write_all(&batch).unwrap();
        h.pump();

        let first: Value = serde_json::from_slice(&read_frame(&mut client).unwrap().unwrap().payload).unwrap();
        let second: Value = serde_json::from_slice(&read_frame(&mut client).unwrap().unwrap().payload).unwrap();
        assert_eq!(first, json!({"result": "success"}));
        assert_eq!(second["reason"], "Command nope not found");
    }

    #[test]
    fn test_frame_split_across_writes() {
        let mut h = Harness::new();
        let mut client = h.connect();
        let frame = dwm_ipc_proto::encode(MessageType::GetTags, b"").unwrap();

        client.write_all(&frame[..4]).unwrap();
        h.pump();
        assert_nothing_pending(&client);

        client.write_all(&frame[4..]).unwrap();
        h.pump();
        let reply = read_frame(&mut client).unwrap().unwrap();
        assert_eq!(reply.msg_type, MessageType::GetTags);
    }

    #[test]
    fn test_oversized_header_closes_connection() {
        let mut h = Harness::new();
        let mut client = h.connect();
        let mut header = Vec::from(dwm_ipc_proto::MAGIC);
        header.extend_from_slice(&2_000_000u32.to_le_bytes());
        header.push(MessageType::GetTags as u8);
        client.write_all(&header).unwrap();
        h.pump();

        assert_closed(&mut client);
    }

    #[test]
    fn test_client_hangup_is_removed() {
        let mut h = Harness::new();
        let client = h.connect();
        assert_eq!(h.server.client_count(), 1);

        drop(client);
        h.pump();
        assert_eq!(h.server.client_count(), 0);
    }

    #[test]
    fn test_max_clients() {
        let mut h = Harness::with_options(ServerOptions {
            max_clients: 1,
            idle_timeout: None,
        });
        let mut first = h.connect();
        let mut second = h.connect();

        assert_closed(&mut second);
        assert_eq!(h.server.client_count(), 1);
        assert_eq!(h.request(&mut first, MessageType::GetTags, "")[0], "1");
    }

    #[test]
    fn test_idle_partial_frame_is_dropped() {
        let mut h = Harness::with_options(ServerOptions {
            max_clients: 64,
            idle_timeout: Some(Duration::from_millis(20)),
        });
        let mut idle = h.connect();
        let busy = h.connect();

        idle.write_all(b"DWM-").unwrap();
        h.pump();
        std::thread::sleep(Duration::from_millis(40));
        h.pump();

        assert_closed(&mut idle);
        assert_eq!(h.server.client_count(), 1);
        drop(busy);
    }

    #[test]
    fn test_idle_subscriber_is_dropped_while_events_flow() {
        let mut h = Harness::with_options(ServerOptions {
            max_clients: 64,
            idle_timeout: Some(Duration::from_millis(50)),
        });
        let mut idle = h.connect();
        let mut busy = h.connect();

        assert_eq!(
            h.request(
                &mut idle,
                MessageType::Subscribe,
                r#"{"event":"tag_change_event","action":"subscribe"}"#
            ),
            json!({"result": "success"})
        );
        idle.write_all(b"DWM-").unwrap();

        let started = Instant::now();
        for i in 0..8 {
            let tags = if i % 2 == 0 { 2 } else { 1 };
            let payload = format!(r#"{{"command":"view","args":[{tags}]}}"#);
            h.request(&mut busy, MessageType::RunCommand, &payload);
            std::thread::sleep(Duration::from_millis(15));
        }
        h.pump();
        assert!(started.elapsed() >= Duration::from_millis(100));

        assert_eq!(h.server.client_count(), 1);
        let mut received = Vec::new();
        match idle.read_to_end(&mut received) {
            Ok(_) => {}
            Err(e) => assert_eq!(e.kind(), ErrorKind::ConnectionReset),
        }
        assert!(!received.is_empty());
    }

    #[test]
    fn test_quit_command_clears_running() {
        let mut h = Harness::new();
        let mut client = h.connect();
        h.request(&mut client, MessageType::RunCommand, r#"{"command":"quit"}"#);
        assert!(!h.wm.running);
    }

    #[test]
    fn test_drop_removes_socket_file() {
        let h = Harness::new();
        let path = h.server.socket_path().to_path_buf();
        assert!(path.exists());
        drop(h.server);
        assert!(!path.exists());
    }

    #[test]
    fn test_client_sees_eof_after_server_drop() {
        let mut h = Harness::new();
        let mut client = h.connect();
        let Harness { server, .. } = h;
        drop(server);
        assert!(matches!(read_frame(&mut client), Ok(None)));
    }
}
