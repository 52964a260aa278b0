//! Connected IPC clients, keyed by socket descriptor

use std::collections::HashMap;
use std::os::fd::RawFd;

use tracing::debug;

use crate::transport::Connection;

#[derive(Debug, Default)]
pub struct ClientRegistry {
    clients: HashMap<RawFd, Connection>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, connection: Connection) -> RawFd {
        let fd = connection.fd();
        debug!("Registered IPC client {}", fd);
        self.clients.insert(fd, connection);
        fd
    }

    /// Shut down and forget a client
    ///
    /// Returns `false` if the descriptor was not registered, so a connection
    /// dropped twice in one loop iteration is only torn down once.
    pub fn remove(&mut self, fd: RawFd) -> bool {
        match self.clients.remove(&fd) {
            Some(connection) => {
                connection.shutdown();
                debug!("Removed IPC client {}", fd);
                true
            }
            None => false,
        }
    }

    pub fn get(&self, fd: RawFd) -> Option<&Connection> {
        self.clients.get(&fd)
    }

    pub fn get_mut(&mut self, fd: RawFd) -> Option<&mut Connection> {
        self.clients.get_mut(&fd)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&RawFd, &Connection)> {
        self.clients.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&RawFd, &mut Connection)> {
        self.clients.iter_mut()
    }

    pub fn fds(&self) -> Vec<RawFd> {
        self.clients.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}
