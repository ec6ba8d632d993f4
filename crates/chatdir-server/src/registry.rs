//! The set of live connections.

use std::collections::BTreeMap;
use std::io::ErrorKind;

use chatdir_protocol::Frame;
use mio::net::TcpListener;
use tracing::{debug, info, warn};

use crate::connection::{ConnId, Connection, SendStatus};
use crate::error::ServerResult;
use crate::tls::TlsContext;
use crate::transport::{Stream, Transport};

/// Connections the reactor should wait on, in registry order.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct InterestSet {
    /// Connections still reading input. The listener is always readable.
    pub read: Vec<ConnId>,
    /// Connections with output to push, or waiting to close.
    pub write: Vec<ConnId>,
}

impl InterestSet {
    pub fn wants_read(&self, id: ConnId) -> bool {
        self.read.binary_search(&id).is_ok()
    }

    pub fn wants_write(&self, id: ConnId) -> bool {
        self.write.binary_search(&id).is_ok()
    }
}

/// Owns every connection of one reactor, keyed by [`ConnId`].
pub struct Registry<T, R> {
    connections: BTreeMap<ConnId, Connection<T, R>>,
    next_id: u64,
    max_queued_frames: usize,
}

impl<T: Transport, R: Default> Registry<T, R> {
    pub fn new(max_queued_frames: usize) -> Self {
        Self {
            connections: BTreeMap::new(),
            next_id: 1,
            max_queued_frames,
        }
    }

    /// Adds a connection with the default role.
    pub fn insert(&mut self, transport: T, peer: std::net::SocketAddr) -> ConnId {
        let id = ConnId(self.next_id);
        self.next_id += 1;
        self.connections.insert(
            id,
            Connection::new(id, peer, transport, self.max_queued_frames),
        );
        id
    }
}

impl<T: Transport, R> Registry<T, R> {
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    pub fn get(&self, id: ConnId) -> Option<&Connection<T, R>> {
        self.connections.get(&id)
    }

    pub fn get_mut(&mut self, id: ConnId) -> Option<&mut Connection<T, R>> {
        self.connections.get_mut(&id)
    }

    /// Connections in accept order.
    pub fn iter(&self) -> impl Iterator<Item = &Connection<T, R>> {
        self.connections.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Connection<T, R>> {
        self.connections.values_mut()
    }

    /// Ids in accept order.
    pub fn ids(&self) -> Vec<ConnId> {
        self.connections.keys().copied().collect()
    }

    /// Computes which connections to read from and which to write to.
    pub fn build_interest(&self) -> InterestSet {
        let mut interest = InterestSet::default();
        for conn in self.connections.values().filter(|c| !c.is_closed()) {
            if conn.is_live() {
                interest.read.push(conn.id());
            }
            if conn.has_pending_output() || conn.is_pending_disconnect() {
                interest.write.push(conn.id());
            }
        }
        interest
    }

    /// Queues `frame` on every live connection `include` selects.
    pub fn broadcast<F>(&mut self, frame: Frame, mut include: F)
    where
        F: FnMut(&Connection<T, R>) -> bool,
    {
        for conn in self.connections.values_mut() {
            if conn.is_live() && include(conn) {
                conn.enqueue_send(frame);
            }
        }
    }

    /// Flushes every connection in the write set.
    pub fn flush_all(&mut self) {
        for conn in self.connections.values_mut() {
            let wants_write = conn.has_pending_output() || conn.is_pending_disconnect();
            if !conn.is_closed() && wants_write && conn.flush() == SendStatus::Closed {
                debug!(id = %conn.id(), "Connection closed while flushing");
            }
        }
    }

    /// Removes closed connections and returns them in accept order.
    ///
    /// Connections marked for disconnect stay until their output drains and
    /// `send_once` closes them.
    pub fn reap(&mut self) -> Vec<Connection<T, R>> {
        let closed: Vec<ConnId> = self
            .connections
            .values()
            .filter(|c| c.is_closed())
            .map(Connection::id)
            .collect();
        closed
            .into_iter()
            .filter_map(|id| self.connections.remove(&id))
            .inspect(|conn| debug!(id = %conn.id(), peer = %conn.peer(), "Reaped connection"))
            .collect()
    }

    /// Closes every connection.
    pub fn close_all(&mut self) {
        for conn in self.connections.values_mut() {
            conn.close();
        }
    }
}

impl<R: Default> Registry<Stream, R> {
    /// Accepts one pending connection.
    ///
    /// Returns `Ok(None)` once the listener has nothing left to accept.
    /// With TLS the server session is attached here and its handshake runs
    /// as the connection is read; the connection is not established until
    /// it completes.
    pub fn accept_new(
        &mut self,
        listener: &TcpListener,
        tls: Option<&TlsContext>,
    ) -> ServerResult<Option<ConnId>> {
        loop {
            let (sock, peer) = match listener.accept() {
                Ok(accepted) => accepted,
                Err(e) if e.kind() == ErrorKind::WouldBlock => return Ok(None),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) if is_transient_accept_error(e.kind()) => {
                    warn!(error = %e, "Accept failed");
                    continue;
                }
                Err(e) => return Err(e.into()),
            };
            if let Err(e) = sock.set_nodelay(true) {
                debug!(peer = %peer, error = %e, "Failed to set TCP_NODELAY");
            }

            let stream = match tls {
                Some(tls) => match tls.accept_session() {
                    Ok(session) => Stream::tls(sock, session),
                    Err(e) => {
                        warn!(peer = %peer, error = %e, "Failed to start TLS session");
                        continue;
                    }
                },
                None => Stream::plain(sock),
            };

            let id = self.insert(stream, peer);
            info!(id = %id, peer = %peer, "Accepted connection");
            return Ok(Some(id));
        }
    }
}

fn is_transient_accept_error(kind: ErrorKind) -> bool {
    matches!(
        kind,
        ErrorKind::ConnectionAborted | ErrorKind::ConnectionReset | ErrorKind::PermissionDenied
    )
}
