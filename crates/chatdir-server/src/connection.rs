//! Framed connections.
//!
//! A [`Connection`] owns one transport plus a receive buffer and a send
//! buffer of exactly one frame each. Frames queued while the send buffer is
//! busy wait in a bounded backlog.

use std::collections::VecDeque;
use std::fmt;
use std::io::ErrorKind;
use std::net::SocketAddr;

use chatdir_protocol::{FRAME_LEN, Frame};
use tracing::{debug, trace, warn};

use crate::transport::Transport;

/// Stable identity of a connection within one reactor.
///
/// Ids grow monotonically and are never reused, so iterating connections in
/// id order is iterating them in accept order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConnId(pub(crate) u64);

impl fmt::Display for ConnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Outcome of one [`Connection::receive_once`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiveStatus {
    /// A whole frame arrived; the receive buffer is empty again.
    Complete(Frame),
    /// Some bytes arrived, the frame is not whole yet.
    Partial,
    /// Nothing to read right now.
    WouldBlock,
    /// EOF or a hard error; the connection is closed.
    Closed,
}

/// Outcome of one [`Connection::send_once`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendStatus {
    /// Bytes went out and more are waiting.
    Progress,
    /// Nothing left to send.
    Idle,
    /// The transport cannot take more right now.
    WouldBlock,
    /// The connection is closed: a write failed, or it was waiting to
    /// disconnect and has drained.
    Closed,
}

/// A transport with frame-sized receive and send buffers.
pub struct Connection<T, R> {
    id: ConnId,
    peer: SocketAddr,
    transport: T,
    role: R,
    rx: [u8; FRAME_LEN],
    rx_len: usize,
    tx: [u8; FRAME_LEN],
    tx_len: usize,
    backlog: VecDeque<Frame>,
    max_queued: usize,
    established: bool,
    pending_disconnect: bool,
    closed: bool,
}

impl<T: Transport, R: Default> Connection<T, R> {
    pub fn new(id: ConnId, peer: SocketAddr, transport: T, max_queued: usize) -> Self {
        Self {
            id,
            peer,
            transport,
            role: R::default(),
            rx: [0; FRAME_LEN],
            rx_len: 0,
            tx: [0; FRAME_LEN],
            tx_len: 0,
            backlog: VecDeque::new(),
            max_queued,
            established: false,
            pending_disconnect: false,
            closed: false,
        }
    }
}

impl<T: Transport, R> Connection<T, R> {
    pub fn id(&self) -> ConnId {
        self.id
    }

    /// Peer address captured at accept.
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn role(&self) -> &R {
        &self.role
    }

    pub fn set_role(&mut self, role: R) {
        self.role = role;
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn is_pending_disconnect(&self) -> bool {
        self.pending_disconnect
    }

    /// True if the connection still takes part in the protocol: not closed
    /// and not on its way out.
    pub fn is_live(&self) -> bool {
        !self.closed && !self.pending_disconnect
    }

    /// True while outbound bytes wait in the buffer, backlog or transport.
    pub fn has_pending_output(&self) -> bool {
        self.tx_len > 0 || !self.backlog.is_empty() || self.transport.wants_write()
    }

    /// Bytes of the current inbound frame received so far.
    pub fn rx_len(&self) -> usize {
        self.rx_len
    }

    /// Unsent bytes of the current outbound frame.
    pub fn tx_len(&self) -> usize {
        self.tx_len
    }

    /// True once the transport finished its handshake and the dispatcher
    /// has seen the connection.
    pub fn is_established(&self) -> bool {
        self.established
    }

    /// Marks the connection established if its transport is ready.
    ///
    /// Returns true only on the call that does so.
    pub fn try_establish(&mut self) -> bool {
        if self.established || !self.is_live() || self.transport.is_handshaking() {
            return false;
        }
        self.established = true;
        true
    }

    /// Stops accepting input; the connection closes once its output drains.
    pub fn mark_disconnect(&mut self) {
        if !self.pending_disconnect {
            debug!(id = %self.id, "Connection marked for disconnect");
        }
        self.pending_disconnect = true;
    }

    /// Closes the transport and drops all buffered data.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.transport.close();
        self.closed = true;
        self.rx_len = 0;
        self.tx_len = 0;
        self.backlog.clear();
    }

    /// Performs one non-blocking read into the receive buffer.
    pub fn receive_once(&mut self) -> ReceiveStatus {
        if !self.is_live() {
            return ReceiveStatus::WouldBlock;
        }
        match self.transport.recv(&mut self.rx[self.rx_len..]) {
            Ok(0) => {
                debug!(id = %self.id, peer = %self.peer, "Peer closed connection");
                self.close();
                ReceiveStatus::Closed
            }
            Ok(n) => {
                self.rx_len += n;
                trace!(id = %self.id, bytes = n, filled = self.rx_len, "Received");
                if self.rx_len == FRAME_LEN {
                    self.rx_len = 0;
                    ReceiveStatus::Complete(Frame::from(self.rx))
                } else {
                    ReceiveStatus::Partial
                }
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => ReceiveStatus::WouldBlock,
            Err(e) if e.kind() == ErrorKind::Interrupted => ReceiveStatus::Partial,
            Err(e) => {
                debug!(id = %self.id, error = %e, "Read failed");
                self.close();
                ReceiveStatus::Closed
            }
        }
    }

    /// Queues a frame for sending.
    ///
    /// The frame goes straight into the send buffer when it is free and into
    /// the backlog otherwise. A full backlog drops its oldest frame.
    pub fn enqueue_send(&mut self, frame: Frame) {
        if !self.is_live() {
            return;
        }
        if self.tx_len == 0 && self.backlog.is_empty() {
            self.load(frame);
            return;
        }
        if self.backlog.len() >= self.max_queued {
            warn!(
                id = %self.id,
                queued = self.backlog.len(),
                "Outbound backlog full, dropping oldest frame"
            );
            self.backlog.pop_front();
        }
        if self.max_queued > 0 {
            self.backlog.push_back(frame);
        }
    }

    fn load(&mut self, frame: Frame) {
        self.tx.copy_from_slice(frame.as_bytes());
        self.tx_len = FRAME_LEN;
    }

    /// Performs one non-blocking write of the send buffer.
    ///
    /// A connection marked for disconnect is closed here once nothing is
    /// left to send.
    pub fn send_once(&mut self) -> SendStatus {
        if self.closed {
            return SendStatus::Closed;
        }
        if self.tx_len == 0
            && let Some(next) = self.backlog.pop_front()
        {
            self.load(next);
        }

        let result = if self.tx_len > 0 {
            self.transport.send(&self.tx[..self.tx_len]).map(|n| {
                self.tx.copy_within(n..self.tx_len, 0);
                self.tx_len -= n;
                trace!(id = %self.id, bytes = n, left = self.tx_len, "Sent");
                n
            })
        } else {
            self.transport.flush().map(|()| 0)
        };

        match result {
            Ok(_) if self.has_pending_output() => SendStatus::Progress,
            Ok(_) if self.pending_disconnect => {
                debug!(id = %self.id, "Output drained, closing");
                self.close();
                SendStatus::Closed
            }
            Ok(_) => SendStatus::Idle,
            Err(e) if e.kind() == ErrorKind::WouldBlock => SendStatus::WouldBlock,
            Err(e) if e.kind() == ErrorKind::Interrupted => SendStatus::Progress,
            Err(e) => {
                debug!(id = %self.id, error = %e, "Write failed");
                self.close();
                SendStatus::Closed
            }
        }
    }

    /// Calls [`Connection::send_once`] until it stops making progress.
    pub fn flush(&mut self) -> SendStatus {
        loop {
            match self.send_once() {
                SendStatus::Progress => continue,
                status => return status,
            }
        }
    }
}
