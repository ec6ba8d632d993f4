//! Byte transports under a framed connection.
//!
//! A [`Transport`] is a non-blocking duplex byte stream. `recv` and `send`
//! report "no progress possible right now" as an `io::ErrorKind::WouldBlock`
//! error and EOF as `Ok(0)`, like a non-blocking socket does.

use std::io::{self, ErrorKind, Read, Write};
use std::net::Shutdown;

use mio::event::Source;
use mio::net::TcpStream;
use mio::{Interest, Registry, Token};

/// A non-blocking duplex byte stream.
pub trait Transport {
    /// Reads into `buf`. `Ok(0)` means the peer closed the stream.
    fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Writes from `buf`, returning how much was accepted.
    fn send(&mut self, buf: &[u8]) -> io::Result<usize>;

    /// Pushes out bytes the transport buffered on its own.
    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }

    /// True while the transport holds bytes of its own to write.
    fn wants_write(&self) -> bool {
        false
    }

    /// True until the transport can carry protocol frames.
    fn is_handshaking(&self) -> bool {
        false
    }

    /// Closes the stream. Errors are ignored; the peer may already be gone.
    fn close(&mut self);
}

/// A TCP connection, plain or wrapped in a TLS session.
pub enum Stream {
    Plain(TcpStream),
    Tls(Box<TlsStream>),
}

impl Stream {
    pub fn plain(sock: TcpStream) -> Self {
        Self::Plain(sock)
    }

    pub fn tls(sock: TcpStream, session: rustls::Connection) -> Self {
        Self::Tls(Box::new(TlsStream { sock, session }))
    }

    fn socket_mut(&mut self) -> &mut TcpStream {
        match self {
            Self::Plain(sock) => sock,
            Self::Tls(tls) => &mut tls.sock,
        }
    }
}

impl Transport for Stream {
    fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Self::Plain(sock) => sock.read(buf),
            Self::Tls(tls) => tls.recv(buf),
        }
    }

    fn send(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Self::Plain(sock) => sock.write(buf),
            Self::Tls(tls) => tls.send(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Self::Plain(_) => Ok(()),
            Self::Tls(tls) => tls.flush(),
        }
    }

    fn wants_write(&self) -> bool {
        match self {
            Self::Plain(_) => false,
            Self::Tls(tls) => tls.wants_write(),
        }
    }

    fn is_handshaking(&self) -> bool {
        match self {
            Self::Plain(_) => false,
            Self::Tls(tls) => tls.is_handshaking(),
        }
    }

    fn close(&mut self) {
        match self {
            Self::Plain(sock) => {
                let _ = sock.shutdown(Shutdown::Both);
            }
            Self::Tls(tls) => tls.close(),
        }
    }
}

impl Source for Stream {
    fn register(
        &mut self,
        registry: &Registry,
        token: Token,
        interests: Interest,
    ) -> io::Result<()> {
        self.socket_mut().register(registry, token, interests)
    }

    fn reregister(
        &mut self,
        registry: &Registry,
        token: Token,
        interests: Interest,
    ) -> io::Result<()> {
        self.socket_mut().reregister(registry, token, interests)
    }

    fn deregister(&mut self, registry: &Registry) -> io::Result<()> {
        self.socket_mut().deregister(registry)
    }
}

/// A TLS session over a non-blocking socket.
///
/// The handshake has no step of its own: it advances whenever the reactor
/// reads or writes the connection, and application bytes written before it
/// completes are buffered by rustls.
pub struct TlsStream {
    sock: TcpStream,
    session: rustls::Connection,
}

impl TlsStream {
    /// Writes buffered TLS records to the socket.
    ///
    /// Fails with `WouldBlock` if the socket fills up before the session's
    /// outbound buffer is empty.
    fn flush_tls(&mut self) -> io::Result<()> {
        while self.session.wants_write() {
            match self.session.write_tls(&mut self.sock) {
                Ok(0) => return Err(ErrorKind::WriteZero.into()),
                Ok(_) => {}
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Like [`TlsStream::flush_tls`], for callers that made progress of
    /// their own and retry the rest later.
    fn flush_tls_partial(&mut self) -> io::Result<()> {
        match self.flush_tls() {
            Err(e) if e.kind() == ErrorKind::WouldBlock => Ok(()),
            result => result,
        }
    }
}

impl Transport for TlsStream {
    fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            match self.session.reader().read(buf) {
                // Ok(0) here is a close_notify from the peer
                Ok(n) => return Ok(n),
                Err(e) if e.kind() == ErrorKind::WouldBlock => {}
                Err(e) => return Err(e),
            }

            match self.session.read_tls(&mut self.sock) {
                Ok(0) => return Ok(0),
                Ok(_) => {
                    self.session
                        .process_new_packets()
                        .map_err(|e| io::Error::new(ErrorKind::InvalidData, e))?;
                    self.flush_tls_partial()?;
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
    }

    /// Hands `buf` to the session, bounded by its outbound buffer limit.
    fn send(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.session.writer().write(buf)?;
        self.flush_tls_partial()?;
        if n == 0 && !buf.is_empty() {
            return Err(ErrorKind::WouldBlock.into());
        }
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.flush_tls()
    }

    fn wants_write(&self) -> bool {
        self.session.wants_write()
    }

    fn is_handshaking(&self) -> bool {
        self.session.is_handshaking()
    }

    fn close(&mut self) {
        self.session.send_close_notify();
        let _ = self.flush_tls();
        let _ = self.sock.shutdown(Shutdown::Both);
    }
}

/// An in-memory transport replaying a script of reads.
#[cfg(test)]
pub(crate) mod mock {
    use std::collections::VecDeque;
    use std::io::{self, ErrorKind};

    use chatdir_protocol::{FRAME_LEN, Frame};

    use super::Transport;

    /// One scripted outcome of `recv`.
    pub(crate) enum Step {
        Data(Vec<u8>),
        Block,
        Eof,
        Fail,
    }

    impl Step {
        pub(crate) fn frame(text: &str) -> Self {
            Self::Data(Frame::from_text(text).as_bytes().to_vec())
        }
    }

    #[derive(Default)]
    pub(crate) struct ScriptedTransport {
        reads: VecDeque<Step>,
        /// Per-call write budgets; `None` blocks. Unlimited once exhausted.
        write_limits: VecDeque<Option<usize>>,
        /// Records stuck in the transport's own buffer, as with a TLS
        /// session whose socket is full.
        stalled: bool,
        /// `recv` calls left before the handshake completes.
        handshake_reads: usize,
        pub(crate) written: Vec<u8>,
        pub(crate) closed: bool,
    }

    impl ScriptedTransport {
        pub(crate) fn new() -> Self {
            Self::default()
        }

        pub(crate) fn reading(steps: impl IntoIterator<Item = Step>) -> Self {
            Self {
                reads: steps.into_iter().collect(),
                ..Self::default()
            }
        }

        pub(crate) fn limit_writes(
            mut self,
            limits: impl IntoIterator<Item = Option<usize>>,
        ) -> Self {
            self.write_limits = limits.into_iter().collect();
            self
        }

        /// From now on writes block with bytes left behind in the
        /// transport.
        pub(crate) fn stall(&mut self) {
            self.stalled = true;
        }

        pub(crate) fn handshaking_for(mut self, reads: usize) -> Self {
            self.handshake_reads = reads;
            self
        }

        pub(crate) fn push_read(&mut self, step: Step) {
            self.reads.push_back(step);
        }

        /// Texts of every complete frame written so far.
        pub(crate) fn sent_texts(&self) -> Vec<String> {
            self.written
                .chunks_exact(FRAME_LEN)
                .map(|chunk| Frame::from_bytes(chunk).text().into_owned())
                .collect()
        }
    }

    impl Transport for ScriptedTransport {
        fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.handshake_reads = self.handshake_reads.saturating_sub(1);
            match self.reads.pop_front() {
                None | Some(Step::Block) => Err(ErrorKind::WouldBlock.into()),
                Some(Step::Eof) => Ok(0),
                Some(Step::Fail) => Err(ErrorKind::ConnectionReset.into()),
                Some(Step::Data(mut bytes)) => {
                    let n = bytes.len().min(buf.len());
                    buf[..n].copy_from_slice(&bytes[..n]);
                    if n < bytes.len() {
                        self.reads.push_front(Step::Data(bytes.split_off(n)));
                    }
                    Ok(n)
                }
            }
        }

        fn send(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.stalled {
                return Err(ErrorKind::WouldBlock.into());
            }
            let n = match self.write_limits.pop_front() {
                Some(None) => return Err(ErrorKind::WouldBlock.into()),
                Some(Some(limit)) => limit.min(buf.len()),
                None => buf.len(),
            };
            self.written.extend_from_slice(&buf[..n]);
            Ok(n)
        }

        fn flush(&mut self) -> io::Result<()> {
            if self.stalled {
                return Err(ErrorKind::WouldBlock.into());
            }
            Ok(())
        }

        fn wants_write(&self) -> bool {
            self.stalled
        }

        fn is_handshaking(&self) -> bool {
            self.handshake_reads > 0
        }

        fn close(&mut self) {
            self.closed = true;
        }
    }
}
