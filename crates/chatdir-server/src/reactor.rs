//! The single-threaded readiness loop.
//!
//! Each iteration:
//!
//! 1. accept every pending connection,
//! 2. read ready connections in registry order, dispatching whole frames,
//! 3. flush every connection with output,
//! 4. reap closed connections, announce departures and flush again,
//! 5. update poll interest, then block until something is ready.
//!
//! `poll` is the only blocking call and has no timeout. Sockets are
//! registered edge-triggered, so reads and writes always continue until
//! they would block.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::net::SocketAddr;
use std::sync::Arc;

use chatdir_protocol::{DirectoryRequest, Topic};
use mio::net::{TcpListener, TcpStream};
use mio::{Events, Interest, Poll, Token, Waker};
use tracing::{debug, info, warn};

use crate::config::ServerConfig;
use crate::connection::{ConnId, Connection, ReceiveStatus, SendStatus};
use crate::dispatch::{Dispatcher, drain_input, establish, reap_departed};
use crate::error::{ServerError, ServerResult};
use crate::registry::Registry;
use crate::signals::ShutdownHandle;
use crate::tls::TlsContext;
use crate::transport::Stream;

const LISTENER: Token = Token(0);
const UPSTREAM: Token = Token(1);
const WAKER: Token = Token(2);
const FIRST_CONNECTION: usize = 16;

fn token_of(id: ConnId) -> Token {
    Token(FIRST_CONNECTION + id.0 as usize)
}

fn id_of(token: Token) -> Option<ConnId> {
    token
        .0
        .checked_sub(FIRST_CONNECTION)
        .map(|n| ConnId(n as u64))
}

/// Why [`Reactor::run`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    /// A signal or [`ShutdownHandle::trigger`] asked for shutdown.
    Shutdown,
    /// The directory closed the room's registration link.
    UpstreamClosed,
}

/// A room's registration link to the directory.
struct Upstream {
    conn: Connection<Stream, ()>,
}

/// Accepts connections and runs them through a [`Dispatcher`].
pub struct Reactor<D: Dispatcher> {
    poll: Poll,
    listener: TcpListener,
    local_addr: SocketAddr,
    registry: Registry<Stream, D::Role>,
    registered: HashMap<ConnId, Interest>,
    dispatcher: D,
    tls: Option<TlsContext>,
    upstream: Option<Upstream>,
    shutdown: ShutdownHandle,
    poll_capacity: usize,
}

impl<D: Dispatcher> Reactor<D> {
    /// Binds the listener and prepares the poll.
    pub fn bind(
        config: ServerConfig,
        dispatcher: D,
        tls: Option<TlsContext>,
    ) -> ServerResult<Self> {
        if let Some(tls) = &tls
            && !tls.can_serve()
        {
            return Err(ServerError::config(
                "TLS enabled without a certificate and key",
            ));
        }

        let poll = Poll::new()?;
        let mut listener =
            TcpListener::bind(config.listen_addr).map_err(|source| ServerError::Bind {
                addr: config.listen_addr,
                source,
            })?;
        let local_addr = listener.local_addr()?;
        poll.registry()
            .register(&mut listener, LISTENER, Interest::READABLE)?;
        let waker = Arc::new(Waker::new(poll.registry(), WAKER)?);

        info!(addr = %local_addr, tls = tls.is_some(), "Listening");

        Ok(Self {
            poll,
            listener,
            local_addr,
            registry: Registry::new(config.max_queued_frames),
            registered: HashMap::new(),
            dispatcher,
            tls,
            upstream: None,
            shutdown: ShutdownHandle::new(waker),
            poll_capacity: config.poll_capacity,
        })
    }

    /// The bound listener address.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// A handle that stops [`Reactor::run`] from any thread.
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    /// Connects to the directory and queues this room's registration.
    ///
    /// The link stays open for the life of the room; the directory closing
    /// it ends [`Reactor::run`] with [`ExitReason::UpstreamClosed`].
    pub fn register_with_directory(
        &mut self,
        directory: SocketAddr,
        topic: &Topic,
    ) -> ServerResult<()> {
        let sock = std::net::TcpStream::connect(directory)
            .map_err(|e| ServerError::directory(directory.to_string(), e.to_string()))?;
        sock.set_nonblocking(true)?;
        let sock = TcpStream::from_std(sock);

        let stream = match &self.tls {
            Some(tls) => Stream::tls(sock, tls.connect_session()?),
            None => Stream::plain(sock),
        };
        let mut conn = Connection::new(ConnId(0), directory, stream, 1);
        let port = self.local_addr.port();
        conn.enqueue_send(
            DirectoryRequest::Register {
                topic: topic.clone(),
                port,
            }
            .to_frame(),
        );
        self.poll.registry().register(
            conn.transport_mut(),
            UPSTREAM,
            Interest::READABLE | Interest::WRITABLE,
        )?;

        info!(directory = %directory, topic = %topic, port, "Registering with directory");
        self.upstream = Some(Upstream { conn });
        Ok(())
    }

    /// Runs until shutdown or until the directory link closes.
    ///
    /// Only poll and listener failures are returned as errors; a failing
    /// connection is closed and the loop carries on.
    pub fn run(&mut self) -> ServerResult<ExitReason> {
        let mut events = Events::with_capacity(self.poll_capacity);
        let mut readable = Vec::new();

        loop {
            self.settle();
            if let Some(reason) = self.flush_upstream() {
                return Ok(self.stop(reason));
            }
            if !self.sync_interest() {
                continue;
            }
            if self.shutdown.is_shutdown() {
                return Ok(self.stop(ExitReason::Shutdown));
            }

            if let Err(e) = self.poll.poll(&mut events, None) {
                if e.kind() == ErrorKind::Interrupted {
                    continue;
                }
                return Err(e.into());
            }

            let mut accept = false;
            let mut upstream_ready = false;
            readable.clear();
            for event in events.iter() {
                match event.token() {
                    LISTENER => accept = true,
                    UPSTREAM => upstream_ready = true,
                    WAKER => debug!("Reactor woken"),
                    token => {
                        if let Some(id) = id_of(token)
                            && (event.is_readable() || event.is_read_closed() || event.is_error())
                        {
                            readable.push(id);
                        }
                    }
                }
            }

            if accept {
                self.accept_all()?;
            }

            readable.sort_unstable();
            readable.dedup();
            for &id in &readable {
                drain_input(&mut self.dispatcher, &mut self.registry, id);
            }

            if upstream_ready && let Some(reason) = self.read_upstream() {
                return Ok(self.stop(reason));
            }
        }
    }

    fn accept_all(&mut self) -> ServerResult<()> {
        while let Some(id) = self
            .registry
            .accept_new(&self.listener, self.tls.as_ref())?
        {
            establish(&mut self.dispatcher, &mut self.registry, id);
        }
        Ok(())
    }

    /// Flushes and reaps until no more connections close.
    fn settle(&mut self) {
        loop {
            self.registry.flush_all();
            let departed = reap_departed(&mut self.dispatcher, &mut self.registry);
            if departed.is_empty() {
                return;
            }
            for mut conn in departed {
                self.registered.remove(&conn.id());
                if let Err(e) = self.poll.registry().deregister(conn.transport_mut()) {
                    debug!(id = %conn.id(), error = %e, "Deregister failed");
                }
            }
        }
    }

    /// Registers or updates each connection's poll interest.
    ///
    /// Returns false if a connection had to be closed, so the caller can
    /// settle again before blocking.
    fn sync_interest(&mut self) -> bool {
        let wanted = self.registry.build_interest();
        let mut clean = true;

        for conn in self.registry.iter_mut() {
            let id = conn.id();
            let interest = match (wanted.wants_read(id), wanted.wants_write(id)) {
                (true, true) => Interest::READABLE | Interest::WRITABLE,
                (true, false) => Interest::READABLE,
                (false, true) => Interest::WRITABLE,
                (false, false) => continue,
            };

            let registry = self.poll.registry();
            let result = match self.registered.insert(id, interest) {
                None => registry.register(conn.transport_mut(), token_of(id), interest),
                Some(previous) if previous != interest => {
                    registry.reregister(conn.transport_mut(), token_of(id), interest)
                }
                Some(_) => Ok(()),
            };
            if let Err(e) = result {
                warn!(id = %id, error = %e, "Failed to update poll interest");
                conn.close();
                clean = false;
            }
        }
        clean
    }

    fn read_upstream(&mut self) -> Option<ExitReason> {
        let upstream = self.upstream.as_mut()?;
        loop {
            match upstream.conn.receive_once() {
                ReceiveStatus::Complete(frame) => {
                    warn!(text = %frame.text(), "Unexpected data from directory, ignoring");
                }
                ReceiveStatus::Partial => {}
                ReceiveStatus::WouldBlock => return None,
                ReceiveStatus::Closed => {
                    info!("Directory closed the registration link");
                    return Some(ExitReason::UpstreamClosed);
                }
            }
        }
    }

    fn flush_upstream(&mut self) -> Option<ExitReason> {
        let upstream = self.upstream.as_mut()?;
        if !upstream.conn.has_pending_output() {
            return None;
        }
        match upstream.conn.flush() {
            SendStatus::Closed => {
                warn!("Lost the directory link while registering");
                Some(ExitReason::UpstreamClosed)
            }
            _ => None,
        }
    }

    fn stop(&mut self, reason: ExitReason) -> ExitReason {
        info!(connections = self.registry.len(), ?reason, "Stopping");
        self.registry.close_all();
        if let Some(upstream) = self.upstream.as_mut() {
            upstream.conn.close();
        }
        reason
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::{ChatDispatcher, DirectoryDispatcher};
    use crate::tls::testing::localhost_credentials;
    use chatdir_protocol::{FRAME_LEN, Frame, FrameReader, FrameWriter};
    use std::io::{Read, Write};
    use std::thread::{self, JoinHandle};
    use std::time::Duration;

    struct Running {
        addr: SocketAddr,
        shutdown: ShutdownHandle,
        thread: JoinHandle<ServerResult<ExitReason>>,
    }

    impl Running {
        fn stop(self) -> ExitReason {
            self.shutdown.trigger();
            self.thread.join().unwrap().unwrap()
        }
    }

    fn loopback() -> ServerConfig {
        ServerConfig::new("127.0.0.1:0".parse().unwrap())
    }

    fn spawn<D>(mut reactor: Reactor<D>) -> Running
    where
        D: Dispatcher + Send + 'static,
        D::Role: Send,
    {
        let addr = reactor.local_addr();
        let shutdown = reactor.shutdown_handle();
        let thread = thread::spawn(move || reactor.run());
        Running {
            addr,
            shutdown,
            thread,
        }
    }

    fn directory() -> Running {
        spawn(Reactor::bind(loopback(), DirectoryDispatcher::new(), None).unwrap())
    }

    struct Peer<S: Read + Write> {
        stream: S,
    }

    impl<S: Read + Write> Peer<S> {
        fn send(&mut self, text: &str) {
            FrameWriter::new(&mut self.stream)
                .write_frame(&Frame::from_text(text))
                .unwrap();
        }

        fn recv(&mut self) -> Option<String> {
            FrameReader::new(&mut self.stream)
                .read_frame()
                .unwrap()
                .map(|frame| frame.text().into_owned())
        }

        fn expect(&mut self, text: &str) {
            assert_eq!(self.recv().as_deref(), Some(text));
        }
    }

    fn connect(addr: SocketAddr) -> Peer<std::net::TcpStream> {
        let stream = std::net::TcpStream::connect(addr).unwrap();
        stream
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();
        Peer { stream }
    }

    #[test]
    fn token_mapping() {
        let id = ConnId(3);
        assert_eq!(id_of(token_of(id)), Some(id));
        assert_eq!(id_of(LISTENER), None);
        assert_eq!(id_of(WAKER), None);
    }

    #[test]
    fn directory_register_list_lookup() {
        let dir = directory();

        let mut room = connect(dir.addr);
        room.send("sFood; 9000");

        // registration has no reply, so poll the list until it shows up
        let mut listed = String::new();
        for _ in 0..50 {
            let mut client = connect(dir.addr);
            client.send("cl");
            listed = client.recv().unwrap();
            if listed == "Food" {
                client.send("crFood");
                client.expect("2130706433;9000");
                assert_eq!(client.recv(), None);
                break;
            }
            thread::sleep(Duration::from_millis(20));
        }
        assert_eq!(listed, "Food");

        drop(room);
        assert_eq!(dir.stop(), ExitReason::Shutdown);
    }

    #[test]
    fn frame_split_across_writes_is_one_request() {
        let dir = directory();
        let mut client = connect(dir.addr);

        let frame = Frame::from_text("cl");
        client.stream.write_all(&frame.as_bytes()[..37]).unwrap();
        client.stream.flush().unwrap();
        thread::sleep(Duration::from_millis(50));
        client.stream.write_all(&frame.as_bytes()[37..]).unwrap();

        client.expect("");
        assert_eq!(dir.stop(), ExitReason::Shutdown);
    }

    #[test]
    fn garbage_is_disconnected() {
        let dir = directory();
        let mut client = connect(dir.addr);
        client.send("hello");
        assert_eq!(client.recv(), None);
        assert_eq!(dir.stop(), ExitReason::Shutdown);
    }

    #[test]
    fn chat_room_round_trip() {
        let room = spawn(Reactor::bind(loopback(), ChatDispatcher::new(), None).unwrap());

        let mut alice = connect(room.addr);
        alice.expect("Please input a username (max ten chars):");
        alice.send("alice");
        alice.expect("You are the first user to join the chat");
        alice.expect("You may now begin chatting (max message length is 87 chars)");

        let mut bob = connect(room.addr);
        bob.expect("Please input a username (max ten chars):");
        bob.send("alice");
        bob.expect("That username is already taken, please enter a new name:");
        bob.send("bob");
        bob.expect("You may now begin chatting (max message length is 87 chars)");
        alice.expect("bob has joined the chat");

        alice.send("hi bob");
        bob.expect("alice: hi bob");

        drop(bob);
        alice.expect("bob has left the chat");

        assert_eq!(room.stop(), ExitReason::Shutdown);
        assert_eq!(alice.recv(), None);
    }

    #[test]
    fn room_registers_and_exits_when_directory_goes_away() {
        let dir = directory();

        let topic = Topic::new("Games").unwrap();
        let mut reactor = Reactor::bind(loopback(), ChatDispatcher::new(), None).unwrap();
        let room_port = reactor.local_addr().port();
        reactor.register_with_directory(dir.addr, &topic).unwrap();
        let room = spawn(reactor);

        let mut resolved = None;
        for _ in 0..50 {
            let mut client = connect(dir.addr);
            client.send("cl");
            if client.recv().as_deref() == Some("Games") {
                client.send("crGames");
                resolved = client.recv();
                break;
            }
            thread::sleep(Duration::from_millis(20));
        }
        assert_eq!(resolved, Some(format!("2130706433;{room_port}")));

        assert_eq!(dir.stop(), ExitReason::Shutdown);
        assert_eq!(room.thread.join().unwrap().unwrap(), ExitReason::UpstreamClosed);
    }

    #[test]
    fn tls_directory_serves_clients() {
        let creds = localhost_credentials();
        let tls =
            TlsContext::init_credentials(&creds.cert, Some((&creds.cert, &creds.key))).unwrap();
        let dir = spawn(
            Reactor::bind(loopback(), DirectoryDispatcher::new(), Some(tls.clone())).unwrap(),
        );

        let session =
            rustls::ClientConnection::new(tls.client_config(), tls.server_name().clone()).unwrap();
        let sock = std::net::TcpStream::connect(dir.addr).unwrap();
        sock.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
        let mut client = Peer {
            stream: rustls::StreamOwned::new(session, sock),
        };

        client.send("cl");
        client.expect("");
        assert_eq!(dir.stop(), ExitReason::Shutdown);
    }

    #[test]
    fn failed_tls_handshake_closes_only_that_connection() {
        let creds = localhost_credentials();
        let tls =
            TlsContext::init_credentials(&creds.cert, Some((&creds.cert, &creds.key))).unwrap();
        let dir = spawn(
            Reactor::bind(loopback(), DirectoryDispatcher::new(), Some(tls.clone())).unwrap(),
        );

        // plain frames are not TLS records
        let mut plain = connect(dir.addr);
        plain.send("cl");
        let mut received = Vec::new();
        let mut buf = [0u8; 256];
        loop {
            match plain.stream.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => received.extend_from_slice(&buf[..n]),
                Err(e) if e.kind() == ErrorKind::ConnectionReset => break,
                Err(e) => panic!("expected the directory to hang up, got {e}"),
            }
        }
        assert!(received.len() < FRAME_LEN, "got {} bytes", received.len());

        let session =
            rustls::ClientConnection::new(tls.client_config(), tls.server_name().clone()).unwrap();
        let sock = std::net::TcpStream::connect(dir.addr).unwrap();
        sock.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
        let mut client = Peer {
            stream: rustls::StreamOwned::new(session, sock),
        };
        client.send("cl");
        client.expect("");
        assert_eq!(dir.stop(), ExitReason::Shutdown);
    }

    #[test]
    fn tls_requires_server_credentials() {
        let creds = localhost_credentials();
        let tls = TlsContext::init_credentials(&creds.cert, None).unwrap();
        assert!(matches!(
            Reactor::bind(loopback(), DirectoryDispatcher::new(), Some(tls)),
            Err(ServerError::Config { .. })
        ));
    }

    #[test]
    fn bind_failure_is_reported() {
        let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let config = ServerConfig::new(taken.local_addr().unwrap());
        assert!(matches!(
            Reactor::bind(config, DirectoryDispatcher::new(), None),
            Err(ServerError::Bind { .. })
        ));
    }
}
