//! Reactor core for the chatdir directory and chat-room servers.
//!
//! Both servers are the same single-threaded [`Reactor`] over non-blocking
//! sockets, differing only in their [`Dispatcher`]:
//! - [`DirectoryDispatcher`]: rooms register topics, clients look them up
//! - [`ChatDispatcher`]: members pick a name and broadcast messages
//!
//! Every connection is a [`Connection`] with one-frame receive and send
//! buffers, owned by a [`Registry`] keyed by stable [`ConnId`]s.
//!
//! # Example
//!
//! ```rust,no_run
//! use chatdir_server::{DirectoryDispatcher, Reactor, ServerConfig, SignalHandler};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut reactor = Reactor::bind(ServerConfig::default(), DirectoryDispatcher::new(), None)?;
//!     SignalHandler::new(reactor.shutdown_handle()).spawn_listener()?;
//!     reactor.run()?;
//!     Ok(())
//! }
//! ```

mod config;
mod connection;
mod dispatch;
mod error;
mod reactor;
mod registry;
mod signals;
mod tls;
mod transport;

pub use config::{
    DEFAULT_MAX_QUEUED_FRAMES, DEFAULT_POLL_CAPACITY, ServerConfig, default_directory_addr,
};
pub use connection::{ConnId, Connection, ReceiveStatus, SendStatus};
pub use dispatch::{
    ChatDispatcher, ChatRole, DirectoryDispatcher, DirectoryRole, Dispatcher, drain_input,
    establish, reap_departed,
};
pub use error::{ServerError, ServerResult};
pub use reactor::{ExitReason, Reactor};
pub use registry::{InterestSet, Registry};
pub use signals::{ShutdownHandle, SignalHandler};
pub use tls::{DEFAULT_SERVER_NAME, TlsContext};
pub use transport::{Stream, TlsStream, Transport};
