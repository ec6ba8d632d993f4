//! `chatdir directory`: run the directory server.

use std::net::SocketAddr;

use chatdir_server::{DirectoryDispatcher, Reactor, ServerConfig, SignalHandler};
use tracing::info;

use crate::config::ChatConfig;
use crate::error::ClientResult;

/// Runs the directory until SIGINT/SIGTERM.
///
/// Listens on `listen`, or on the configured directory address.
pub fn run(config: &ChatConfig, listen: Option<SocketAddr>) -> ClientResult<()> {
    let listen = match listen {
        Some(addr) => addr,
        None => config.directory_addr()?,
    };
    let tls = config.tls_context(true)?;

    let server = config.server_config(ServerConfig::new(listen));
    let mut reactor = Reactor::bind(server, DirectoryDispatcher::new(), tls)?;
    SignalHandler::new(reactor.shutdown_handle()).spawn_listener()?;

    let reason = reactor.run()?;
    info!(?reason, "Directory stopped");
    Ok(())
}
