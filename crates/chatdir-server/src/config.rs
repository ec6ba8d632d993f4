//! Server configuration.

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

use chatdir_protocol::DEFAULT_DIRECTORY_PORT;

/// Default number of readiness events fetched per poll.
pub const DEFAULT_POLL_CAPACITY: usize = 128;

/// Default bound on frames queued behind the one being sent.
pub const DEFAULT_MAX_QUEUED_FRAMES: usize = 16;

/// Reactor configuration shared by the directory and chat-room servers.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address the listener binds.
    pub listen_addr: SocketAddr,

    /// Readiness events fetched per poll.
    pub poll_capacity: usize,

    /// Per-connection outbound backlog bound. Once full, the oldest queued
    /// frame is dropped.
    pub max_queued_frames: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_directory_addr(),
            poll_capacity: DEFAULT_POLL_CAPACITY,
            max_queued_frames: DEFAULT_MAX_QUEUED_FRAMES,
        }
    }
}

impl ServerConfig {
    /// Creates a configuration listening on the given address.
    pub fn new(listen_addr: SocketAddr) -> Self {
        Self {
            listen_addr,
            ..Default::default()
        }
    }

    /// Configuration for a chat room listening on every interface.
    pub fn room(port: u16) -> Self {
        Self::new(SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port)))
    }

    /// Builder: set poll event capacity.
    pub fn with_poll_capacity(mut self, capacity: usize) -> Self {
        self.poll_capacity = capacity.max(1);
        self
    }

    /// Builder: set the outbound backlog bound.
    pub fn with_max_queued_frames(mut self, max: usize) -> Self {
        self.max_queued_frames = max;
        self
    }
}

/// The well-known directory address, `127.0.0.1:41022`.
pub fn default_directory_addr() -> SocketAddr {
    SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::LOCALHOST, DEFAULT_DIRECTORY_PORT))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.listen_addr.to_string(), "127.0.0.1:41022");
        assert_eq!(config.poll_capacity, DEFAULT_POLL_CAPACITY);
        assert_eq!(config.max_queued_frames, DEFAULT_MAX_QUEUED_FRAMES);
    }

    #[test]
    fn custom_config() {
        let config = ServerConfig::room(9000)
            .with_poll_capacity(0)
            .with_max_queued_frames(4);

        assert_eq!(config.listen_addr.to_string(), "0.0.0.0:9000");
        assert_eq!(config.poll_capacity, 1);
        assert_eq!(config.max_queued_frames, 4);
    }
}
