//! Server error types.

use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;

use thiserror::Error;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors that stop a directory or chat-room server.
///
/// Per-connection failures never show up here: they close the connection
/// and the reactor carries on.
#[derive(Debug, Error)]
pub enum ServerError {
    /// IO error (poll, listener, etc.).
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// TLS session setup failed.
    #[error("TLS error: {0}")]
    Tls(#[from] rustls::Error),

    /// Certificate, key or CA file could not be loaded.
    #[error("Failed to load TLS credentials from {}: {message}", path.display())]
    TlsCredentials { path: PathBuf, message: String },

    /// Listener could not be bound.
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    /// The directory could not be reached or refused the registration.
    #[error("Directory {addr}: {message}")]
    Directory { addr: String, message: String },

    /// Configuration error.
    #[error("Configuration error: {message}")]
    Config { message: String },
}

impl ServerError {
    /// Creates a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a TLS credentials error.
    pub fn tls_credentials(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::TlsCredentials {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Creates a directory error.
    pub fn directory(addr: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Directory {
            addr: addr.into(),
            message: message.into(),
        }
    }
}
