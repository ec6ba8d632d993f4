//! Client configuration.
//!
//! All settings live in a single `config.toml` file at
//! `~/.config/chatdir/config.toml` by default.

use std::net::{SocketAddr, ToSocketAddrs};
use std::path::{Path, PathBuf};

use chatdir_protocol::{DEFAULT_DIRECTORY_HOST, DEFAULT_DIRECTORY_PORT};
use chatdir_server::{DEFAULT_MAX_QUEUED_FRAMES, DEFAULT_POLL_CAPACITY, ServerConfig, TlsContext};
use serde::{Deserialize, Serialize};

use crate::error::{ClientError, ClientResult};

/// Configuration for chatdir.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// Where the directory service listens.
    pub directory: DirectorySettings,

    /// TLS settings shared by the client, the directory and rooms.
    pub tls: TlsSettings,

    /// Reactor tuning for `chatdir directory` and `chatdir room`.
    pub server: ServerSettings,
}

/// Directory address.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectorySettings {
    pub host: String,
    pub port: u16,
}

impl Default for DirectorySettings {
    fn default() -> Self {
        Self {
            host: DEFAULT_DIRECTORY_HOST.to_string(),
            port: DEFAULT_DIRECTORY_PORT,
        }
    }
}

/// TLS settings. Servers need `cert_file` and `key_file`; everyone needs
/// `ca_file` to verify the peer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TlsSettings {
    pub enabled: bool,
    pub ca_file: Option<PathBuf>,
    pub cert_file: Option<PathBuf>,
    pub key_file: Option<PathBuf>,
    /// Name expected in server certificates (defaults to `localhost`).
    pub server_name: Option<String>,
}

/// Reactor settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Readiness events fetched per poll.
    pub poll_capacity: usize,

    /// Frames queued per connection before the oldest is dropped.
    pub max_queued_frames: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            poll_capacity: DEFAULT_POLL_CAPACITY,
            max_queued_frames: DEFAULT_MAX_QUEUED_FRAMES,
        }
    }
}

impl ChatConfig {
    /// Loads configuration from the default path, or defaults if there is
    /// no file.
    pub fn load() -> ClientResult<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Loads configuration from a specific path.
    pub fn load_from(path: &Path) -> ClientResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ClientError::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        toml::from_str(&content).map_err(|e| {
            ClientError::Config(format!("failed to parse {}: {}", path.display(), e))
        })
    }

    /// Returns the default configuration file path.
    pub fn default_path() -> PathBuf {
        Self::default_config_dir().join("config.toml")
    }

    /// Returns the default configuration directory.
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("chatdir")
    }

    /// Applies the `--directory` and `--tls` command-line overrides.
    pub fn apply_overrides(&mut self, directory: Option<&str>, tls: bool) -> ClientResult<()> {
        if let Some(directory) = directory {
            let (host, port) = directory.rsplit_once(':').ok_or_else(|| {
                ClientError::Config(format!("directory must be HOST:PORT, got {directory:?}"))
            })?;
            let port = port
                .parse()
                .map_err(|_| ClientError::Config(format!("invalid directory port: {port:?}")))?;
            self.directory.host = host.trim_start_matches('[').trim_end_matches(']').to_string();
            self.directory.port = port;
        }
        if tls {
            self.tls.enabled = true;
        }
        Ok(())
    }

    /// Resolves the directory address, preferring IPv4.
    pub fn directory_addr(&self) -> ClientResult<SocketAddr> {
        let DirectorySettings { host, port } = &self.directory;
        let addrs: Vec<SocketAddr> = (host.as_str(), *port)
            .to_socket_addrs()
            .map_err(|e| ClientError::Config(format!("cannot resolve directory {host}: {e}")))?
            .collect();
        addrs
            .iter()
            .find(|addr| addr.is_ipv4())
            .or_else(|| addrs.first())
            .copied()
            .ok_or_else(|| ClientError::Config(format!("directory {host} has no address")))
    }

    /// Applies the `[server]` settings to `base`.
    pub fn server_config(&self, base: ServerConfig) -> ServerConfig {
        base.with_poll_capacity(self.server.poll_capacity)
            .with_max_queued_frames(self.server.max_queued_frames)
    }

    /// Loads TLS credentials if TLS is enabled.
    ///
    /// With `serve` set, the certificate and key are required as well.
    pub fn tls_context(&self, serve: bool) -> ClientResult<Option<TlsContext>> {
        let tls = &self.tls;
        if !tls.enabled {
            return Ok(None);
        }
        let ca_file = required(&tls.ca_file, "tls.ca_file")?;
        let identity = if serve {
            Some((
                required(&tls.cert_file, "tls.cert_file")?,
                required(&tls.key_file, "tls.key_file")?,
            ))
        } else {
            None
        };

        let mut context = TlsContext::init_credentials(ca_file, identity)?;
        if let Some(name) = &tls.server_name {
            context = context.with_server_name(name)?;
        }
        Ok(Some(context))
    }
}

fn required<'a>(value: &'a Option<PathBuf>, key: &str) -> ClientResult<&'a Path> {
    value
        .as_deref()
        .ok_or_else(|| ClientError::Config(format!("{key} is required when TLS is enabled")))
}
