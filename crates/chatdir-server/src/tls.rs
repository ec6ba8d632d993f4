//! TLS credentials.
//!
//! A [`TlsContext`] is built once at startup and handed to the reactor. It
//! holds a client config that trusts the given CA, plus a server config when
//! a certificate and key were supplied. The reactor drives each session's
//! handshake itself, see [`crate::transport::TlsStream`].

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName};
use rustls::{ClientConfig, ClientConnection, RootCertStore, ServerConfig, ServerConnection};
use tracing::debug;

use crate::error::{ServerError, ServerResult};

/// Name checked against the peer's certificate when none is configured.
pub const DEFAULT_SERVER_NAME: &str = "localhost";

/// Loaded TLS configuration shared by every connection of a process.
#[derive(Clone, Debug)]
pub struct TlsContext {
    client: Arc<ClientConfig>,
    server: Option<Arc<ServerConfig>>,
    server_name: ServerName<'static>,
}

impl TlsContext {
    /// Loads the CA bundle and, for processes that accept connections, the
    /// certificate chain and private key.
    pub fn init_credentials(
        ca_file: &Path,
        identity: Option<(&Path, &Path)>,
    ) -> ServerResult<Self> {
        let provider = Arc::new(rustls::crypto::ring::default_provider());

        let mut roots = RootCertStore::empty();
        let (added, ignored) = roots.add_parsable_certificates(load_certs(ca_file)?);
        if added == 0 {
            return Err(ServerError::tls_credentials(
                ca_file,
                "no usable CA certificate",
            ));
        }
        debug!(added, ignored, ca = %ca_file.display(), "Loaded CA certificates");

        let client = ClientConfig::builder_with_provider(provider.clone())
            .with_safe_default_protocol_versions()?
            .with_root_certificates(roots)
            .with_no_client_auth();

        let server = match identity {
            Some((cert_file, key_file)) => {
                let certs = load_certs(cert_file)?;
                let key = load_key(key_file)?;
                let config = ServerConfig::builder_with_provider(provider)
                    .with_safe_default_protocol_versions()?
                    .with_no_client_auth()
                    .with_single_cert(certs, key)?;
                Some(Arc::new(config))
            }
            None => None,
        };

        Ok(Self {
            client: Arc::new(client),
            server,
            server_name: ServerName::try_from(DEFAULT_SERVER_NAME.to_string())
                .map_err(|e| ServerError::config(e.to_string()))?,
        })
    }

    /// Builder: set the name expected in the server's certificate.
    pub fn with_server_name(mut self, name: &str) -> ServerResult<Self> {
        self.server_name = ServerName::try_from(name.to_string())
            .map_err(|_| ServerError::config(format!("invalid TLS server name: {name}")))?;
        Ok(self)
    }

    /// Client-side rustls config, for callers running their own I/O.
    pub fn client_config(&self) -> Arc<ClientConfig> {
        self.client.clone()
    }

    /// The name verified against server certificates.
    pub fn server_name(&self) -> &ServerName<'static> {
        &self.server_name
    }

    /// True if a certificate and key were loaded.
    pub fn can_serve(&self) -> bool {
        self.server.is_some()
    }

    /// Starts a server-side session for an accepted connection.
    pub(crate) fn accept_session(&self) -> ServerResult<rustls::Connection> {
        let config = self
            .server
            .clone()
            .ok_or_else(|| ServerError::config("TLS enabled without a certificate and key"))?;
        Ok(ServerConnection::new(config)?.into())
    }

    /// Starts a client-side session towards `server_name`.
    pub(crate) fn connect_session(&self) -> ServerResult<rustls::Connection> {
        Ok(ClientConnection::new(self.client.clone(), self.server_name.clone())?.into())
    }
}

fn load_certs(path: &Path) -> ServerResult<Vec<CertificateDer<'static>>> {
    let file = File::open(path).map_err(|e| ServerError::tls_credentials(path, e.to_string()))?;
    let certs = rustls_pemfile::certs(&mut BufReader::new(file))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| ServerError::tls_credentials(path, e.to_string()))?;
    if certs.is_empty() {
        return Err(ServerError::tls_credentials(path, "no certificates found"));
    }
    Ok(certs)
}

fn load_key(path: &Path) -> ServerResult<PrivateKeyDer<'static>> {
    let file = File::open(path).map_err(|e| ServerError::tls_credentials(path, e.to_string()))?;
    rustls_pemfile::private_key(&mut BufReader::new(file))
        .map_err(|e| ServerError::tls_credentials(path, e.to_string()))?
        .ok_or_else(|| ServerError::tls_credentials(path, "no private key found"))
}
