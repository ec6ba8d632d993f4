//! Tracing setup for chatdir
//!
//! Every binary mode (directory, room, interactive client) installs one
//! global subscriber through [`init_tracing`]. Logs always go to stderr:
//! the interactive client owns stdout for the chat transcript.
//!
//! # Usage
//!
//! ```ignore
//! use chatdir_core::tracing::{init_tracing, TracingConfig};
//!
//! // Long-running directory or room server
//! init_tracing(TracingConfig::daemon())?;
//!
//! // Interactive client, only warnings unless --debug
//! init_tracing(TracingConfig::interactive())?;
//! ```

use thiserror::Error;
use tracing::Level;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Errors that can occur during tracing initialization
#[derive(Debug, Error)]
pub enum TracingError {
    /// Failed to set global subscriber
    #[error("failed to set global tracing subscriber: {0}")]
    SetGlobalSubscriber(#[from] tracing::subscriber::SetGlobalDefaultError),

    /// `RUST_LOG` holds a directive that does not parse
    #[error("invalid RUST_LOG directive: {0}")]
    EnvFilter(#[from] tracing_subscriber::filter::ParseError),
}

/// How a chatdir process logs to stderr.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TracingConfig {
    /// Level applied to chatdir crates when RUST_LOG is not set
    pub default_level: Level,
    /// Whether to include target (module path) in logs
    pub include_target: bool,
    /// Whether to include timestamps
    pub include_timestamp: bool,
}

impl TracingConfig {
    /// Config for the interactive chat client: quiet, no timestamps.
    #[must_use]
    pub fn interactive() -> Self {
        Self {
            default_level: Level::WARN,
            include_target: false,
            include_timestamp: false,
        }
    }

    /// Config for the directory and room servers.
    #[must_use]
    pub fn daemon() -> Self {
        Self {
            default_level: Level::INFO,
            include_target: true,
            include_timestamp: true,
        }
    }

    /// Set the default log level
    #[must_use]
    pub fn with_level(mut self, level: Level) -> Self {
        self.default_level = level;
        self
    }

    /// Filter from a `RUST_LOG` value, or the default level for chatdir
    /// crates when there is none.
    fn build_filter(&self, rust_log: Option<&str>) -> Result<EnvFilter, TracingError> {
        match rust_log.map(str::trim).filter(|value| !value.is_empty()) {
            Some(directives) => Ok(EnvFilter::try_new(directives)?),
            None => Ok(EnvFilter::new(format!("chatdir={}", self.default_level))),
        }
    }
}

/// Initialize tracing with the given configuration.
///
/// Must be called at most once per process. A non-empty `RUST_LOG`
/// replaces the configured level.
///
/// # Errors
///
/// Returns an error if the global subscriber has already been set or if
/// `RUST_LOG` does not parse.
pub fn init_tracing(config: TracingConfig) -> Result<(), TracingError> {
    let rust_log = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let env_filter = config.build_filter(rust_log.as_deref())?;

    let layer = fmt::layer()
        .compact()
        .with_writer(std::io::stderr)
        .with_target(config.include_target);
    let layer = if config.include_timestamp {
        layer.boxed()
    } else {
        layer.without_time().boxed()
    };

    let subscriber = tracing_subscriber::registry().with(env_filter).with(layer);
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}
