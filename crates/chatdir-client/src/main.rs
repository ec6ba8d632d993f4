//! chatdir CLI entry point.

use std::process::ExitCode;

use chatdir_core::{TracingConfig, init_tracing};
use clap::Parser;
use tracing::Level;

use chatdir_client::cli::{Cli, Command, ConfigAction};
use chatdir_client::commands;
use chatdir_client::config::ChatConfig;
use chatdir_client::error::{ClientError, ClientResult};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Servers log like daemons; the chat client keeps stderr quiet
    let is_server = cli.command.as_ref().is_some_and(Command::is_server);
    let mut tracing = if is_server {
        TracingConfig::daemon()
    } else {
        TracingConfig::interactive()
    };
    if cli.debug {
        tracing = tracing.with_level(Level::DEBUG);
    }
    if let Err(e) = init_tracing(tracing) {
        eprintln!("error: {}", e);
        return ExitCode::FAILURE;
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> ClientResult<()> {
    let mut config = match cli.config {
        Some(ref path) => ChatConfig::load_from(path)?,
        None => ChatConfig::load()?,
    };
    config.apply_overrides(cli.directory.as_deref(), cli.tls)?;

    match cli.command {
        Some(Command::Directory { listen }) => {
            blocking(move || commands::directory::run(&config, listen)).await
        }
        Some(Command::Room { topic, port }) => {
            blocking(move || commands::room::run(&config, &topic, port)).await
        }
        Some(Command::Config { action }) => match action {
            ConfigAction::Dump => commands::config::dump(&config),
            ConfigAction::Validate => commands::config::validate(&config),
            ConfigAction::Path => commands::config::path(),
        },
        None => commands::chat::run(&config).await,
    }
}

/// Runs a server reactor off the async runtime.
async fn blocking<F>(f: F) -> ClientResult<()>
where
    F: FnOnce() -> ClientResult<()> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ClientError::Connection(format!("server task failed: {}", e)))?
}
