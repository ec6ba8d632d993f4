//! Command-line interface definition.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// chatdir - topic-based chat rooms with a directory service
#[derive(Debug, Parser)]
#[command(name = "chatdir")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(long, short, env = "CHATDIR_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable debug output
    #[arg(long, short = 'v')]
    pub debug: bool,

    /// Directory address as HOST:PORT (overrides the config file)
    #[arg(long, env = "CHATDIR_DIRECTORY")]
    pub directory: Option<String>,

    /// Use TLS for every connection (overrides the config file)
    #[arg(long)]
    pub tls: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Available commands. Without one, chatdir runs the interactive client.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the directory server in the foreground
    Directory {
        /// Address to listen on (defaults to the configured directory address)
        #[arg(long)]
        listen: Option<SocketAddr>,
    },

    /// Run a chat room and register it with the directory
    Room {
        /// Topic the room registers under
        topic: String,

        /// Port the room listens on
        port: u16,
    },

    /// Configuration commands
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

impl Command {
    /// True for commands that run a server reactor.
    pub fn is_server(&self) -> bool {
        matches!(self, Self::Directory { .. } | Self::Room { .. })
    }
}

/// Configuration actions.
#[derive(Debug, Subcommand)]
pub enum ConfigAction {
    /// Dump current configuration
    Dump,

    /// Validate configuration
    Validate,

    /// Show configuration file path
    Path,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_subcommand_is_the_interactive_client() {
        let cli = Cli::try_parse_from(["chatdir"]).unwrap();
        assert!(cli.command.is_none());
        assert!(!cli.tls);
    }

    #[test]
    fn room_takes_topic_and_port() {
        let cli = Cli::try_parse_from(["chatdir", "--tls", "room", "Food", "9000"]).unwrap();
        assert!(cli.tls);
        match cli.command {
            Some(Command::Room { topic, port }) => {
                assert_eq!(topic, "Food");
                assert_eq!(port, 9000);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn room_rejects_bad_port() {
        assert!(Cli::try_parse_from(["chatdir", "room", "Food", "70000"]).is_err());
        assert!(Cli::try_parse_from(["chatdir", "room", "Food"]).is_err());
    }

    #[test]
    fn directory_listen_override() {
        let cli =
            Cli::try_parse_from(["chatdir", "directory", "--listen", "0.0.0.0:41022"]).unwrap();
        match cli.command {
            Some(Command::Directory { listen }) => {
                assert_eq!(listen, Some("0.0.0.0:41022".parse().unwrap()));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn config_dump() {
        let cli = Cli::try_parse_from(["chatdir", "config", "dump"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Command::Config {
                action: ConfigAction::Dump
            })
        ));
    }
}
