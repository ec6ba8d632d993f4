//! CLI, config, interactive chat client and server launchers
//!
//! This crate provides the `chatdir` command-line interface.

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;

pub use cli::Cli;
pub use config::ChatConfig;
pub use error::{ClientError, ClientResult};
