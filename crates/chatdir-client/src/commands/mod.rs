//! Command implementations.

pub mod chat;
pub mod config;
pub mod directory;
pub mod room;
