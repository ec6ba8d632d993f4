//! Core helpers shared by every chatdir crate: tracing setup and
//! byte-bounded text handling.

pub mod text;
pub mod tracing;

pub use text::{truncate_bytes, until_nul};
pub use tracing::{TracingConfig, TracingError, init_tracing};
