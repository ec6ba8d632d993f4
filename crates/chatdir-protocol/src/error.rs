//! Protocol error types.

use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors that can occur while reading or interpreting frames.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Frame carried no text.
    #[error("empty frame")]
    EmptyFrame,

    /// Frame text does not match any known command.
    #[error("unknown command: {0:?}")]
    UnknownCommand(String),

    /// Topic is empty, too long, or contains a reserved character.
    #[error("invalid topic {topic:?}: {reason}")]
    InvalidTopic { topic: String, reason: &'static str },

    /// Port is not an unsigned 16-bit decimal.
    #[error("invalid port: {0:?}")]
    InvalidPort(String),

    /// A reply frame could not be parsed.
    #[error("malformed reply: {0:?}")]
    MalformedReply(String),

    /// Connection closed in the middle of a frame.
    #[error("incomplete frame: got {received} of {expected} bytes")]
    IncompleteFrame { expected: usize, received: usize },

    /// IO error during read/write.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
