//! Wire format and message types for chatdir.
//!
//! # Protocol Overview
//!
//! Every message on every connection (directory or chat room) is exactly
//! [`FRAME_LEN`] bytes: the message text followed by NUL padding. A receiver
//! accumulates a whole frame before looking at it; partial frames carry no
//! meaning.
//!
//! ```text
//! +-----------------------------+---------------------+
//! | text (<= FRAME_LEN-1 bytes) | NUL padding         |
//! +-----------------------------+---------------------+
//! ```
//!
//! Directory grammar (see [`DirectoryRequest`]):
//! - `s<topic>; <port>`: a chat room registers itself and keeps the
//!   connection open for as long as it lives
//! - `cl`: list registered topics, answered with a comma-joined list
//! - `cr<topic>`: look up a topic, answered with `<ip_u32>;<port>`
//!
//! Chat rooms exchange free text; server-generated text is described by
//! [`Notice`].
//!
//! # Example
//!
//! ```rust
//! use chatdir_protocol::{DirectoryRequest, Frame};
//!
//! let frame = DirectoryRequest::List.to_frame();
//! assert_eq!(frame.text(), "cl");
//! assert_eq!(DirectoryRequest::parse(&frame).unwrap(), DirectoryRequest::List);
//! ```

mod chat;
mod directory;
mod error;
mod framing;

pub use chat::{Notice, truncate_message, truncate_name};
pub use directory::{DirectoryRequest, RoomEndpoint, Topic, decode_topic_list, encode_topic_list};
pub use error::{ProtocolError, ProtocolResult};
pub use framing::{Frame, FrameReader, FrameWriter};

/// Size of every frame on the wire, in bytes.
pub const FRAME_LEN: usize = 100;

/// Maximum text carried by one frame (one byte is kept for the NUL).
pub const MAX_TEXT_LEN: usize = FRAME_LEN - 1;

/// Maximum topic length, in bytes.
pub const MAX_TOPIC_LEN: usize = 19;

/// Maximum display name length, in bytes.
pub const MAX_NAME_LEN: usize = 10;

/// Maximum chat message length, in bytes.
pub const MAX_MESSAGE_LEN: usize = 87;

/// Maximum number of concurrently registered chat rooms.
pub const MAX_SERVERS: usize = 5;

/// Default directory host.
pub const DEFAULT_DIRECTORY_HOST: &str = "127.0.0.1";

/// Default directory TCP port.
pub const DEFAULT_DIRECTORY_PORT: u16 = 41022;
