//! Chat room messages.
//!
//! Clients send free text: their first frame is the display name they want,
//! every later frame is a chat message. Everything the room says back is a
//! [`Notice`].

use std::fmt;

use chatdir_core::truncate_bytes;

use crate::framing::Frame;
use crate::{MAX_MESSAGE_LEN, MAX_NAME_LEN};

/// Text generated by a chat room.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notice<'a> {
    /// Sent to every new connection.
    Prompt,
    /// The requested name was empty.
    EmptyName,
    /// Another member already uses the requested name.
    NameTaken,
    /// The requested name was cut to the given one.
    NameTruncated(&'a str),
    /// Sent to the first member who ever names themselves.
    FirstMember,
    /// Sent once a member is named.
    Welcome,
    /// Someone joined.
    Joined(&'a str),
    /// Someone left.
    Left(&'a str),
    /// The sender's message was cut; carries what was kept.
    Truncated(&'a str),
    /// A chat line relayed to the other members.
    Message { name: &'a str, text: &'a str },
}

impl Notice<'_> {
    pub fn to_frame(&self) -> Frame {
        Frame::from_text(&self.to_string())
    }
}

impl fmt::Display for Notice<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Prompt => write!(f, "Please input a username (max ten chars):"),
            Self::EmptyName => {
                write!(f, "An empty username is invalid, please enter a new name:")
            }
            Self::NameTaken => {
                write!(f, "That username is already taken, please enter a new name:")
            }
            Self::NameTruncated(name) => write!(f, "Your name was truncated to {name}"),
            Self::FirstMember => write!(f, "You are the first user to join the chat"),
            Self::Welcome => write!(
                f,
                "You may now begin chatting (max message length is {MAX_MESSAGE_LEN} chars)"
            ),
            Self::Joined(name) => write!(f, "{name} has joined the chat"),
            Self::Left(name) => write!(f, "{name} has left the chat"),
            Self::Truncated(text) => write!(f, "Truncated: {text}"),
            Self::Message { name, text } => write!(f, "{name}: {text}"),
        }
    }
}

/// Cuts a requested display name to [`MAX_NAME_LEN`] bytes.
pub fn truncate_name(name: &str) -> (&str, bool) {
    truncate_bytes(name, MAX_NAME_LEN)
}

/// Cuts a chat message to [`MAX_MESSAGE_LEN`] bytes.
pub fn truncate_message(text: &str) -> (&str, bool) {
    truncate_bytes(text, MAX_MESSAGE_LEN)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MAX_TEXT_LEN;

    #[test]
    fn notices_render() {
        insta::assert_snapshot!(Notice::Prompt, @"Please input a username (max ten chars):");
        insta::assert_snapshot!(Notice::Joined("alice"), @"alice has joined the chat");
        insta::assert_snapshot!(Notice::Left("bob"), @"bob has left the chat");
        insta::assert_snapshot!(
            Notice::Message { name: "alice", text: "hi all" },
            @"alice: hi all"
        );
        insta::assert_snapshot!(
            Notice::Welcome,
            @"You may now begin chatting (max message length is 87 chars)"
        );
    }

    #[test]
    fn name_truncation() {
        assert_eq!(truncate_name("VeryLongName12"), ("VeryLongNa", true));
        assert_eq!(truncate_name("bob"), ("bob", false));
    }

    #[test]
    fn message_truncation() {
        let long = "m".repeat(120);
        let (kept, cut) = truncate_message(&long);
        assert!(cut);
        assert_eq!(kept.len(), MAX_MESSAGE_LEN);
    }

    #[test]
    fn longest_broadcast_fits_one_frame() {
        let name = "n".repeat(MAX_NAME_LEN);
        let text = "t".repeat(MAX_MESSAGE_LEN);
        let frame = Notice::Message {
            name: &name,
            text: &text,
        }
        .to_frame();
        // name + ": " + message
        assert_eq!(frame.payload().len(), MAX_NAME_LEN + 2 + MAX_MESSAGE_LEN);
        assert!(frame.payload().len() <= MAX_TEXT_LEN);
    }
}
