//! Directory service messages.
//!
//! A chat room registers with `s<topic>; <port>` and keeps the connection
//! open. A client lists topics with `cl` and resolves one with
//! `cr<topic>`, getting back `<ip_u32>;<port>`.

use std::fmt;
use std::net::{Ipv4Addr, SocketAddrV4};

use crate::error::{ProtocolError, ProtocolResult};
use crate::framing::Frame;
use crate::{MAX_TEXT_LEN, MAX_TOPIC_LEN};

const TOPIC_SEPARATOR: char = ',';

/// A validated chat room topic.
///
/// Non-empty, at most [`MAX_TOPIC_LEN`] bytes, and free of the `,` and `;`
/// separators used by the directory grammar.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Topic(String);

impl Topic {
    /// Validates and wraps a topic.
    pub fn new(topic: impl Into<String>) -> ProtocolResult<Self> {
        let topic = topic.into();
        let reason = if topic.is_empty() {
            Some("empty")
        } else if topic.len() > MAX_TOPIC_LEN {
            Some("too long")
        } else if topic.contains([',', ';']) {
            Some("contains ',' or ';'")
        } else if topic.contains(['\0', '\n']) {
            Some("contains a control character")
        } else {
            None
        };
        match reason {
            Some(reason) => Err(ProtocolError::InvalidTopic { topic, reason }),
            None => Ok(Self(topic)),
        }
    }

    /// The topic text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Topic {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A request received by the directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirectoryRequest {
    /// `s<topic>; <port>`: a chat room announces itself.
    Register { topic: Topic, port: u16 },
    /// `cl`: list registered topics.
    List,
    /// `cr<topic>`: resolve a topic to its room endpoint.
    Lookup { topic: Topic },
}

impl DirectoryRequest {
    /// Parses a directory request frame.
    pub fn parse(frame: &Frame) -> ProtocolResult<Self> {
        if frame.is_empty() {
            return Err(ProtocolError::EmptyFrame);
        }
        let text = frame.text();

        if let Some(rest) = text.strip_prefix("cr") {
            // Clients send whatever they typed, newline included.
            let topic = rest.split('\n').next().unwrap_or_default();
            let topic = topic.strip_suffix('\r').unwrap_or(topic);
            return Ok(Self::Lookup {
                topic: Topic::new(topic)?,
            });
        }

        if text == "cl" {
            return Ok(Self::List);
        }

        if let Some(rest) = text.strip_prefix('s') {
            let Some((topic, port)) = rest.split_once(';') else {
                return Err(ProtocolError::UnknownCommand(text.to_string()));
            };
            let topic = Topic::new(topic)?;
            let port = port
                .trim()
                .parse::<u16>()
                .map_err(|_| ProtocolError::InvalidPort(port.to_string()))?;
            return Ok(Self::Register { topic, port });
        }

        Err(ProtocolError::UnknownCommand(text.into_owned()))
    }

    /// Encodes the request as a frame.
    pub fn to_frame(&self) -> Frame {
        match self {
            Self::Register { topic, port } => Frame::from_text(&format!("s{topic}; {port}")),
            Self::List => Frame::from_text("cl"),
            Self::Lookup { topic } => Frame::from_text(&format!("cr{topic}")),
        }
    }
}

/// Encodes a comma-joined topic list into one frame.
///
/// Topics are appended in order until the next one (plus its separator)
/// would not fit in the frame; the rest are left out.
pub fn encode_topic_list<'a, I>(topics: I) -> Frame
where
    I: IntoIterator<Item = &'a str>,
{
    let mut list = String::with_capacity(MAX_TEXT_LEN);
    for topic in topics {
        let needed = if list.is_empty() {
            topic.len()
        } else {
            topic.len() + TOPIC_SEPARATOR.len_utf8()
        };
        if list.len() + needed > MAX_TEXT_LEN {
            break;
        }
        if !list.is_empty() {
            list.push(TOPIC_SEPARATOR);
        }
        list.push_str(topic);
    }
    Frame::from_text(&list)
}

/// Splits a topic list frame back into topics.
pub fn decode_topic_list(frame: &Frame) -> Vec<String> {
    frame
        .text()
        .split(TOPIC_SEPARATOR)
        .filter(|topic| !topic.is_empty())
        .map(str::to_string)
        .collect()
}

/// Where a registered chat room can be reached.
///
/// On the wire the address is the decimal value of the IPv4 address read
/// as a big-endian `u32` (`127.0.0.1` is `2130706433`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoomEndpoint {
    pub ip: Ipv4Addr,
    pub port: u16,
}

impl RoomEndpoint {
    pub fn new(ip: Ipv4Addr, port: u16) -> Self {
        Self { ip, port }
    }

    /// Encodes the `<ip_u32>;<port>` lookup reply.
    pub fn to_frame(&self) -> Frame {
        Frame::from_text(&format!("{};{}", u32::from(self.ip), self.port))
    }

    /// Parses a `<ip_u32>;<port>` lookup reply.
    pub fn parse(frame: &Frame) -> ProtocolResult<Self> {
        let text = frame.text();
        let malformed = || ProtocolError::MalformedReply(text.to_string());
        let (ip, port) = text.split_once(';').ok_or_else(malformed)?;
        let ip = ip.trim().parse::<u32>().map_err(|_| malformed())?;
        let port = port.trim().parse::<u16>().map_err(|_| malformed())?;
        Ok(Self::new(Ipv4Addr::from(ip), port))
    }

    pub fn socket_addr(&self) -> SocketAddrV4 {
        SocketAddrV4::new(self.ip, self.port)
    }
}

impl fmt::Display for RoomEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.ip, self.port)
    }
}
