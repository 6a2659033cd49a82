//! Message Types
//!
//! This module defines the logical unit exchanged between client and server
//! once a frame has been fully reassembled, plus the catalog of message
//! types the server understands.
//!
//! ## Wire Frame
//!
//! ```text
//! ┌──────────────┬──────────────┬─────────────────────────┐
//! │ type (u16BE) │ len (u16BE)  │ payload (len bytes)     │
//! └──────────────┴──────────────┴─────────────────────────┘
//!       2 bytes        2 bytes
//! ```
//!
//! There is no terminator. Framing is purely length-prefixed.

use bytes::Bytes;
use std::fmt;

/// Size of the frame header in bytes.
pub const HEADER_LEN: usize = 4;

/// Largest payload a frame header can describe.
pub const MAX_PAYLOAD_LEN: usize = u16::MAX as usize;

/// The message types understood by the file commands.
///
/// Values are part of the wire protocol and must stay stable between
/// client and server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum MessageType {
    Hello = 1001,
    Mkdir = 1002,
    Rmdir = 1003,
    List = 1004,
    Upload = 1005,
    Download = 1006,
    Cd = 1007,
    Pwd = 1008,
    Cat = 1009,
    Exit = 1010,
}

impl MessageType {
    /// Every known message type, in catalog order.
    pub const ALL: [MessageType; 10] = [
        MessageType::Hello,
        MessageType::Mkdir,
        MessageType::Rmdir,
        MessageType::List,
        MessageType::Upload,
        MessageType::Download,
        MessageType::Cd,
        MessageType::Pwd,
        MessageType::Cat,
        MessageType::Exit,
    ];

    /// Returns the wire value of this type.
    #[inline]
    pub fn as_u16(self) -> u16 {
        self as u16
    }

    /// Looks up a message type by its wire value.
    pub fn from_u16(value: u16) -> Option<Self> {
        Self::ALL.iter().copied().find(|t| t.as_u16() == value)
    }

    /// Human-readable command name, used in logs.
    pub fn name(self) -> &'static str {
        match self {
            MessageType::Hello => "HELLO",
            MessageType::Mkdir => "MKDIR",
            MessageType::Rmdir => "RMDIR",
            MessageType::List => "LIST",
            MessageType::Upload => "UPLOAD",
            MessageType::Download => "DOWNLOAD",
            MessageType::Cd => "CD",
            MessageType::Pwd => "PWD",
            MessageType::Cat => "CAT",
            MessageType::Exit => "EXIT",
        }
    }
}

impl From<MessageType> for u16 {
    fn from(value: MessageType) -> Self {
        value.as_u16()
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name(), self.as_u16())
    }
}

/// A decoded message: a type tag plus its payload bytes.
///
/// The type is kept as a raw `u16` so that unknown types survive decoding
/// and can be dropped by the dispatcher instead of the codec.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// The type tag from the frame header
    pub msg_type: u16,
    /// The payload bytes, exactly as they appeared on the wire
    pub payload: Bytes,
}

impl Message {
    /// Creates a new message.
    pub fn new(msg_type: impl Into<u16>, payload: impl Into<Bytes>) -> Self {
        Self {
            msg_type: msg_type.into(),
            payload: payload.into(),
        }
    }

    /// Returns the known message type, if any.
    pub fn kind(&self) -> Option<MessageType> {
        MessageType::from_u16(self.msg_type)
    }

    /// Total size of this message once framed.
    pub fn frame_len(&self) -> usize {
        HEADER_LEN + self.payload.len()
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind() {
            Some(kind) => write!(f, "{} ({} bytes)", kind, self.payload.len()),
            None => write!(f, "type {} ({} bytes)", self.msg_type, self.payload.len()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_is_sequential() {
        for (i, kind) in MessageType::ALL.iter().enumerate() {
            assert_eq!(kind.as_u16(), 1001 + i as u16);
        }
    }

    #[test]
    fn test_from_u16() {
        assert_eq!(MessageType::from_u16(1004), Some(MessageType::List));
        assert_eq!(MessageType::from_u16(1010), Some(MessageType::Exit));
        assert_eq!(MessageType::from_u16(1000), None);
        assert_eq!(MessageType::from_u16(1011), None);
    }

    #[test]
    fn test_message_kind() {
        let msg = Message::new(MessageType::Pwd, Bytes::new());
        assert_eq!(msg.kind(), Some(MessageType::Pwd));
        assert_eq!(msg.frame_len(), HEADER_LEN);

        let unknown = Message::new(42u16, Bytes::from_static(b"x"));
        assert_eq!(unknown.kind(), None);
        assert_eq!(unknown.to_string(), "type 42 (1 bytes)");
    }
}
