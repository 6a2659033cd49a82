//! Wire Protocol Implementation
//!
//! This module implements the framed binary protocol spoken between
//! FlashFTP clients and the server.
//!
//! ## Overview
//!
//! Every message travels as one frame: a 4-byte header (type and payload
//! length, both big-endian `u16`) followed by the payload. Payloads of the
//! file commands are small JSON objects.
//!
//! ## Modules
//!
//! - `message`: The `Message` value type and the message type catalog
//! - `codec`: Frame encoding and the incremental decode state machine
//! - `payload`: JSON request/response bodies
//!
//! ## Example
//!
//! ```
//! use flashftp::protocol::{encode, FrameDecoder, MessageType};
//!
//! let frame = encode(MessageType::Pwd.as_u16(), b"{}").unwrap();
//!
//! let mut decoder = FrameDecoder::new();
//! let messages = decoder.feed(&frame[..3]).unwrap();
//! assert!(messages.is_empty());
//!
//! let messages = decoder.feed(&frame[3..]).unwrap();
//! assert_eq!(messages[0].kind(), Some(MessageType::Pwd));
//! ```

pub mod codec;
pub mod message;
pub mod payload;

// Re-export commonly used types for convenience
pub use codec::{encode, encode_message, feed, DecodeState, FrameDecoder, FrameError, FrameLimits};
pub use message::{Message, MessageType, HEADER_LEN, MAX_PAYLOAD_LEN};
pub use payload::{Request, Response, ERROR_PREFIX};
