//! Incremental Frame Codec
//!
//! This module turns a TCP byte stream into discrete [`Message`]s and back.
//!
//! ## Design Philosophy
//!
//! 1. **Explicit State**: Decoding is a state machine over [`DecodeState`],
//!    either waiting for header bytes or for body bytes.
//! 2. **Incremental**: Reads may split a header, spread a body over many
//!    reads, or carry several frames at once. The decoder copes with all of
//!    these and emits the same messages no matter how the bytes were chunked.
//! 3. **Resumable**: [`feed`] is a pure function of `(state, bytes)`, so
//!    there is no hidden state between calls.
//!
//! ## How Decoding Works
//!
//! ```text
//!            4 header bytes present
//!   ┌─────────────────┐ ─────────────────────> ┌─────────────────┐
//!   │ AwaitingHeader  │                        │  AwaitingBody   │
//!   └─────────────────┘ <───────────────────── └─────────────────┘
//!            `len` body bytes present, emit one Message
//! ```
//!
//! A header that declares a type or length above the configured limits is
//! a protocol violation. The caller is expected to close the connection.

use crate::protocol::message::{Message, HEADER_LEN, MAX_PAYLOAD_LEN};
use bytes::{BufMut, Bytes, BytesMut};
use std::mem;
use thiserror::Error;

/// Default upper bound for an inbound type tag.
pub const DEFAULT_MAX_MESSAGE_TYPE: u16 = 2048;

/// Errors produced by the codec.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// The peer sent a header we refuse to process
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// A payload does not fit in the 16-bit length field
    #[error("frame too large: {size} bytes (max: {max})")]
    FrameTooLarge { size: usize, max: usize },
}

impl FrameError {
    /// Returns true if the error was caused by the remote peer.
    pub fn is_protocol_violation(&self) -> bool {
        matches!(self, FrameError::ProtocolViolation(_))
    }
}

/// Limits applied to inbound frame headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameLimits {
    /// Largest accepted payload length
    pub max_frame_size: usize,
    /// Largest accepted type tag
    pub max_message_type: u16,
}

impl Default for FrameLimits {
    fn default() -> Self {
        Self {
            max_frame_size: MAX_PAYLOAD_LEN,
            max_message_type: DEFAULT_MAX_MESSAGE_TYPE,
        }
    }
}

impl FrameLimits {
    fn check(&self, msg_type: u16, len: usize) -> Result<(), FrameError> {
        if msg_type > self.max_message_type {
            return Err(FrameError::ProtocolViolation(format!(
                "message type {} exceeds maximum {}",
                msg_type, self.max_message_type
            )));
        }
        if len > self.max_frame_size {
            return Err(FrameError::ProtocolViolation(format!(
                "declared length {} exceeds maximum frame size {}",
                len, self.max_frame_size
            )));
        }
        Ok(())
    }
}

/// Per-connection decode state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeState {
    /// Collecting the 4 header bytes. Holds 0..4 bytes.
    AwaitingHeader { header: BytesMut },

    /// Header parsed, collecting `len` body bytes.
    AwaitingBody {
        msg_type: u16,
        len: usize,
        body: BytesMut,
    },
}

impl DecodeState {
    /// The initial state of every connection.
    pub fn awaiting_header() -> Self {
        DecodeState::AwaitingHeader {
            header: BytesMut::with_capacity(HEADER_LEN),
        }
    }

    /// Number of bytes held for the frame currently being assembled.
    pub fn buffered(&self) -> usize {
        match self {
            DecodeState::AwaitingHeader { header } => header.len(),
            DecodeState::AwaitingBody { body, .. } => HEADER_LEN + body.len(),
        }
    }

    /// Returns true if no partial frame is held.
    pub fn is_idle(&self) -> bool {
        self.buffered() == 0
    }
}

impl Default for DecodeState {
    fn default() -> Self {
        Self::awaiting_header()
    }
}

/// Advances the decode state with newly read bytes.
///
/// Returns the next state and every message completed by `input`, in order.
/// On a protocol violation nothing is emitted, not even messages completed
/// earlier in the same call.
pub fn feed(
    mut state: DecodeState,
    limits: &FrameLimits,
    mut input: &[u8],
) -> Result<(DecodeState, Vec<Message>), FrameError> {
    let mut messages = Vec::new();

    loop {
        state = match state {
            DecodeState::AwaitingHeader { mut header } => {
                let take = (HEADER_LEN - header.len()).min(input.len());
                header.extend_from_slice(&input[..take]);
                input = &input[take..];

                if header.len() < HEADER_LEN {
                    return Ok((DecodeState::AwaitingHeader { header }, messages));
                }

                let msg_type = u16::from_be_bytes([header[0], header[1]]);
                let len = u16::from_be_bytes([header[2], header[3]]) as usize;
                limits.check(msg_type, len)?;

                DecodeState::AwaitingBody {
                    msg_type,
                    len,
                    body: BytesMut::with_capacity(len),
                }
            }

            DecodeState::AwaitingBody {
                msg_type,
                len,
                mut body,
            } => {
                let take = (len - body.len()).min(input.len());
                body.extend_from_slice(&input[..take]);
                input = &input[take..];

                if body.len() < len {
                    return Ok((DecodeState::AwaitingBody { msg_type, len, body }, messages));
                }

                messages.push(Message {
                    msg_type,
                    payload: body.freeze(),
                });
                DecodeState::awaiting_header()
            }
        };
    }
}

/// Stateful wrapper around [`feed`] owned by one connection.
///
/// Once a violation has been reported the decoder stays failed and every
/// later call returns the same error.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    state: DecodeState,
    limits: FrameLimits,
    failed: Option<FrameError>,
}

impl FrameDecoder {
    /// Creates a decoder with default limits.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a decoder with custom limits.
    pub fn with_limits(limits: FrameLimits) -> Self {
        Self {
            state: DecodeState::default(),
            limits,
            failed: None,
        }
    }

    /// Feeds newly read bytes and returns every completed message.
    pub fn feed(&mut self, data: &[u8]) -> Result<Vec<Message>, FrameError> {
        if let Some(err) = &self.failed {
            return Err(err.clone());
        }

        let state = mem::take(&mut self.state);
        match feed(state, &self.limits, data) {
            Ok((next, messages)) => {
                self.state = next;
                Ok(messages)
            }
            Err(err) => {
                self.failed = Some(err.clone());
                Err(err)
            }
        }
    }

    /// Returns the current decode state.
    pub fn state(&self) -> &DecodeState {
        &self.state
    }

    /// Returns true if a frame has been started but not finished.
    pub fn is_mid_frame(&self) -> bool {
        !self.state.is_idle()
    }

    /// Returns the limits this decoder enforces.
    pub fn limits(&self) -> &FrameLimits {
        &self.limits
    }
}

/// Encodes a frame: type, payload length, payload.
pub fn encode(msg_type: u16, payload: &[u8]) -> Result<Bytes, FrameError> {
    let mut buf = BytesMut::with_capacity(HEADER_LEN + payload.len());
    encode_into(msg_type, payload, &mut buf)?;
    Ok(buf.freeze())
}

/// Encodes a frame into an existing buffer.
pub fn encode_into(msg_type: u16, payload: &[u8], buf: &mut BytesMut) -> Result<(), FrameError> {
    if payload.len() > MAX_PAYLOAD_LEN {
        return Err(FrameError::FrameTooLarge {
            size: payload.len(),
            max: MAX_PAYLOAD_LEN,
        });
    }

    buf.reserve(HEADER_LEN + payload.len());
    buf.put_u16(msg_type);
    buf.put_u16(payload.len() as u16);
    buf.extend_from_slice(payload);
    Ok(())
}

/// Encodes a whole [`Message`].
pub fn encode_message(message: &Message) -> Result<Bytes, FrameError> {
    encode(message.msg_type, &message.payload)
}
