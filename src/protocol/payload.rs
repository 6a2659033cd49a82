//! Request and response payloads.
//!
//! Frame payloads for the file commands are JSON objects. Every object
//! carries `msg_id`, which must match the frame type; the remaining fields
//! depend on the command.

use crate::protocol::message::MessageType;
use serde::{Deserialize, Serialize};

/// Prefix of every error reply's `data` field.
pub const ERROR_PREFIX: &str = "Exception occurred: ";

/// A client request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    pub msg_id: u16,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    /// Free-form text (HELLO)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,

    /// Base64 file content (UPLOAD)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,

    #[serde(default)]
    pub compress: bool,

    #[serde(default)]
    pub original_size: u64,
}

impl Request {
    /// Creates an empty request of the given type.
    pub fn new(kind: MessageType) -> Self {
        Self {
            msg_id: kind.as_u16(),
            ..Self::default()
        }
    }

    /// Sets the `path` field.
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Sets the `data` field.
    pub fn with_data(mut self, data: impl Into<String>) -> Self {
        self.data = Some(data.into());
        self
    }

    /// Sets the transfer fields used by UPLOAD and DOWNLOAD.
    pub fn with_content(mut self, content: impl Into<String>, compress: bool, original_size: u64) -> Self {
        self.content = Some(content.into());
        self.compress = compress;
        self.original_size = original_size;
        self
    }

    /// Requests a compressed DOWNLOAD.
    pub fn compressed(mut self) -> Self {
        self.compress = true;
        self
    }

    /// Parses a request from a frame payload.
    pub fn from_slice(payload: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(payload)
    }

    /// Serializes the request into a frame payload.
    pub fn to_vec(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }
}

/// A server reply.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    pub msg_id: u16,

    /// Human-readable status or result text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,

    /// File content (CAT: text, DOWNLOAD: base64)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compress: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_size: Option<u64>,
}

impl Response {
    /// Creates a reply carrying a `data` string.
    pub fn data(kind: MessageType, data: impl Into<String>) -> Self {
        Self {
            msg_id: kind.as_u16(),
            data: Some(data.into()),
            ..Self::default()
        }
    }

    /// Creates a reply carrying file content.
    pub fn content(kind: MessageType, content: impl Into<String>) -> Self {
        Self {
            msg_id: kind.as_u16(),
            content: Some(content.into()),
            ..Self::default()
        }
    }

    /// Creates an error reply for a failed command.
    pub fn error(msg_type: u16, error: impl std::fmt::Display) -> Self {
        Self {
            msg_id: msg_type,
            data: Some(format!("{}{}", ERROR_PREFIX, error)),
            ..Self::default()
        }
    }

    /// Returns true if this reply reports a failure.
    pub fn is_error(&self) -> bool {
        self.data
            .as_deref()
            .map(|d| d.starts_with(ERROR_PREFIX))
            .unwrap_or(false)
    }

    /// Parses a reply from a frame payload.
    pub fn from_slice(payload: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(payload)
    }

    /// Serializes the reply into a frame payload.
    pub fn to_vec(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }
}
