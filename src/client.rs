//! A minimal async client.
//!
//! Speaks the same framing as the server and is mainly used by the
//! integration tests and benchmarks.
//!
//! ```no_run
//! use flashftp::client::Client;
//! use flashftp::protocol::{MessageType, Request};
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let mut client = Client::connect("127.0.0.1:8080").await?;
//! let reply = client.request(MessageType::Pwd, &Request::new(MessageType::Pwd)).await?;
//! println!("{}", reply.data.unwrap_or_default());
//! # Ok(())
//! # }
//! ```

use crate::protocol::{encode, FrameDecoder, FrameError, Message, MessageType, Request, Response};
use std::collections::VecDeque;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, ToSocketAddrs};

/// Errors raised by [`Client`].
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Frame(#[from] FrameError),

    #[error("invalid payload: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("connection closed by server")]
    Closed,

    #[error("unexpected reply type {actual} (expected {expected})")]
    UnexpectedReply { expected: u16, actual: u16 },
}

/// A connection to a FlashFTP server.
pub struct Client {
    stream: TcpStream,
    decoder: FrameDecoder,
    pending: VecDeque<Message>,
    buffer: Vec<u8>,
}

impl Client {
    pub async fn connect(addr: impl ToSocketAddrs) -> Result<Self, ClientError> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        Ok(Self {
            stream,
            decoder: FrameDecoder::new(),
            pending: VecDeque::new(),
            buffer: vec![0u8; 16 * 1024],
        })
    }

    /// Sends a request frame.
    pub async fn send(&mut self, kind: MessageType, request: &Request) -> Result<(), ClientError> {
        let frame = encode(kind.as_u16(), &request.to_vec()?)?;
        self.send_raw(&frame).await
    }

    /// Writes arbitrary bytes to the socket.
    pub async fn send_raw(&mut self, bytes: &[u8]) -> Result<(), ClientError> {
        self.stream.write_all(bytes).await?;
        Ok(())
    }

    /// Waits for the next message from the server.
    pub async fn recv(&mut self) -> Result<Message, ClientError> {
        loop {
            if let Some(message) = self.pending.pop_front() {
                return Ok(message);
            }

            let n = self.stream.read(&mut self.buffer).await?;
            if n == 0 {
                return Err(ClientError::Closed);
            }
            self.pending.extend(self.decoder.feed(&self.buffer[..n])?);
        }
    }

    /// Sends a request and waits for its reply.
    pub async fn request(
        &mut self,
        kind: MessageType,
        request: &Request,
    ) -> Result<Response, ClientError> {
        self.send(kind, request).await?;
        let message = self.recv().await?;
        if message.msg_type != kind.as_u16() {
            return Err(ClientError::UnexpectedReply {
                expected: kind.as_u16(),
                actual: message.msg_type,
            });
        }
        Ok(Response::from_slice(&message.payload)?)
    }

    /// Waits until the server closes the connection, discarding anything
    /// still in flight.
    pub async fn wait_closed(&mut self) {
        while let Ok(n) = self.stream.read(&mut self.buffer).await {
            if n == 0 {
                break;
            }
        }
    }
}
