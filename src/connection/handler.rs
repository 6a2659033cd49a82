//! Connection Handler Module
//!
//! This module drives the socket of one client connection. Each connection
//! gets a reader (the task running [`handle_connection`]) and a writer task,
//! both pinned to the I/O loop the connection was assigned to.
//!
//! ## Connection Lifecycle
//!
//! ```text
//! 1. Client connects, session registered
//!        │
//!        ▼
//! 2. Reader and writer started
//!        │
//!        ▼
//! 3. ┌─────────────────────────────┐     ┌──────────────────────────────┐
//!    │ Reader                      │     │ Writer                       │
//!    │                             │     │                              │
//!    │  read bytes from socket     │     │  wait for "write needed"     │
//!    │           │                 │     │           │                  │
//!    │           ▼                 │     │           ▼                  │
//!    │  feed frame decoder         │     │  write head frame            │
//!    │           │                 │     │           │                  │
//!    │           ▼                 │     │           ▼                  │
//!    │  post messages to dispatch  │     │  complete_head, repeat       │
//!    └─────────────────────────────┘     └──────────────────────────────┘
//!        │
//!        ▼
//! 4. EOF / error / protocol violation / explicit close
//!        │
//!        ▼
//! 5. Session closed once, both tasks end
//! ```
//!
//! ## Buffer Management
//!
//! Reads land in a `BytesMut` that is handed to the decoder and cleared after
//! every read. Partial frames live in the decoder state, not in the read
//! buffer, so the buffer never grows beyond one read.

use crate::connection::session::{CloseReason, Session};
use crate::connection::stats::ConnectionStats;
use crate::dispatch::{Dispatcher, WorkItem};
use crate::protocol::{FrameDecoder, FrameError, FrameLimits};
use bytes::BytesMut;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tracing::{debug, info, trace, warn};

/// Read buffer capacity
const READ_BUFFER_SIZE: usize = 8 * 1024;

/// Handles the read side of a single client connection.
pub struct ConnectionHandler {
    /// Read half of the socket
    reader: OwnedReadHalf,

    /// The session this connection belongs to
    session: Arc<Session>,

    /// Buffer for incoming data
    buffer: BytesMut,

    /// Incremental frame decoder
    decoder: FrameDecoder,

    /// Where decoded messages go
    dispatcher: Arc<Dispatcher>,

    /// Flips to true when the session is closed from anywhere
    closed: watch::Receiver<bool>,

    /// Flips to true when the server stops taking requests
    read_stop: watch::Receiver<bool>,

    /// Connection statistics (shared)
    stats: Arc<ConnectionStats>,
}

impl ConnectionHandler {
    /// Creates the read side for a connection.
    pub fn new(
        reader: OwnedReadHalf,
        session: Arc<Session>,
        dispatcher: Arc<Dispatcher>,
        limits: FrameLimits,
        stats: Arc<ConnectionStats>,
    ) -> Self {
        let closed = session.subscribe_close();
        let read_stop = session.subscribe_read_stop();
        Self {
            reader,
            session,
            buffer: BytesMut::with_capacity(READ_BUFFER_SIZE),
            decoder: FrameDecoder::with_limits(limits),
            dispatcher,
            closed,
            read_stop,
            stats,
        }
    }

    /// Reads until the connection ends, then closes the session.
    pub async fn run(mut self) -> Result<(), ConnectionError> {
        let session = Arc::clone(&self.session);
        let result = self.read_loop().await;

        match &result {
            // Closed or stopped from elsewhere (writer, EXIT, shutdown)
            Ok(()) => {}
            Err(ConnectionError::ClientDisconnected) => {
                session.close(CloseReason::PeerClosed);
            }
            Err(ConnectionError::UnexpectedEof) => {
                debug!(session = %session.id(), "Client disconnected mid-frame");
                session.close(CloseReason::PeerClosed);
            }
            Err(ConnectionError::Io(io_err))
                if io_err.kind() == std::io::ErrorKind::ConnectionReset =>
            {
                debug!(session = %session.id(), "Connection reset by client");
                session.close(CloseReason::ReadError);
            }
            Err(ConnectionError::Io(e)) => {
                warn!(session = %session.id(), error = %e, "Read error");
                session.close(CloseReason::ReadError);
            }
            Err(ConnectionError::Protocol(e)) => {
                warn!(session = %session.id(), peer = %session.peer(), error = %e, "Protocol violation");
                self.stats.protocol_violation();
                session.close(CloseReason::ProtocolViolation);
            }
            Err(ConnectionError::DispatcherStopped) => {
                session.close(CloseReason::ServerShutdown);
            }
        }

        result
    }

    async fn read_loop(&mut self) -> Result<(), ConnectionError> {
        loop {
            if self.session.is_closed() || self.session.is_reading_stopped() {
                return Ok(());
            }

            self.buffer.clear();
            let n = tokio::select! {
                read = self.reader.read_buf(&mut self.buffer) => read?,
                _ = self.closed.changed() => return Ok(()),
                _ = self.read_stop.changed() => return Ok(()),
            };

            if n == 0 {
                return if self.decoder.is_mid_frame() {
                    Err(ConnectionError::UnexpectedEof)
                } else {
                    Err(ConnectionError::ClientDisconnected)
                };
            }

            self.stats.bytes_read(n);
            trace!(session = %self.session.id(), bytes = n, "Read data");

            for message in self.decoder.feed(&self.buffer)? {
                trace!(session = %self.session.id(), %message, "Decoded message");
                self.stats.message_received();
                self.dispatcher
                    .post(WorkItem::new(Arc::clone(&self.session), message))
                    .map_err(|_| ConnectionError::DispatcherStopped)?;
            }
        }
    }
}

/// Drains the session's send queue onto the socket.
///
/// Exactly one frame is written at a time, always the queue head. The task
/// ends when the session closes, either because a write failed or because
/// a requested close-after-flush found the queue empty. A write still
/// pending when the session closes is abandoned.
pub async fn write_loop<W>(mut writer: W, session: Arc<Session>, stats: Arc<ConnectionStats>)
where
    W: AsyncWrite + Unpin,
{
    let mut closed = session.subscribe_close();

    'outer: loop {
        let mut next = session.send_queue().front();
        while let Some(frame) = next {
            let written = tokio::select! {
                result = writer.write_all(&frame) => result,
                _ = closed.changed() => break 'outer,
            };
            if let Err(e) = written {
                debug!(session = %session.id(), error = %e, "Write failed");
                session.close(CloseReason::WriteError);
                break 'outer;
            }
            stats.bytes_written(frame.len());
            trace!(session = %session.id(), bytes = frame.len(), "Sent frame");
            next = session.send_queue().complete_head();
        }

        if session.is_closed() {
            break;
        }
        if let Some(reason) = session.close_requested() {
            if session.send_queue().is_empty() {
                session.close(reason);
                break;
            }
        }

        tokio::select! {
            _ = session.write_ready().notified() => {}
            _ = closed.changed() => break,
        }
    }

    let _ = writer.shutdown().await;
}

/// Errors that end a connection.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// I/O error (network issue)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The peer broke the framing rules
    #[error("protocol error: {0}")]
    Protocol(#[from] FrameError),

    /// Client disconnected between frames
    #[error("Client disconnected")]
    ClientDisconnected,

    /// Client disconnected in the middle of a frame
    #[error("Unexpected end of stream")]
    UnexpectedEof,

    /// The dispatcher no longer accepts work
    #[error("Dispatcher stopped")]
    DispatcherStopped,
}

/// Serves a client connection until it closes.
///
/// Spawns the writer on the current runtime, runs the reader in place, and
/// waits for the writer to finish before returning.
pub async fn handle_connection(
    stream: TcpStream,
    session: Arc<Session>,
    dispatcher: Arc<Dispatcher>,
    limits: FrameLimits,
    stats: Arc<ConnectionStats>,
) {
    info!(session = %session.id(), peer = %session.peer(), "Client connected");

    let (reader, writer) = stream.into_split();
    let writer_task = tokio::spawn(write_loop(
        writer,
        Arc::clone(&session),
        Arc::clone(&stats),
    ));

    let handler = ConnectionHandler::new(reader, Arc::clone(&session), dispatcher, limits, stats);
    if let Err(e) = handler.run().await {
        match e {
            ConnectionError::ClientDisconnected => {}
            _ => debug!(session = %session.id(), error = %e, "Connection ended with error"),
        }
    }

    // A stopped reader leaves the session open so the writer can flush the
    // remaining replies. Otherwise the writer only exits once it is closed.
    if !session.is_reading_stopped() {
        session.close(CloseReason::PeerClosed);
    }
    let _ = writer_task.await;

    info!(session = %session.id(), "Client disconnected");
}
