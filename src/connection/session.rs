//! Per-connection session state.
//!
//! A [`Session`] is shared between the connection's I/O tasks, the session
//! registry and any dispatch work items still waiting to run. It owns the
//! outbound queue, the working directory used for path resolution, and the
//! close guard that makes teardown happen exactly once.
//!
//! ## Lifecycle
//!
//! ```text
//! accept ──> Connected ──(read error | write error | protocol violation
//!                         | explicit close | peer closed)──> Closed
//! ```
//!
//! `Closed` is terminal. The first call to [`Session::close`] discards the
//! send queue, wakes the I/O tasks and removes the session from the
//! registry; later calls do nothing.

use crate::connection::registry::SessionRegistry;
use crate::connection::send_queue::{Enqueued, SendQueue, DEFAULT_MAX_SEND_QUEUE};
use crate::connection::stats::ConnectionStats;
use crate::protocol::{codec, FrameError, Message};
use bytes::Bytes;
use parking_lot::Mutex;
use std::fmt;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::{watch, Notify};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Opaque unique identity of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(Uuid);

impl SessionId {
    /// Generates a fresh random id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Why a session was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// The peer closed its end of the socket
    PeerClosed,
    /// Reading from the socket failed
    ReadError,
    /// Writing to the socket failed
    WriteError,
    /// The peer sent a header outside the configured limits
    ProtocolViolation,
    /// The session asked to be closed (EXIT)
    ExplicitClose,
    /// The server is shutting down
    ServerShutdown,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CloseReason::PeerClosed => "peer closed",
            CloseReason::ReadError => "read error",
            CloseReason::WriteError => "write error",
            CloseReason::ProtocolViolation => "protocol violation",
            CloseReason::ExplicitClose => "explicit close",
            CloseReason::ServerShutdown => "server shutdown",
        };
        f.write_str(s)
    }
}

/// Settings applied to every new session.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// Maximum number of queued outbound frames
    pub max_send_queue: usize,
    /// Initial virtual working directory
    pub start_dir: String,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            max_send_queue: DEFAULT_MAX_SEND_QUEUE,
            start_dir: "/".to_string(),
        }
    }
}

/// Server-side state for one client connection.
pub struct Session {
    id: SessionId,
    peer: SocketAddr,
    send_queue: SendQueue,
    /// Wakes the writer task when the queue goes from empty to non-empty
    write_ready: Notify,
    /// Virtual working directory, always absolute
    cwd: Mutex<String>,
    closed: AtomicBool,
    /// Set when the writer should close the session once the queue drains
    flush_then_close: Mutex<Option<CloseReason>>,
    close_signal: watch::Sender<bool>,
    /// Tells the reader to stop taking new requests
    read_stop: watch::Sender<bool>,
    registry: Weak<SessionRegistry>,
    stats: Arc<ConnectionStats>,
}

impl Session {
    /// Creates a session for a freshly accepted connection.
    pub fn new(
        peer: SocketAddr,
        settings: &SessionSettings,
        registry: Weak<SessionRegistry>,
        stats: Arc<ConnectionStats>,
    ) -> Arc<Self> {
        stats.connection_opened();
        let (close_signal, _) = watch::channel(false);
        let (read_stop, _) = watch::channel(false);

        Arc::new(Self {
            id: SessionId::new(),
            peer,
            send_queue: SendQueue::new(settings.max_send_queue),
            write_ready: Notify::new(),
            cwd: Mutex::new(settings.start_dir.clone()),
            closed: AtomicBool::new(false),
            flush_then_close: Mutex::new(None),
            close_signal,
            read_stop,
            registry,
            stats,
        })
    }

    /// Creates a session with no socket and no registry.
    ///
    /// Frames sent to it stay in its queue, which makes it handy for
    /// exercising handlers directly.
    pub fn detached(settings: &SessionSettings) -> Arc<Self> {
        Self::new(
            SocketAddr::from((Ipv4Addr::LOCALHOST, 0)),
            settings,
            Weak::new(),
            Arc::new(ConnectionStats::new()),
        )
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// The current virtual working directory.
    pub fn cwd(&self) -> String {
        self.cwd.lock().clone()
    }

    pub fn set_cwd(&self, path: impl Into<String>) {
        *self.cwd.lock() = path.into();
    }

    /// Encodes and queues a message for this connection.
    ///
    /// Sending to a closed session is not an error; the frame is discarded
    /// and `Enqueued::Closed` is returned.
    pub fn send(&self, msg_type: u16, payload: &[u8]) -> Result<Enqueued, FrameError> {
        let frame = codec::encode(msg_type, payload)?;
        Ok(self.push_frame(frame))
    }

    /// Encodes and queues a [`Message`].
    pub fn send_message(&self, message: &Message) -> Result<Enqueued, FrameError> {
        self.send(message.msg_type, &message.payload)
    }

    /// Queues an already encoded frame.
    pub fn push_frame(&self, frame: Bytes) -> Enqueued {
        let outcome = self.send_queue.push(frame);
        match outcome {
            Enqueued::WriteNeeded => {
                self.stats.frame_queued();
                self.write_ready.notify_one();
            }
            Enqueued::Pending => self.stats.frame_queued(),
            Enqueued::Dropped => {
                self.stats.frame_dropped();
                warn!(
                    session = %self.id,
                    max = self.send_queue.max_depth(),
                    "Send queue full, dropping frame"
                );
            }
            Enqueued::Closed => {
                debug!(session = %self.id, "Send to closed session ignored");
            }
        }
        outcome
    }

    pub fn send_queue(&self) -> &SendQueue {
        &self.send_queue
    }

    pub(crate) fn write_ready(&self) -> &Notify {
        &self.write_ready
    }

    /// Returns a receiver that flips to `true` when the session closes.
    pub fn subscribe_close(&self) -> watch::Receiver<bool> {
        self.close_signal.subscribe()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Asks the writer to close the session once every queued frame is sent.
    ///
    /// The first requested reason is kept.
    pub fn close_after_flush(&self, reason: CloseReason) {
        self.flush_then_close.lock().get_or_insert(reason);
        self.write_ready.notify_one();
    }

    /// The reason passed to [`Session::close_after_flush`], if any.
    pub fn close_requested(&self) -> Option<CloseReason> {
        *self.flush_then_close.lock()
    }

    /// Stops the reader from taking new requests without closing the
    /// session, so replies to work already posted can still be written.
    pub fn stop_reading(&self) {
        self.read_stop.send_replace(true);
    }

    pub fn is_reading_stopped(&self) -> bool {
        *self.read_stop.borrow()
    }

    /// Returns a receiver that flips to `true` when reading is stopped.
    pub fn subscribe_read_stop(&self) -> watch::Receiver<bool> {
        self.read_stop.subscribe()
    }

    /// Closes the session.
    ///
    /// Returns `true` for the call that actually closed it and `false` for
    /// every later call.
    pub fn close(&self, reason: CloseReason) -> bool {
        if self.closed.swap(true, Ordering::AcqRel) {
            return false;
        }

        let discarded = self.send_queue.close();
        self.close_signal.send_replace(true);

        if let Some(registry) = self.registry.upgrade() {
            registry.remove(&self.id);
        }
        self.stats.connection_closed();

        info!(
            session = %self.id,
            peer = %self.peer,
            reason = %reason,
            discarded,
            "Session closed"
        );
        true
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("peer", &self.peer)
            .field("cwd", &self.cwd())
            .field("queued", &self.send_queue.len())
            .field("closed", &self.is_closed())
            .finish()
    }
}
