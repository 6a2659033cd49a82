//! Per-connection outbound queue.
//!
//! Frames are written to the socket strictly in the order they were pushed,
//! one at a time. The queue itself never touches the socket: `push` tells
//! the caller whether a write has to be started, and `complete_head` hands
//! back the next frame once the previous write finished.
//!
//! ```text
//!  push(F3) ──> [ F1 (in flight) | F2 | F3 ] ──> complete_head() -> Some(F2)
//! ```
//!
//! The queue is bounded. Frames pushed while it is full are dropped rather
//! than blocking the producer, which is the dispatch worker.

use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::VecDeque;

/// Default maximum number of queued frames per connection.
pub const DEFAULT_MAX_SEND_QUEUE: usize = 1000;

/// Result of pushing a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Enqueued {
    /// The queue was empty; the caller must start writing the new head.
    WriteNeeded,
    /// A write is already in flight and will pick the frame up.
    Pending,
    /// The queue is full and the frame was discarded.
    Dropped,
    /// The connection is closed and the frame was discarded.
    Closed,
}

#[derive(Debug, Default)]
struct Inner {
    frames: VecDeque<Bytes>,
    closed: bool,
}

/// Bounded FIFO of encoded frames with at most one write in flight.
#[derive(Debug)]
pub struct SendQueue {
    inner: Mutex<Inner>,
    max_depth: usize,
}

impl SendQueue {
    /// Creates a queue holding at most `max_depth` frames.
    pub fn new(max_depth: usize) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            max_depth: max_depth.max(1),
        }
    }

    /// Appends a frame.
    pub fn push(&self, frame: Bytes) -> Enqueued {
        let mut inner = self.inner.lock();
        if inner.closed {
            return Enqueued::Closed;
        }
        if inner.frames.len() >= self.max_depth {
            return Enqueued::Dropped;
        }

        let was_empty = inner.frames.is_empty();
        inner.frames.push_back(frame);
        if was_empty {
            Enqueued::WriteNeeded
        } else {
            Enqueued::Pending
        }
    }

    /// Returns the frame that should be written next, without removing it.
    pub fn front(&self) -> Option<Bytes> {
        let inner = self.inner.lock();
        if inner.closed {
            return None;
        }
        inner.frames.front().cloned()
    }

    /// Pops the head after its write completed and returns the new head.
    pub fn complete_head(&self) -> Option<Bytes> {
        let mut inner = self.inner.lock();
        if inner.closed {
            return None;
        }
        inner.frames.pop_front();
        inner.frames.front().cloned()
    }

    /// Discards every queued frame and refuses further pushes.
    ///
    /// Returns the number of frames that were discarded.
    pub fn close(&self) -> usize {
        let mut inner = self.inner.lock();
        inner.closed = true;
        let discarded = inner.frames.len();
        inner.frames.clear();
        discarded
    }

    /// Number of queued frames, including the one in flight.
    pub fn len(&self) -> usize {
        self.inner.lock().frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().frames.is_empty()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Copies the queued frames in send order.
    pub fn snapshot(&self) -> Vec<Bytes> {
        self.inner.lock().frames.iter().cloned().collect()
    }
}

impl Default for SendQueue {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_SEND_QUEUE)
    }
}
