//! The dispatch worker.
//!
//! Every decoded message, from every connection, is posted here and handled
//! on a single dedicated thread in arrival order. Socket I/O keeps running on
//! the I/O loops while handlers work, and handlers never run concurrently with
//! each other.
//!
//! ```text
//!  I/O loop 1 ──post──┐
//!  I/O loop 2 ──post──┼──> [ unbounded FIFO ] ──> dispatch-worker ──> handler
//!  I/O loop N ──post──┘
//! ```
//!
//! A failing or panicking handler is logged and the worker moves on to the
//! next item.

use crate::connection::Session;
use crate::dispatch::handlers::HandlerRegistry;
use crate::protocol::Message;
use parking_lot::Mutex;
use std::any::Any;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, error, info, trace, warn};

/// Name of the worker thread.
pub const WORKER_THREAD_NAME: &str = "dispatch-worker";

/// One decoded message waiting to be handled.
#[derive(Debug)]
pub struct WorkItem {
    pub session: Arc<Session>,
    pub message: Message,
}

impl WorkItem {
    pub fn new(session: Arc<Session>, message: Message) -> Self {
        Self { session, message }
    }
}

/// Errors returned by [`Dispatcher::post`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error("dispatcher is shutting down")]
    ShuttingDown,
}

/// Worker counters.
#[derive(Debug, Default)]
pub struct DispatchStats {
    /// Items whose handler returned Ok
    pub processed: AtomicU64,
    /// Items with no registered handler
    pub unknown: AtomicU64,
    /// Items whose handler returned an error or panicked
    pub failed: AtomicU64,
}

impl DispatchStats {
    pub fn processed(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }

    pub fn unknown(&self) -> u64 {
        self.unknown.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }
}

enum Envelope {
    Work(WorkItem),
    Shutdown,
}

/// Handle to the dispatch worker thread.
pub struct Dispatcher {
    tx: mpsc::UnboundedSender<Envelope>,
    accepting: AtomicBool,
    worker: Mutex<Option<JoinHandle<()>>>,
    stats: Arc<DispatchStats>,
}

impl Dispatcher {
    /// Spawns the worker thread with the given handler table.
    pub fn start(handlers: HandlerRegistry) -> io::Result<Arc<Self>> {
        let (tx, rx) = mpsc::unbounded_channel();
        let stats = Arc::new(DispatchStats::default());

        let worker_stats = Arc::clone(&stats);
        let worker = thread::Builder::new()
            .name(WORKER_THREAD_NAME.to_string())
            .spawn(move || run_worker(rx, handlers, worker_stats))?;

        Ok(Arc::new(Self {
            tx,
            accepting: AtomicBool::new(true),
            worker: Mutex::new(Some(worker)),
            stats,
        }))
    }

    /// Appends an item to the queue. Never blocks.
    pub fn post(&self, item: WorkItem) -> Result<(), DispatchError> {
        if !self.accepting.load(Ordering::Acquire) {
            return Err(DispatchError::ShuttingDown);
        }
        self.tx
            .send(Envelope::Work(item))
            .map_err(|_| DispatchError::ShuttingDown)
    }

    pub fn is_accepting(&self) -> bool {
        self.accepting.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> &DispatchStats {
        &self.stats
    }

    /// Stops accepting work, lets the worker drain what was already posted,
    /// and waits for it to exit.
    ///
    /// Safe to call more than once. Called from a handler it only signals,
    /// since the worker cannot join itself.
    pub fn shutdown(&self) {
        if self.accepting.swap(false, Ordering::AcqRel) {
            let _ = self.tx.send(Envelope::Shutdown);
        }

        let Some(worker) = self.worker.lock().take() else {
            return;
        };
        if worker.thread().id() == thread::current().id() {
            return;
        }
        if worker.join().is_err() {
            error!("Dispatch worker exited with a panic");
        }
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("accepting", &self.is_accepting())
            .field("stats", &self.stats)
            .finish()
    }
}

fn run_worker(
    mut rx: mpsc::UnboundedReceiver<Envelope>,
    handlers: HandlerRegistry,
    stats: Arc<DispatchStats>,
) {
    info!(handlers = handlers.len(), "Dispatch worker started");

    while let Some(envelope) = rx.blocking_recv() {
        match envelope {
            Envelope::Work(item) => process(&handlers, &stats, item),
            Envelope::Shutdown => {
                // Posts racing the shutdown either land before the close
                // and are drained here, or fail in `post`.
                rx.close();
                let mut drained = 0usize;
                while let Some(envelope) = rx.blocking_recv() {
                    if let Envelope::Work(item) = envelope {
                        process(&handlers, &stats, item);
                        drained += 1;
                    }
                }
                debug!(drained, "Dispatch queue drained");
                break;
            }
        }
    }

    info!(
        processed = stats.processed(),
        failed = stats.failed(),
        unknown = stats.unknown(),
        "Dispatch worker stopped"
    );
}

fn process(handlers: &HandlerRegistry, stats: &DispatchStats, item: WorkItem) {
    let WorkItem { session, message } = item;

    let Some(handler) = handlers.get(message.msg_type) else {
        stats.unknown.fetch_add(1, Ordering::Relaxed);
        warn!(
            session = %session.id(),
            msg_type = message.msg_type,
            "No handler for message type, dropping"
        );
        return;
    };

    trace!(session = %session.id(), msg_type = message.msg_type, len = message.payload.len(), "Dispatching");

    match panic::catch_unwind(AssertUnwindSafe(|| handler(&session, &message))) {
        Ok(Ok(())) => {
            stats.processed.fetch_add(1, Ordering::Relaxed);
        }
        Ok(Err(e)) => {
            stats.failed.fetch_add(1, Ordering::Relaxed);
            warn!(
                session = %session.id(),
                msg_type = message.msg_type,
                error = %e,
                "Handler failed"
            );
        }
        Err(payload) => {
            stats.failed.fetch_add(1, Ordering::Relaxed);
            error!(
                session = %session.id(),
                msg_type = message.msg_type,
                panic = panic_message(payload.as_ref()),
                "Handler panicked"
            );
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "<non-string panic>"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::SessionSettings;
    use std::sync::mpsc as std_mpsc;
    use std::time::Duration;

    fn session() -> Arc<Session> {
        Session::detached(&SessionSettings::default())
    }

    /// Records (session id, payload) for every message of type 1 and 2.
    fn recording_registry() -> (HandlerRegistry, Arc<Mutex<Vec<(String, String)>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut registry = HandlerRegistry::new();
        for msg_type in [1u16, 2] {
            let seen = Arc::clone(&seen);
            registry.register(msg_type, move |session: &Arc<Session>, message: &Message| {
                seen.lock().push((
                    session.id().to_string(),
                    String::from_utf8_lossy(&message.payload).into_owned(),
                ));
                Ok(())
            });
        }
        (registry, seen)
    }

    #[test]
    fn test_fifo_across_sessions() {
        let (registry, seen) = recording_registry();
        let dispatcher = Dispatcher::start(registry).unwrap();
        let a = session();
        let b = session();

        dispatcher
            .post(WorkItem::new(Arc::clone(&a), Message::new(1u16, "W1")))
            .unwrap();
        dispatcher
            .post(WorkItem::new(Arc::clone(&b), Message::new(2u16, "W2")))
            .unwrap();
        dispatcher
            .post(WorkItem::new(Arc::clone(&a), Message::new(1u16, "W3")))
            .unwrap();
        dispatcher.shutdown();

        let seen = seen.lock();
        assert_eq!(
            *seen,
            vec![
                (a.id().to_string(), "W1".to_string()),
                (b.id().to_string(), "W2".to_string()),
                (a.id().to_string(), "W3".to_string()),
            ]
        );
        assert_eq!(dispatcher.stats().processed(), 3);
    }

    #[test]
    fn test_unknown_type_is_dropped() {
        let (registry, seen) = recording_registry();
        let dispatcher = Dispatcher::start(registry).unwrap();

        dispatcher
            .post(WorkItem::new(session(), Message::new(99u16, "?")))
            .unwrap();
        dispatcher
            .post(WorkItem::new(session(), Message::new(1u16, "after")))
            .unwrap();
        dispatcher.shutdown();

        assert_eq!(dispatcher.stats().unknown(), 1);
        assert_eq!(seen.lock().len(), 1);
    }

    #[test]
    fn test_failures_do_not_stop_worker() {
        let (mut registry, seen) = recording_registry();
        registry.register(10u16, |_, _| anyhow::bail!("boom"));
        registry.register(11u16, |_, _| panic!("handler panic"));
        let dispatcher = Dispatcher::start(registry).unwrap();

        for msg_type in [10u16, 11, 1] {
            dispatcher
                .post(WorkItem::new(session(), Message::new(msg_type, "p")))
                .unwrap();
        }
        dispatcher.shutdown();

        assert_eq!(dispatcher.stats().failed(), 2);
        assert_eq!(dispatcher.stats().processed(), 1);
        assert_eq!(seen.lock().len(), 1);
    }

    #[test]
    fn test_shutdown_drains_posted_items() {
        let (started_tx, started_rx) = std_mpsc::channel();
        let (release_tx, release_rx) = std_mpsc::channel::<()>();
        let release_rx = Mutex::new(release_rx);

        let (mut registry, seen) = recording_registry();
        registry.register(5u16, move |_, _| {
            let _ = started_tx.send(());
            let _ = release_rx.lock().recv_timeout(Duration::from_secs(5));
            Ok(())
        });
        let dispatcher = Dispatcher::start(registry).unwrap();

        // Hold the worker inside a handler while more items pile up
        dispatcher
            .post(WorkItem::new(session(), Message::new(5u16, "")))
            .unwrap();
        started_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        for i in 0..10 {
            dispatcher
                .post(WorkItem::new(session(), Message::new(1u16, i.to_string())))
                .unwrap();
        }

        let shutdown = {
            let dispatcher = Arc::clone(&dispatcher);
            thread::spawn(move || dispatcher.shutdown())
        };
        release_tx.send(()).unwrap();
        shutdown.join().unwrap();

        assert_eq!(seen.lock().len(), 10);
        assert_eq!(dispatcher.stats().processed(), 11);
    }

    #[test]
    fn test_post_after_shutdown_fails() {
        let dispatcher = Dispatcher::start(HandlerRegistry::new()).unwrap();
        dispatcher.shutdown();
        dispatcher.shutdown();

        assert!(!dispatcher.is_accepting());
        assert_eq!(
            dispatcher.post(WorkItem::new(session(), Message::new(1u16, ""))),
            Err(DispatchError::ShuttingDown)
        );
    }

    #[test]
    fn test_accepted_posts_run_despite_racing_shutdown() {
        use std::sync::atomic::AtomicUsize;

        let handled = Arc::new(AtomicUsize::new(0));
        let mut registry = HandlerRegistry::new();
        {
            let handled = Arc::clone(&handled);
            registry.register(1u16, move |_, _| {
                handled.fetch_add(1, Ordering::Relaxed);
                Ok(())
            });
        }
        let dispatcher = Dispatcher::start(registry).unwrap();

        let posters: Vec<_> = (0..4)
            .map(|_| {
                let dispatcher = Arc::clone(&dispatcher);
                thread::spawn(move || {
                    let s = session();
                    let mut accepted = 0usize;
                    while dispatcher
                        .post(WorkItem::new(Arc::clone(&s), Message::new(1u16, "")))
                        .is_ok()
                    {
                        accepted += 1;
                    }
                    accepted
                })
            })
            .collect();

        thread::sleep(Duration::from_millis(20));
        dispatcher.shutdown();

        let accepted: usize = posters.into_iter().map(|p| p.join().unwrap()).sum();
        assert!(accepted > 0);
        assert_eq!(handled.load(Ordering::Relaxed), accepted);
        assert_eq!(dispatcher.stats().processed() as usize, accepted);
    }

    #[test]
    fn test_reply_to_closed_session_is_noop() {
        let mut registry = HandlerRegistry::new();
        registry.register(1u16, |session: &Arc<Session>, message: &Message| {
            session.send(message.msg_type, b"reply")?;
            Ok(())
        });
        let dispatcher = Dispatcher::start(registry).unwrap();

        let s = session();
        s.close(crate::connection::CloseReason::PeerClosed);
        dispatcher
            .post(WorkItem::new(Arc::clone(&s), Message::new(1u16, "")))
            .unwrap();
        dispatcher.shutdown();

        assert_eq!(dispatcher.stats().processed(), 1);
        assert!(s.send_queue().is_empty());
    }
}
