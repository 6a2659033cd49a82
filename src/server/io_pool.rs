//! Pool of single-threaded I/O loops.
//!
//! Each loop is an OS thread driving its own current-thread Tokio runtime.
//! Connections are assigned to loops round-robin and every read and write of
//! a connection then runs on that loop's thread.

use parking_lot::Mutex;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tokio::runtime::{Builder, Handle};
use tokio::sync::oneshot;
use tracing::{debug, error, info};

/// How long a stopping loop waits for its remaining tasks.
const SHUTDOWN_GRACE: Duration = Duration::from_millis(500);

struct IoLoop {
    stop: Option<oneshot::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

/// Fixed set of I/O loops handed out round-robin.
pub struct IoPool {
    handles: Vec<Handle>,
    next: AtomicUsize,
    loops: Mutex<Vec<IoLoop>>,
}

impl IoPool {
    /// Starts `size` loops (at least one).
    pub fn new(size: usize) -> io::Result<Self> {
        let size = size.max(1);
        let mut handles = Vec::with_capacity(size);
        let mut loops = Vec::with_capacity(size);

        for index in 0..size {
            let runtime = Builder::new_current_thread().enable_all().build()?;
            handles.push(runtime.handle().clone());

            let (stop_tx, stop_rx) = oneshot::channel::<()>();
            let thread = thread::Builder::new()
                .name(format!("io-loop-{}", index))
                .spawn(move || {
                    debug!(index, "I/O loop started");
                    runtime.block_on(async {
                        let _ = stop_rx.await;
                    });
                    runtime.shutdown_timeout(SHUTDOWN_GRACE);
                    debug!(index, "I/O loop stopped");
                })?;

            loops.push(IoLoop {
                stop: Some(stop_tx),
                thread: Some(thread),
            });
        }

        info!(size, "I/O pool started");
        Ok(Self {
            handles,
            next: AtomicUsize::new(0),
            loops: Mutex::new(loops),
        })
    }

    /// Returns the runtime of the next loop in round-robin order.
    pub fn next(&self) -> &Handle {
        let index = self.next.fetch_add(1, Ordering::Relaxed) % self.handles.len();
        &self.handles[index]
    }

    pub fn size(&self) -> usize {
        self.handles.len()
    }

    /// Stops every loop and waits for the threads to exit.
    ///
    /// Tasks still running on a loop are cancelled. Safe to call more than once.
    pub fn shutdown(&self) {
        let mut loops = self.loops.lock();
        for io_loop in loops.iter_mut() {
            if let Some(stop) = io_loop.stop.take() {
                let _ = stop.send(());
            }
        }
        for io_loop in loops.iter_mut() {
            if let Some(thread) = io_loop.thread.take() {
                if thread.join().is_err() {
                    error!("I/O loop thread panicked");
                }
            }
        }
    }
}

impl Drop for IoPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for IoPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IoPool").field("size", &self.size()).finish()
    }
}
