//! Process shutdown signals.
//!
//! The server stops on Ctrl+C (SIGINT) and, on Unix, on SIGTERM, which is
//! what service managers and container runtimes send.

use std::fmt;
use std::future::Future;
use std::io;
use tokio::signal;
use tracing::error;

/// The signal that ended the wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    /// Ctrl+C / SIGINT
    Interrupt,
    /// SIGTERM
    Terminate,
}

impl fmt::Display for ShutdownSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShutdownSignal::Interrupt => f.write_str("SIGINT"),
            ShutdownSignal::Terminate => f.write_str("SIGTERM"),
        }
    }
}

/// Installs the signal handlers and returns a future resolving on the
/// first shutdown signal.
///
/// The SIGTERM handler is registered before this returns, so a signal sent
/// right afterwards is not lost. Must be called within a Tokio runtime.
pub fn shutdown_signal() -> io::Result<impl Future<Output = ShutdownSignal>> {
    #[cfg(unix)]
    let mut terminate = signal::unix::signal(signal::unix::SignalKind::terminate())?;

    Ok(async move {
        let interrupt = async {
            if let Err(e) = signal::ctrl_c().await {
                error!("Failed to listen for Ctrl+C: {}", e);
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async move {
            terminate.recv().await;
        };
        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = interrupt => ShutdownSignal::Interrupt,
            _ = terminate => ShutdownSignal::Terminate,
        }
    })
}
