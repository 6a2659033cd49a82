//! Log output setup.
//!
//! Events are formatted on the thread that emits them and handed to a
//! background writer thread, so the I/O loops and the dispatch worker never
//! wait on stdout or the log file. Output goes to stdout and, when
//! `log_file` is configured, is also appended to that file.
//!
//! The returned [`LogGuard`] must stay alive for as long as logs should be
//! written. Dropping it flushes whatever is still buffered.

use crate::config::ServerConfig;
use std::fs::OpenOptions;
use std::io;
use std::path::PathBuf;
use thiserror::Error;
use tracing::Subscriber;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter::ParseError;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::EnvFilter;

/// Errors raised while setting up logging.
#[derive(Debug, Error)]
pub enum LogError {
    #[error("invalid log filter: {0}")]
    Filter(#[from] ParseError),

    #[error("failed to open log file {path}: {source}")]
    File { path: PathBuf, source: io::Error },

    #[error("a global logger is already installed: {0}")]
    Install(#[from] tracing::subscriber::SetGlobalDefaultError),
}

/// Keeps the background log writers running.
#[must_use = "logs stop being written once the guard is dropped"]
pub struct LogGuard {
    writers: Vec<WorkerGuard>,
}

impl std::fmt::Debug for LogGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogGuard")
            .field("writers", &self.writers.len())
            .finish()
    }
}

/// Filter from `RUST_LOG`, falling back to the configured level.
pub fn filter(config: &ServerConfig) -> Result<EnvFilter, LogError> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => Ok(EnvFilter::try_new(&config.log_level)?),
    }
}

/// Builds the subscriber without installing it.
pub fn subscriber(
    config: &ServerConfig,
    filter: EnvFilter,
) -> Result<(impl Subscriber + Send + Sync + 'static, LogGuard), LogError> {
    let mut writers = Vec::with_capacity(2);

    let (stdout, guard) = tracing_appender::non_blocking(io::stdout());
    writers.push(guard);
    let stdout_layer = fmt::layer()
        .with_writer(stdout)
        .with_target(false)
        .with_thread_names(true);

    let file_layer = match &config.log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|source| LogError::File {
                    path: path.clone(),
                    source,
                })?;
            let (writer, guard) = tracing_appender::non_blocking(file);
            writers.push(guard);
            Some(
                fmt::layer()
                    .with_writer(writer)
                    .with_ansi(false)
                    .with_target(false)
                    .with_thread_names(true),
            )
        }
        None => None,
    };

    let subscriber = tracing_subscriber::registry()
        .with(filter)
        .with(stdout_layer)
        .with(file_layer);

    Ok((subscriber, LogGuard { writers }))
}

/// Installs the global subscriber.
pub fn init(config: &ServerConfig) -> Result<LogGuard, LogError> {
    let (subscriber, guard) = subscriber(config, filter(config)?)?;
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(guard)
}
