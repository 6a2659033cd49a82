//! FlashFTP - A Small FTP-like File Transfer Server
//!
//! This is the main entry point for the FlashFTP server.
//! It loads configuration, sets up logging, and runs the acceptor until
//! Ctrl+C or SIGTERM is received.

use clap::Parser;
use flashftp::config::ServerConfig;
use flashftp::logging;
use flashftp::server::{shutdown_signal, Server};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// FlashFTP server
#[derive(Parser, Debug)]
#[command(name = "flashftp", version, about)]
struct Args {
    /// Config file (.toml, .json or .yaml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Host to bind to
    #[arg(long)]
    host: Option<String>,

    /// Port to listen on
    #[arg(short, long)]
    port: Option<u16>,

    /// Directory served as the virtual root
    #[arg(short, long)]
    root: Option<PathBuf>,

    /// Log filter, e.g. "info" or "flashftp=debug"
    #[arg(long)]
    log_level: Option<String>,

    /// Also append logs to this file
    #[arg(long)]
    log_file: Option<PathBuf>,
}

impl Args {
    /// Loads the config file, if any, and applies command-line overrides.
    fn into_config(self) -> anyhow::Result<ServerConfig> {
        let mut config = match &self.config {
            Some(path) => ServerConfig::load(path)?,
            None => ServerConfig::default(),
        };

        if let Some(host) = self.host {
            config.host = host;
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(root) = self.root {
            config.root_dir = if root.is_absolute() {
                root
            } else {
                std::env::current_dir()?.join(root)
            };
        }
        if let Some(level) = self.log_level {
            config.log_level = level;
        }
        if let Some(file) = self.log_file {
            config.log_file = Some(file);
        }

        config.validate()?;
        Ok(config)
    }
}

fn print_banner(config: &ServerConfig) {
    println!(
        r#"
FlashFTP v{} - FTP-like File Transfer Server
──────────────────────────────────────────────
Serving {} on {}
Ready to accept connections.

Use Ctrl+C or SIGTERM to shutdown gracefully.
"#,
        flashftp::VERSION,
        config.root_dir.display(),
        config.bind_address()
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Args::parse().into_config()?;

    // Held until main returns so buffered log lines are flushed
    let _log_guard = logging::init(&config)?;

    print_banner(&config);

    let server = Arc::new(Server::new(config)?);
    let listener = server.bind().await?;
    info!("Listening on {}", server.config().bind_address());

    // Set up graceful shutdown
    let signal = shutdown_signal()?;
    let shutdown = async {
        let received = signal.await;
        info!(signal = %received, "Shutdown signal received, stopping server...");
    };

    server.run(listener, shutdown).await;

    // Joins the worker and I/O threads
    let stopping = Arc::clone(&server);
    tokio::task::spawn_blocking(move || stopping.shutdown()).await?;

    info!("Server shutdown complete");
    Ok(())
}
