//! # FlashFTP - A Small FTP-like File Transfer Server
//!
//! FlashFTP serves a directory tree over TCP using a compact framed binary
//! protocol. Clients list, create and remove directories, move around the
//! tree, and upload or download files with optional zlib compression.
//!
//! ## Features
//!
//! - **Framed Protocol**: 4-byte header (type + length) and a JSON payload
//! - **Incremental Decoding**: Frames may arrive split or coalesced in any way
//! - **Ordered Replies**: Per-session send queue with one write in flight
//! - **Serialized Commands**: A single dispatch worker runs all file commands
//! - **Async I/O**: A pool of Tokio I/O loops drives the sockets
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                              FlashFTP                                   │
//! │                                                                         │
//! │  ┌─────────────┐    ┌──────────────────────┐                            │
//! │  │ TCP Server  │───>│ I/O loop 1..N        │                            │
//! │  │ (Acceptor)  │    │  reader ── decoder ──┼──┐                         │
//! │  └──────┬──────┘    │  writer <─ queue  <──┼┐ │                         │
//! │         │           └──────────────────────┘│ │ post                    │
//! │         ▼                                   │ ▼                         │
//! │  ┌─────────────┐                     ┌──────┴──────────┐                │
//! │  │  Session    │                     │ dispatch-worker │                │
//! │  │  Registry   │                     │ CommandHandler  │──> FileSystem  │
//! │  └─────────────┘                     └─────────────────┘                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```no_run
//! use flashftp::config::ServerConfig;
//! use flashftp::server::Server;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ServerConfig {
//!         root_dir: "/srv/ftp".into(),
//!         ..ServerConfig::default()
//!     };
//!     let server = Arc::new(Server::new(config)?);
//!     let listener = server.bind().await?;
//!
//!     server
//!         .run(listener, async {
//!             let _ = tokio::signal::ctrl_c().await;
//!         })
//!         .await;
//!
//!     tokio::task::spawn_blocking(move || server.shutdown()).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Supported Commands
//!
//! | Type | Command  | Request fields                      |
//! |------|----------|-------------------------------------|
//! | 1001 | HELLO    | `data`                              |
//! | 1002 | MKDIR    | `path`                              |
//! | 1003 | RMDIR    | `path`                              |
//! | 1004 | LIST     | `path`                              |
//! | 1005 | UPLOAD   | `path content compress original_size` |
//! | 1006 | DOWNLOAD | `path compress`                     |
//! | 1007 | CD       | `path`                              |
//! | 1008 | PWD      |                                     |
//! | 1009 | CAT      | `path`                              |
//! | 1010 | EXIT     |                                     |
//!
//! ## Module Overview
//!
//! - [`protocol`]: Frame codec, message catalog and JSON payloads
//! - [`connection`]: Sessions, send queues, socket loops and the registry
//! - [`dispatch`]: The single-threaded dispatch worker
//! - [`commands`]: The file command handlers
//! - [`fs`]: Virtual path resolution and local disk access
//! - [`compress`]: zlib and base64 transfer encoding
//! - [`config`]: File and default configuration
//! - [`logging`]: Non-blocking stdout and file log output
//! - [`server`]: I/O pool and acceptor
//! - [`client`]: A small async client
//!
//! ## Design Highlights
//!
//! ### Explicit Decode State
//!
//! Decoding is a pure function of `(state, bytes)`. A message is emitted the
//! moment its last byte arrives, regardless of how reads were chunked.
//!
//! ### One Writer per Connection
//!
//! Handlers never touch sockets. They push encoded frames onto the session's
//! bounded queue and the connection's writer task drains it in order.
//!
//! ### Sandboxed Paths
//!
//! Paths are resolved lexically into virtual absolute paths with `..`
//! clamped at the root, and only then mapped below the configured root
//! directory.

pub mod client;
pub mod commands;
pub mod compress;
pub mod config;
pub mod connection;
pub mod dispatch;
pub mod fs;
pub mod logging;
pub mod protocol;
pub mod server;

// Re-export commonly used types for convenience
pub use commands::CommandHandler;
pub use config::ServerConfig;
pub use connection::{handle_connection, ConnectionStats, Session, SessionRegistry};
pub use dispatch::Dispatcher;
pub use protocol::{FrameDecoder, Message, MessageType, Request, Response};
pub use server::Server;

/// The default port FlashFTP listens on
pub const DEFAULT_PORT: u16 = 8080;

/// The default host FlashFTP binds to
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Version of FlashFTP
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
