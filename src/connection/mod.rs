//! Connection Module
//!
//! This module owns everything tied to one client connection: its session
//! state, its outbound queue and the tasks driving its socket. It also holds
//! the registry of live sessions.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Acceptor (server)                       │
//! └──────────────────────┬──────────────────────────────────────┘
//!                        │ accept(), Session::new, registry.insert
//!                        ▼
//!           ┌────────────────────────┐
//!           │  next I/O loop         │
//!           └────────────┬───────────┘
//!                        │ spawn
//!                        ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 handle_connection                           │
//! │                                                             │
//! │  ┌─────────────┐    ┌─────────────┐    ┌──────────────┐     │
//! │  │ Read bytes  │───>│ FrameDecoder│───>│ Dispatcher   │     │
//! │  └─────────────┘    └─────────────┘    └──────┬───────┘     │
//! │                                               │ handler     │
//! │                                               ▼             │
//! │  ┌─────────────┐                      ┌──────────────┐      │
//! │  │ write_loop  │<─────────────────────│ SendQueue    │      │
//! │  └─────────────┘    write needed      └──────────────┘      │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - `session`: Session identity, working directory and close guard
//! - `send_queue`: Bounded FIFO of outbound frames
//! - `handler`: Reader and writer loops
//! - `registry`: Live sessions by id
//! - `stats`: Server-wide counters

pub mod handler;
pub mod registry;
pub mod send_queue;
pub mod session;
pub mod stats;

// Re-export commonly used types
pub use handler::{handle_connection, write_loop, ConnectionError, ConnectionHandler};
pub use registry::SessionRegistry;
pub use send_queue::{Enqueued, SendQueue, DEFAULT_MAX_SEND_QUEUE};
pub use session::{CloseReason, Session, SessionId, SessionSettings};
pub use stats::ConnectionStats;
