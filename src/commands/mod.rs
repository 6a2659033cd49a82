//! Command Handler Module
//!
//! This module implements the file commands served by FlashFTP. It runs on
//! the dispatch worker, executes each decoded request against the
//! filesystem, and queues the reply on the requesting session.
//!
//! ## Architecture
//!
//! ```text
//! Client Request
//!       │
//!       ▼
//! ┌─────────────────┐
//! │  FrameDecoder   │  (protocol module)
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │   Dispatcher    │  (dispatch module)
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │ CommandHandler  │  (this module)
//! │                 │
//! │  - Parse JSON   │
//! │  - Execute      │
//! │  - Reply        │
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │   FileSystem    │  (fs module)
//! └─────────────────┘
//! ```
//!
//! ## Supported Commands
//!
//! HELLO, LIST, MKDIR, RMDIR, UPLOAD, DOWNLOAD, CD, PWD, CAT, EXIT

pub mod handler;

// Re-export the main command handler
pub use handler::{CommandError, CommandHandler, GOODBYE};
