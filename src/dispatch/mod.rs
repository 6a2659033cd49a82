//! Single-threaded message dispatch.
//!
//! - `handlers`: The message type → handler table
//! - `worker`: The dispatch queue and its worker thread

pub mod handlers;
pub mod worker;

pub use handlers::{HandlerFn, HandlerRegistry};
pub use worker::{DispatchError, DispatchStats, Dispatcher, WorkItem};
