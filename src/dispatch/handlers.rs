//! Message type → handler table.

use crate::connection::Session;
use crate::protocol::Message;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::warn;

/// A business handler invoked on the dispatch worker.
pub type HandlerFn = Box<dyn Fn(&Arc<Session>, &Message) -> anyhow::Result<()> + Send + Sync>;

/// Handlers keyed by message type.
///
/// Built once at startup and then moved into the dispatch worker, so lookups
/// need no locking.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<u16, HandlerFn>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for `msg_type`.
    ///
    /// Returns false, keeping the existing handler, if the type is already
    /// registered.
    pub fn register<F>(&mut self, msg_type: impl Into<u16>, handler: F) -> bool
    where
        F: Fn(&Arc<Session>, &Message) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let msg_type = msg_type.into();
        if self.handlers.contains_key(&msg_type) {
            warn!(msg_type, "Handler already registered, ignoring duplicate");
            return false;
        }
        self.handlers.insert(msg_type, Box::new(handler));
        true
    }

    pub fn get(&self, msg_type: u16) -> Option<&HandlerFn> {
        self.handlers.get(&msg_type)
    }

    pub fn contains(&self, msg_type: u16) -> bool {
        self.handlers.contains_key(&msg_type)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Registered message types, ascending.
    pub fn types(&self) -> Vec<u16> {
        let mut types: Vec<u16> = self.handlers.keys().copied().collect();
        types.sort_unstable();
        types
    }
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("types", &self.types())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::SessionSettings;
    use crate::protocol::MessageType;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_register_and_lookup() {
        let mut registry = HandlerRegistry::new();
        assert!(registry.register(MessageType::Pwd, |_, _| Ok(())));
        assert!(registry.contains(1008));
        assert!(!registry.contains(1009));
        assert_eq!(registry.types(), vec![1008]);
    }

    #[test]
    fn test_first_registration_wins() {
        let hits = Arc::new(AtomicUsize::new(0));
        let mut registry = HandlerRegistry::new();

        let first = Arc::clone(&hits);
        assert!(registry.register(7u16, move |_, _| {
            first.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }));
        assert!(!registry.register(7u16, |_, _| anyhow::bail!("second handler ran")));
        assert_eq!(registry.len(), 1);

        let session = Session::detached(&SessionSettings::default());
        let handler = registry.get(7).unwrap();
        handler(&session, &Message::new(7u16, "x")).unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
