//! Session registry.
//!
//! Maps session ids to live sessions. Inserted into by the accept loop and
//! removed from by whichever I/O path closes the session first, possibly on
//! different I/O threads, so the map sits behind a single lock.

use crate::connection::session::{CloseReason, Session, SessionId};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Thread-safe map of live sessions.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<SessionId, Arc<Session>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a session. Returns the previous entry for the same id, if any.
    pub fn insert(&self, session: Arc<Session>) -> Option<Arc<Session>> {
        let id = session.id();
        let previous = self.sessions.lock().insert(id, session);
        debug!(session = %id, "Session registered");
        previous
    }

    /// Removes a session. Removing an absent id is a no-op.
    pub fn remove(&self, id: &SessionId) -> Option<Arc<Session>> {
        let removed = self.sessions.lock().remove(id);
        if removed.is_some() {
            debug!(session = %id, "Session unregistered");
        }
        removed
    }

    pub fn get(&self, id: &SessionId) -> Option<Arc<Session>> {
        self.sessions.lock().get(id).cloned()
    }

    pub fn contains(&self, id: &SessionId) -> bool {
        self.sessions.lock().contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.lock().is_empty()
    }

    /// Returns every registered session, in no particular order.
    pub fn sessions(&self) -> Vec<Arc<Session>> {
        self.sessions.lock().values().cloned().collect()
    }

    /// Stops every registered session from reading new requests.
    pub fn stop_reading_all(&self) {
        for session in self.sessions() {
            session.stop_reading();
        }
    }

    /// Asks every registered session to close once its queue is flushed.
    pub fn close_all_after_flush(&self, reason: CloseReason) {
        for session in self.sessions() {
            session.close_after_flush(reason);
        }
    }

    /// Closes every registered session. Returns how many were closed.
    pub fn close_all(&self, reason: CloseReason) -> usize {
        // Collect first: closing a session removes it from this map.
        let sessions = self.sessions();
        sessions
            .iter()
            .filter(|session| session.close(reason))
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::session::SessionSettings;
    use crate::connection::stats::ConnectionStats;
    use std::net::{Ipv4Addr, SocketAddr};
    use std::thread;

    fn new_session(registry: &Arc<SessionRegistry>) -> Arc<Session> {
        Session::new(
            SocketAddr::from((Ipv4Addr::LOCALHOST, 0)),
            &SessionSettings::default(),
            Arc::downgrade(registry),
            Arc::new(ConnectionStats::new()),
        )
    }

    #[test]
    fn test_insert_get_remove() {
        let registry = Arc::new(SessionRegistry::new());
        let session = new_session(&registry);
        let id = session.id();

        assert!(registry.insert(Arc::clone(&session)).is_none());
        assert!(registry.contains(&id));
        assert_eq!(registry.get(&id).map(|s| s.id()), Some(id));

        assert!(registry.remove(&id).is_some());
        assert!(registry.get(&id).is_none());
        assert!(registry.remove(&id).is_none());
    }

    #[test]
    fn test_concurrent_insert_remove() {
        let registry = Arc::new(SessionRegistry::new());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                thread::spawn(move || {
                    let mut ids = Vec::new();
                    for _ in 0..100 {
                        let session = new_session(&registry);
                        ids.push(session.id());
                        registry.insert(session);
                    }
                    for id in ids.iter().step_by(2) {
                        registry.remove(id);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(registry.len(), 8 * 50);
    }

    #[test]
    fn test_close_all() {
        let registry = Arc::new(SessionRegistry::new());
        let sessions: Vec<_> = (0..3).map(|_| new_session(&registry)).collect();
        for session in &sessions {
            registry.insert(Arc::clone(session));
        }

        assert_eq!(registry.close_all(CloseReason::ServerShutdown), 3);
        assert!(registry.is_empty());
        assert!(sessions.iter().all(|s| s.is_closed()));
        assert_eq!(registry.close_all(CloseReason::ServerShutdown), 0);
    }

    #[test]
    fn test_stop_reading_and_flush_requests() {
        let registry = Arc::new(SessionRegistry::new());
        let sessions: Vec<_> = (0..2).map(|_| new_session(&registry)).collect();
        for session in &sessions {
            registry.insert(Arc::clone(session));
        }

        registry.stop_reading_all();
        registry.close_all_after_flush(CloseReason::ServerShutdown);

        assert_eq!(registry.len(), 2);
        for session in &sessions {
            assert!(session.is_reading_stopped());
            assert_eq!(session.close_requested(), Some(CloseReason::ServerShutdown));
            assert!(!session.is_closed());
        }
    }
}
