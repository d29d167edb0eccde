//! Session registry: which bus connection is which widget on which monitor.

use std::collections::HashMap;

use parking_lot::Mutex;
use tracing::debug;
use webshell_types::{ConnectionId, MonitorId, Session};

/// Sessions keyed by connection handle.
///
/// The transport owns the connections; this registry only associates a
/// handle with the identity sent in its handshake.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<ConnectionId, Session>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `connection` to a widget identity. A repeated handshake
    /// overwrites the previous identity, which is returned.
    pub fn register(
        &self,
        connection: ConnectionId,
        monitor_id: MonitorId,
        widget_name: &str,
    ) -> Option<Session> {
        let session = Session::new(connection, monitor_id, widget_name);
        let previous = self.sessions.lock().insert(connection, session);
        debug!(conn = %connection, monitor_id, widget = widget_name, "session registered");
        previous
    }

    pub fn lookup(&self, connection: ConnectionId) -> Option<Session> {
        self.sessions.lock().get(&connection).cloned()
    }

    /// Drop the session for a closed connection. Idempotent.
    pub fn remove(&self, connection: ConnectionId) -> Option<Session> {
        let removed = self.sessions.lock().remove(&connection);
        if removed.is_some() {
            debug!(conn = %connection, "session removed");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of every live session.
    pub fn sessions(&self) -> Vec<Session> {
        self.sessions.lock().values().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Arc;

    use super::*;

    #[test]
    fn register_lookup_remove() {
        let registry = SessionRegistry::new();
        let conn = ConnectionId::new();

        assert!(registry.lookup(conn).is_none());
        assert!(registry.register(conn, 1, "bar").is_none());

        let session = registry.lookup(conn).unwrap();
        assert_eq!(session.monitor_id, 1);
        assert_eq!(session.widget_name, "bar");

        assert!(registry.remove(conn).is_some());
        assert!(registry.remove(conn).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn rehandshake_overwrites() {
        let registry = SessionRegistry::new();
        let conn = ConnectionId::new();
        registry.register(conn, 0, "bar");

        let previous = registry.register(conn, 2, "dock").unwrap();
        assert_eq!(previous.widget_name, "bar");
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.lookup(conn).unwrap().widget_name, "dock");
    }

    #[test]
    fn concurrent_register_and_remove() {
        let registry = Arc::new(SessionRegistry::new());
        let conns: Vec<ConnectionId> = (0..100).map(|_| ConnectionId::new()).collect();

        // Thread t owns connections t, t+8, t+16, ...; it registers all of
        // them and removes every other one.
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let registry = Arc::clone(&registry);
                let conns = conns.clone();
                std::thread::spawn(move || {
                    let owned: Vec<_> = conns.iter().skip(t).step_by(8).copied().collect();
                    for (i, conn) in owned.iter().enumerate() {
                        registry.register(*conn, i32::try_from(t).unwrap(), "w");
                        registry.register(*conn, i32::try_from(t).unwrap(), "w");
                        if i % 2 == 1 {
                            registry.remove(*conn);
                        }
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let expected: HashSet<ConnectionId> = (0..8)
            .flat_map(|t| {
                conns
                    .iter()
                    .skip(t)
                    .step_by(8)
                    .copied()
                    .enumerate()
                    .filter(|(i, _)| i % 2 == 0)
                    .map(|(_, c)| c)
                    .collect::<Vec<_>>()
            })
            .collect();
        let actual: HashSet<ConnectionId> =
            registry.sessions().into_iter().map(|s| s.connection).collect();

        assert_eq!(registry.len(), expected.len());
        assert_eq!(actual, expected);
    }
}
