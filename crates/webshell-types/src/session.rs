//! Connection handles and session identity.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::screen::MonitorId;

/// Opaque handle for one live pub/sub connection.
///
/// Allocated by the transport when a client connects; the session registry
/// only ever holds it as a key and never owns the connection itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    /// Allocate a fresh connection handle.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The `(monitor, widget)` identity bound to a connection after handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub connection: ConnectionId,
    pub monitor_id: MonitorId,
    pub widget_name: String,
}

impl Session {
    pub fn new(connection: ConnectionId, monitor_id: MonitorId, widget_name: impl Into<String>) -> Self {
        Self {
            connection,
            monitor_id,
            widget_name: widget_name.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_id_unique() {
        let a = ConnectionId::new();
        let b = ConnectionId::new();
        assert_ne!(a, b);
    }

    #[test]
    fn connection_id_display() {
        let id = ConnectionId::new();
        // UUID v4 format: 8-4-4-4-12
        assert_eq!(id.to_string().len(), 36);
    }

    #[test]
    fn session_carries_identity() {
        let conn = ConnectionId::new();
        let session = Session::new(conn, 1, "bar");
        assert_eq!(session.connection, conn);
        assert_eq!(session.monitor_id, 1);
        assert_eq!(session.widget_name, "bar");
    }
}
