//! Fan-out of envelopes to connected bus clients.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use webshell_types::{ConnectionId, Envelope};

use crate::wire;

/// Outbound side of the bus as seen by the daemon's subsystems.
///
/// Implementations must not block: they are called while the notification
/// table lock is held.
pub trait Publisher: Send + Sync {
    /// Send an envelope to every connected client.
    fn broadcast(&self, envelope: &Envelope);

    /// Send an envelope to one client. Returns `false` if it could not be
    /// queued (unknown connection, full or closed channel).
    fn send_to(&self, connection: ConnectionId, envelope: &Envelope) -> bool;
}

/// Connected clients indexed by connection handle.
///
/// Each entry is the queue feeding that connection's writer task.
#[derive(Clone, Default)]
pub struct ClientRegistry {
    clients: Arc<Mutex<HashMap<ConnectionId, mpsc::Sender<Arc<str>>>>>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection's outbound queue.
    pub fn add(&self, connection: ConnectionId, tx: mpsc::Sender<Arc<str>>) {
        self.clients.lock().insert(connection, tx);
    }

    /// Remove a connection. Removing an unknown handle is a no-op.
    pub fn remove(&self, connection: ConnectionId) {
        self.clients.lock().remove(&connection);
    }

    pub fn contains(&self, connection: ConnectionId) -> bool {
        self.clients.lock().contains_key(&connection)
    }

    /// Number of connected clients.
    pub fn len(&self) -> usize {
        self.clients.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn encode(envelope: &Envelope) -> Option<Arc<str>> {
    match wire::encode_envelope(envelope) {
        Ok(text) => Some(Arc::from(text)),
        Err(e) => {
            warn!(kind = %envelope.kind, error = %e, "failed to encode envelope");
            None
        }
    }
}

impl Publisher for ClientRegistry {
    fn broadcast(&self, envelope: &Envelope) {
        let Some(text) = encode(envelope) else {
            return;
        };
        let clients = self.clients.lock();
        debug!(kind = %envelope.kind, recipients = clients.len(), "broadcast");
        for (conn, tx) in clients.iter() {
            if tx.try_send(Arc::clone(&text)).is_err() {
                warn!(conn = %conn, kind = %envelope.kind, "failed to queue broadcast");
            }
        }
    }

    fn send_to(&self, connection: ConnectionId, envelope: &Envelope) -> bool {
        let Some(text) = encode(envelope) else {
            return false;
        };
        let clients = self.clients.lock();
        if let Some(tx) = clients.get(&connection) {
            tx.try_send(text).is_ok()
        } else {
            debug!(conn = %connection, kind = %envelope.kind, "send to unknown connection");
            false
        }
    }
}
