//! Type-keyed listener registry shared by the bus and the command channel.
//!
//! Handlers for one message type run in registration order on the
//! dispatching task. A failing handler does not stop the ones after it;
//! the caller gets every output and every failure back in a
//! [`DispatchOutcome`] and decides what to do with them.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::HandlerError;

/// A registered message handler producing `O` on success.
pub type Handler<C, O = ()> = Arc<dyn Fn(&C, &Value) -> Result<O, HandlerError> + Send + Sync>;

/// Handle returned by registration, used to remove a listener again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Result of dispatching one message.
#[derive(Debug)]
pub struct DispatchOutcome<O = ()> {
    /// Number of handlers that ran.
    pub invoked: usize,
    /// Values returned by the handlers that succeeded, in invocation order.
    pub outputs: Vec<O>,
    /// Errors returned by handlers, in invocation order.
    pub failures: Vec<HandlerError>,
}

impl<O> Default for DispatchOutcome<O> {
    fn default() -> Self {
        Self {
            invoked: 0,
            outputs: Vec::new(),
            failures: Vec::new(),
        }
    }
}

impl<O> DispatchOutcome<O> {
    /// No handler was registered for the type.
    pub fn is_unhandled(&self) -> bool {
        self.invoked == 0
    }

    pub fn is_ok(&self) -> bool {
        self.failures.is_empty()
    }
}

struct Listeners<C, O> {
    by_kind: HashMap<String, Vec<(ListenerId, Handler<C, O>)>>,
    next_id: u64,
}

/// Listener registry keyed by message type.
///
/// `C` is the context handed to every handler: per-connection state on the
/// bus, the daemon services on the command channel. `O` is what a handler
/// returns on success; the command channel uses it for the reply message.
pub struct Router<C, O = ()> {
    listeners: Mutex<Listeners<C, O>>,
}

impl<C, O> Default for Router<C, O> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C, O> Router<C, O> {
    pub fn new() -> Self {
        Self {
            listeners: Mutex::new(Listeners {
                by_kind: HashMap::new(),
                next_id: 0,
            }),
        }
    }

    /// Append a handler for `kind`. Every handler registered for a type runs.
    pub fn listen<F>(&self, kind: &str, handler: F) -> ListenerId
    where
        F: Fn(&C, &Value) -> Result<O, HandlerError> + Send + Sync + 'static,
    {
        let mut listeners = self.listeners.lock();
        let id = ListenerId(listeners.next_id);
        listeners.next_id += 1;
        listeners
            .by_kind
            .entry(kind.to_string())
            .or_default()
            .push((id, Arc::new(handler)));
        debug!(kind, "listener registered");
        id
    }

    /// Register `handler` as the only listener for `kind`.
    ///
    /// Any listener already registered for the type is dropped with a
    /// warning.
    pub fn replace<F>(&self, kind: &str, handler: F) -> ListenerId
    where
        F: Fn(&C, &Value) -> Result<O, HandlerError> + Send + Sync + 'static,
    {
        let mut listeners = self.listeners.lock();
        let id = ListenerId(listeners.next_id);
        listeners.next_id += 1;
        let previous = listeners
            .by_kind
            .insert(kind.to_string(), vec![(id, Arc::new(handler))]);
        if previous.is_some_and(|p| !p.is_empty()) {
            warn!(kind, "replacing existing listener");
        }
        id
    }

    /// Remove a listener. Returns `false` if it was not registered.
    pub fn unlisten(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.lock();
        let mut removed = false;
        listeners.by_kind.retain(|_, handlers| {
            let before = handlers.len();
            handlers.retain(|(hid, _)| *hid != id);
            removed |= handlers.len() != before;
            !handlers.is_empty()
        });
        removed
    }

    pub fn has_listener(&self, kind: &str) -> bool {
        self.listeners.lock().by_kind.contains_key(kind)
    }

    /// Run every handler registered for `kind`, in registration order.
    ///
    /// The handler list is snapshotted first so handlers may register or
    /// remove listeners without deadlocking.
    pub fn dispatch(&self, kind: &str, ctx: &C, payload: &Value) -> DispatchOutcome<O> {
        let handlers: Vec<Handler<C, O>> = self
            .listeners
            .lock()
            .by_kind
            .get(kind)
            .map(|handlers| handlers.iter().map(|(_, h)| Arc::clone(h)).collect())
            .unwrap_or_default();

        let mut outcome = DispatchOutcome::default();
        if handlers.is_empty() {
            warn!(kind, "no listener for message type");
            return outcome;
        }

        for (index, handler) in handlers.iter().enumerate() {
            outcome.invoked += 1;
            match handler(ctx, payload) {
                Ok(output) => outcome.outputs.push(output),
                Err(e) => {
                    warn!(kind, handler = index, error = %e, "handler failed");
                    outcome.failures.push(e);
                }
            }
        }
        outcome
    }
}
