//! Notification engine.
//!
//! Owns the live-notification table, id allocation and expiry. Every state
//! change is broadcast on the bus (`notifd-notification`,
//! `notifd-notification-closed`) and reported to a [`NotificationSignals`]
//! sink. The daemon fans those out to in-process subscribers and to the
//! D-Bus service's `NotificationClosed` and `ActionInvoked` signals.
//!
//! Each row carries the abort handle of its expiry task. Close and replace
//! abort it; a generation number guards the window where a timer has
//! already woken up and is waiting for the table lock.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::broadcast;
use tokio::task::AbortHandle;
use tracing::{debug, info, warn};
use webshell_protocol::Publisher;
use webshell_types::message::NotifyPayload;
use webshell_types::{kind, CloseReason, HintValue, Notification, NotificationClosed};

use crate::bus::envelope;

/// Capabilities advertised by `GetCapabilities`.
pub const CAPABILITIES: &[&str] = &[
    "body",
    "actions",
    "icon-static",
    "icon-multi",
    "persistence",
    "sound",
];

/// Result of `GetServerInformation`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerInformation {
    pub name: &'static str,
    pub vendor: &'static str,
    pub version: &'static str,
    pub spec_version: &'static str,
}

const SERVER_INFORMATION: ServerInformation = ServerInformation {
    name: "webshell-notifd",
    vendor: "WebShell",
    version: env!("CARGO_PKG_VERSION"),
    spec_version: "1.3",
};

/// Arguments of a `Notify` call.
#[derive(Debug, Clone, PartialEq)]
pub struct NotifyRequest {
    pub app_name: String,
    /// Id of the notification to replace in place, or 0 for a new one.
    pub replaces_id: u32,
    pub app_icon: String,
    pub summary: String,
    pub body: String,
    pub actions: Vec<String>,
    pub hints: BTreeMap<String, HintValue>,
    /// Milliseconds until expiry; zero or negative never expires.
    pub expire_timeout_ms: i32,
}

impl NotifyRequest {
    pub fn new(summary: impl Into<String>) -> Self {
        Self {
            app_name: String::new(),
            replaces_id: 0,
            app_icon: String::new(),
            summary: summary.into(),
            body: String::new(),
            actions: Vec::new(),
            hints: BTreeMap::new(),
            expire_timeout_ms: webshell_types::notification::NEVER_EXPIRE,
        }
    }
}

impl From<NotifyPayload> for NotifyRequest {
    fn from(p: NotifyPayload) -> Self {
        Self {
            app_name: p.app_name,
            replaces_id: p.replaces_id,
            app_icon: p.app_icon,
            summary: p.summary,
            body: p.body,
            actions: p.actions,
            hints: p.hints,
            expire_timeout_ms: p.expire_timeout,
        }
    }
}

/// Receiver of the notification service's signals.
///
/// Called with the notification table locked; implementations must not
/// block.
pub trait NotificationSignals: Send + Sync {
    fn notification_closed(&self, id: u32, reason: CloseReason);
    fn action_invoked(&self, id: u32, action_key: &str);
}

/// A signal emitted by the notification engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationSignal {
    Closed { id: u32, reason: CloseReason },
    ActionInvoked { id: u32, action: String },
}

/// [`NotificationSignals`] backed by a broadcast channel.
pub struct ChannelSignals {
    tx: broadcast::Sender<NotificationSignal>,
}

impl ChannelSignals {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<NotificationSignal> {
        self.tx.subscribe()
    }
}

impl Default for ChannelSignals {
    fn default() -> Self {
        Self::new(64)
    }
}

impl NotificationSignals for ChannelSignals {
    fn notification_closed(&self, id: u32, reason: CloseReason) {
        info!(id, reason = %reason, "NotificationClosed");
        // No subscribers is fine.
        let _ = self.tx.send(NotificationSignal::Closed { id, reason });
    }

    fn action_invoked(&self, id: u32, action_key: &str) {
        info!(id, action = action_key, "ActionInvoked");
        let _ = self.tx.send(NotificationSignal::ActionInvoked {
            id,
            action: action_key.to_string(),
        });
    }
}

/// Delivers every signal to each sink in turn.
pub struct SignalFanout {
    sinks: Vec<Arc<dyn NotificationSignals>>,
}

impl SignalFanout {
    pub fn new(sinks: Vec<Arc<dyn NotificationSignals>>) -> Self {
        Self { sinks }
    }
}

impl NotificationSignals for SignalFanout {
    fn notification_closed(&self, id: u32, reason: CloseReason) {
        for sink in &self.sinks {
            sink.notification_closed(id, reason);
        }
    }

    fn action_invoked(&self, id: u32, action_key: &str) {
        for sink in &self.sinks {
            sink.action_invoked(id, action_key);
        }
    }
}

struct Entry {
    notification: Notification,
    generation: u64,
    expiry: Option<AbortHandle>,
}

impl Entry {
    fn cancel_expiry(&mut self) {
        if let Some(handle) = self.expiry.take() {
            handle.abort();
        }
    }
}

#[derive(Default)]
struct Table {
    rows: HashMap<u32, Entry>,
    last_id: u32,
    generation: u64,
}

impl Table {
    /// Next fresh id: strictly above every id handed out before, skipping
    /// ids that a replace call has put in the table.
    ///
    /// After `u32::MAX` the counter restarts at 1 (0 is reserved for "no
    /// replace"), so ordering only holds within one cycle. Live ids are
    /// still never reused.
    fn allocate(&mut self) -> u32 {
        loop {
            self.last_id = if let Some(next) = self.last_id.checked_add(1) {
                next
            } else {
                warn!("notification id space exhausted, restarting at 1");
                1
            };
            if !self.rows.contains_key(&self.last_id) {
                return self.last_id;
            }
        }
    }
}

struct Inner {
    table: Mutex<Table>,
    publisher: Arc<dyn Publisher>,
    signals: Arc<dyn NotificationSignals>,
    runtime: Handle,
    timeout_override_ms: Option<i32>,
}

impl Inner {
    /// Remove a row, broadcast the close and emit the signal.
    fn close_locked(&self, table: &mut Table, id: u32, reason: CloseReason) -> bool {
        let Some(mut entry) = table.rows.remove(&id) else {
            return false;
        };
        entry.cancel_expiry();
        if let Some(env) = envelope(kind::NOTIFICATION_CLOSED, &NotificationClosed::new(id, reason)) {
            self.publisher.broadcast(&env);
        }
        self.signals.notification_closed(id, reason);
        debug!(id, reason = %reason, "notification closed");
        true
    }

    fn expire(&self, id: u32, generation: u64) {
        let mut table = self.table.lock();
        match table.rows.get_mut(&id) {
            Some(entry) if entry.generation == generation => {
                // This task is the timer; nothing left to abort.
                entry.expiry = None;
            }
            _ => {
                debug!(id, "expiry for closed or replaced notification");
                return;
            }
        }
        self.close_locked(&mut table, id, CloseReason::Expired);
    }
}

/// The notification engine. Cheap to clone; clones share the table.
#[derive(Clone)]
pub struct Notifd {
    inner: Arc<Inner>,
}

impl Notifd {
    /// Create an engine that broadcasts through `publisher`.
    ///
    /// Must be called from within a Tokio runtime; expiry tasks are spawned
    /// on it.
    pub fn new(publisher: Arc<dyn Publisher>, signals: Arc<dyn NotificationSignals>) -> Self {
        Self::with_timeout_override(publisher, signals, None)
    }

    /// Like [`Notifd::new`], but every notification uses `timeout_ms` (when
    /// set) instead of the expiry requested by the client.
    pub fn with_timeout_override(
        publisher: Arc<dyn Publisher>,
        signals: Arc<dyn NotificationSignals>,
        timeout_ms: Option<i32>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                table: Mutex::new(Table::default()),
                publisher,
                signals,
                runtime: Handle::current(),
                timeout_override_ms: timeout_ms,
            }),
        }
    }

    /// Create or replace a notification and return its id.
    pub fn notify(&self, request: NotifyRequest) -> u32 {
        let expire_timeout_ms = self
            .inner
            .timeout_override_ms
            .unwrap_or(request.expire_timeout_ms);

        let mut table = self.inner.table.lock();
        let id = if request.replaces_id == 0 {
            table.allocate()
        } else {
            request.replaces_id
        };

        table.generation += 1;
        let generation = table.generation;

        let notification = Notification {
            id,
            app_name: request.app_name,
            app_icon: request.app_icon,
            summary: request.summary,
            body: request.body,
            actions: request.actions,
            hints: request.hints,
            expire_timeout_ms,
        };

        let expiry = u64::try_from(expire_timeout_ms)
            .ok()
            .filter(|&ms| ms > 0)
            .map(|ms| self.schedule_expiry(id, generation, Duration::from_millis(ms)));

        if let Some(env) = envelope(kind::NOTIFICATION_CREATED, &notification) {
            self.inner.publisher.broadcast(&env);
        }

        let entry = Entry {
            notification,
            generation,
            expiry,
        };
        if let Some(mut previous) = table.rows.insert(id, entry) {
            previous.cancel_expiry();
            debug!(id, "notification replaced");
        } else {
            debug!(id, expire_timeout_ms, "notification created");
        }
        id
    }

    fn schedule_expiry(&self, id: u32, generation: u64, after: Duration) -> AbortHandle {
        let inner: Weak<Inner> = Arc::downgrade(&self.inner);
        self.inner
            .runtime
            .spawn(async move {
                tokio::time::sleep(after).await;
                if let Some(inner) = inner.upgrade() {
                    inner.expire(id, generation);
                }
            })
            .abort_handle()
    }

    /// Close a notification with the given reason.
    ///
    /// Closing an unknown or already closed id does nothing and returns
    /// `false`.
    pub fn signal_notification_closed(&self, id: u32, reason: CloseReason) -> bool {
        let mut table = self.inner.table.lock();
        let closed = self.inner.close_locked(&mut table, id, reason);
        if !closed {
            debug!(id, reason = %reason, "close for unknown notification");
        }
        closed
    }

    /// `CloseNotification`: close on behalf of the sending application.
    pub fn close_notification(&self, id: u32) -> bool {
        self.signal_notification_closed(id, CloseReason::ClosedByClient)
    }

    /// Report that the user invoked `action_key` on a live notification.
    pub fn signal_action_invoked(&self, id: u32, action_key: &str) -> bool {
        let table = self.inner.table.lock();
        if table.rows.contains_key(&id) {
            self.inner.signals.action_invoked(id, action_key);
            true
        } else {
            debug!(id, action = action_key, "action for unknown notification");
            false
        }
    }

    pub fn get(&self, id: u32) -> Option<Notification> {
        self.inner
            .table
            .lock()
            .rows
            .get(&id)
            .map(|e| e.notification.clone())
    }

    /// Live notifications ordered by id.
    pub fn active(&self) -> Vec<Notification> {
        let mut all: Vec<Notification> = self
            .inner
            .table
            .lock()
            .rows
            .values()
            .map(|e| e.notification.clone())
            .collect();
        all.sort_by_key(|n| n.id);
        all
    }

    pub fn len(&self) -> usize {
        self.inner.table.lock().rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// `GetCapabilities`.
    pub fn capabilities(&self) -> Vec<String> {
        CAPABILITIES.iter().map(ToString::to_string).collect()
    }

    /// `GetServerInformation`.
    pub fn server_information(&self) -> ServerInformation {
        SERVER_INFORMATION
    }
}

#[cfg(test)]
mod tests {
    use webshell_types::{ConnectionId, Envelope};

    use super::*;

    #[derive(Default)]
    struct Recorder {
        sent: Mutex<Vec<Envelope>>,
    }

    impl Recorder {
        fn kinds(&self) -> Vec<String> {
            self.sent.lock().iter().map(|e| e.kind.clone()).collect()
        }

        fn closed(&self) -> Vec<NotificationClosed> {
            self.sent
                .lock()
                .iter()
                .filter(|e| e.kind == kind::NOTIFICATION_CLOSED)
                .map(|e| e.payload_as().unwrap())
                .collect()
        }

        fn clear(&self) {
            self.sent.lock().clear();
        }
    }

    impl Publisher for Recorder {
        fn broadcast(&self, envelope: &Envelope) {
            self.sent.lock().push(envelope.clone());
        }

        fn send_to(&self, _connection: ConnectionId, envelope: &Envelope) -> bool {
            self.sent.lock().push(envelope.clone());
            true
        }
    }

    fn engine() -> (Notifd, Arc<Recorder>, Arc<ChannelSignals>) {
        let recorder = Arc::new(Recorder::default());
        let signals = Arc::new(ChannelSignals::default());
        let notifd = Notifd::new(recorder.clone(), signals.clone());
        (notifd, recorder, signals)
    }

    fn expiring(summary: &str, ms: i32) -> NotifyRequest {
        NotifyRequest {
            expire_timeout_ms: ms,
            ..NotifyRequest::new(summary)
        }
    }

    #[tokio::test]
    async fn fresh_ids_strictly_increase() {
        let (notifd, _, _) = engine();
        let ids: Vec<u32> = (0..50)
            .map(|i| notifd.notify(NotifyRequest::new(format!("n{i}"))))
            .collect();
        assert!(ids.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(notifd.len(), 50);
    }

    #[test]
    fn allocation_restarts_after_max_and_skips_live_ids() {
        let mut table = Table {
            last_id: u32::MAX - 1,
            ..Table::default()
        };
        assert_eq!(table.allocate(), u32::MAX);

        table.rows.insert(
            1,
            Entry {
                notification: Notification {
                    id: 1,
                    app_name: String::new(),
                    app_icon: String::new(),
                    summary: "still live".into(),
                    body: String::new(),
                    actions: Vec::new(),
                    hints: BTreeMap::new(),
                    expire_timeout_ms: -1,
                },
                generation: 0,
                expiry: None,
            },
        );
        assert_eq!(table.allocate(), 2);
    }

    #[tokio::test]
    async fn created_event_carries_projection() {
        let (notifd, recorder, _) = engine();
        let id = notifd.notify(NotifyRequest {
            app_name: "mail".into(),
            body: "3 new".into(),
            actions: vec!["default".into(), "Open".into()],
            ..NotifyRequest::new("Inbox")
        });

        let sent = recorder.sent.lock();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].kind, "notifd-notification");
        assert_eq!(sent[0].payload["id"], id);
        assert_eq!(sent[0].payload["appName"], "mail");
        assert_eq!(sent[0].payload["actions"][1], "Open");
        assert_eq!(sent[0].payload["expireTimeout"], -1);
    }

    #[tokio::test]
    async fn replace_updates_in_place() {
        let (notifd, recorder, _) = engine();
        let id = notifd.notify(NotifyRequest::new("first"));
        recorder.clear();

        let replaced = notifd.notify(NotifyRequest {
            replaces_id: id,
            ..NotifyRequest::new("second")
        });

        assert_eq!(replaced, id);
        assert_eq!(recorder.kinds(), ["notifd-notification"]);
        assert_eq!(notifd.get(id).unwrap().summary, "second");
        assert_eq!(notifd.len(), 1);

        // The allocator did not move.
        assert_eq!(notifd.notify(NotifyRequest::new("third")), id + 1);
    }

    #[tokio::test]
    async fn fresh_ids_skip_rows_created_by_replace() {
        let (notifd, _, _) = engine();
        notifd.notify(NotifyRequest {
            replaces_id: 1,
            ..NotifyRequest::new("squatter")
        });
        assert_eq!(notifd.notify(NotifyRequest::new("fresh")), 2);
    }

    #[tokio::test]
    async fn closing_unknown_id_is_silent() {
        let (notifd, recorder, signals) = engine();
        let mut rx = signals.subscribe();

        assert!(!notifd.signal_notification_closed(999, CloseReason::DismissedByUser));
        assert!(recorder.sent.lock().is_empty());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn close_emits_event_and_signal_once() {
        let (notifd, recorder, signals) = engine();
        let mut rx = signals.subscribe();
        let id = notifd.notify(NotifyRequest::new("x"));

        assert!(notifd.close_notification(id));
        assert!(!notifd.close_notification(id));

        assert_eq!(recorder.closed(), [NotificationClosed { id, reason: 3 }]);
        assert_eq!(
            rx.try_recv().unwrap(),
            NotificationSignal::Closed {
                id,
                reason: CloseReason::ClosedByClient
            }
        );
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn expiry_closes_exactly_once() {
        let (notifd, recorder, signals) = engine();
        let mut rx = signals.subscribe();
        let id = notifd.notify(expiring("soon", 200));

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(notifd.get(id).is_some());

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(notifd.get(id).is_none());
        assert_eq!(recorder.closed(), [NotificationClosed { id, reason: 1 }]);
        assert_eq!(
            rx.try_recv().unwrap(),
            NotificationSignal::Closed {
                id,
                reason: CloseReason::Expired
            }
        );
    }

    #[tokio::test]
    async fn dismiss_before_expiry_wins() {
        let (notifd, recorder, _) = engine();
        let id = notifd.notify(expiring("soon", 200));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(notifd.signal_notification_closed(id, CloseReason::DismissedByUser));

        tokio::time::sleep(Duration::from_millis(350)).await;
        assert_eq!(recorder.closed(), [NotificationClosed { id, reason: 2 }]);
    }

    #[tokio::test]
    async fn replace_reschedules_expiry() {
        let (notifd, recorder, _) = engine();
        let id = notifd.notify(expiring("short", 100));
        notifd.notify(NotifyRequest {
            replaces_id: id,
            ..NotifyRequest::new("sticky")
        });

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(notifd.get(id).is_some());
        assert!(recorder.closed().is_empty());
    }

    #[tokio::test]
    async fn timeout_override_applies() {
        let recorder = Arc::new(Recorder::default());
        let notifd = Notifd::with_timeout_override(
            recorder.clone(),
            Arc::new(ChannelSignals::default()),
            Some(100),
        );
        let id = notifd.notify(NotifyRequest::new("never, unless overridden"));
        assert_eq!(notifd.get(id).unwrap().expire_timeout_ms, 100);

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(notifd.is_empty());
        assert_eq!(recorder.closed().len(), 1);
    }

    #[tokio::test]
    async fn action_signal_requires_live_row() {
        let (notifd, _, signals) = engine();
        let mut rx = signals.subscribe();
        let id = notifd.notify(NotifyRequest::new("x"));

        assert!(notifd.signal_action_invoked(id, "default"));
        assert!(!notifd.signal_action_invoked(id + 1, "default"));

        assert_eq!(
            rx.try_recv().unwrap(),
            NotificationSignal::ActionInvoked {
                id,
                action: "default".into()
            }
        );
        assert!(rx.try_recv().is_err());
        assert!(notifd.get(id).is_some());
    }

    #[tokio::test]
    async fn fanout_reaches_every_sink() {
        let first = Arc::new(ChannelSignals::default());
        let second = Arc::new(ChannelSignals::default());
        let mut rx1 = first.subscribe();
        let mut rx2 = second.subscribe();
        let sinks: Vec<Arc<dyn NotificationSignals>> = vec![first, second];
        let notifd = Notifd::new(
            Arc::new(Recorder::default()),
            Arc::new(SignalFanout::new(sinks)),
        );

        let id = notifd.notify(NotifyRequest::new("x"));
        notifd.close_notification(id);

        let expected = NotificationSignal::Closed {
            id,
            reason: CloseReason::ClosedByClient,
        };
        assert_eq!(rx1.try_recv().unwrap(), expected);
        assert_eq!(rx2.try_recv().unwrap(), expected);
    }

    #[tokio::test]
    async fn service_surface() {
        let (notifd, _, _) = engine();
        assert!(notifd.capabilities().contains(&"actions".to_string()));
        assert_eq!(notifd.capabilities().len(), 6);
        let info = notifd.server_information();
        assert_eq!(info.name, "webshell-notifd");
        assert_eq!(info.spec_version, "1.3");
    }
}
