//! `org.freedesktop.Notifications` on the session bus.
//!
//! Maps the four service methods onto [`Notifd`] and re-emits the engine's
//! signals as `NotificationClosed` / `ActionInvoked`. Signals are raised
//! with the notification table locked, so [`DbusSignals`] only queues them;
//! [`run_signal_forwarder`] emits them from its own task.

use std::collections::{BTreeMap, HashMap};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use webshell_types::{CloseReason, HintValue};
use zbus::object_server::SignalEmitter;
use zbus::zvariant::{OwnedValue, Value};
use zbus::{interface, Connection};

use crate::error::DaemonError;
use crate::notifd::{NotificationSignal, NotificationSignals, Notifd, NotifyRequest};

pub const BUS_NAME: &str = "org.freedesktop.Notifications";
pub const OBJECT_PATH: &str = "/org/freedesktop/Notifications";

/// The exported notification server object.
pub struct NotificationServer {
    notifd: Notifd,
}

impl NotificationServer {
    pub fn new(notifd: Notifd) -> Self {
        Self { notifd }
    }
}

#[interface(name = "org.freedesktop.Notifications")]
impl NotificationServer {
    #[allow(clippy::too_many_arguments)]
    fn notify(
        &self,
        app_name: String,
        replaces_id: u32,
        app_icon: String,
        summary: String,
        body: String,
        actions: Vec<String>,
        hints: HashMap<String, OwnedValue>,
        expire_timeout: i32,
    ) -> u32 {
        let hints: BTreeMap<String, HintValue> = hints
            .into_iter()
            .filter_map(|(key, value)| match hint_value(&value) {
                Some(hint) => Some((key, hint)),
                None => {
                    debug!(hint = %key, "dropping unsupported hint");
                    None
                }
            })
            .collect();

        let id = self.notifd.notify(NotifyRequest {
            app_name,
            replaces_id,
            app_icon,
            summary,
            body,
            actions,
            hints,
            expire_timeout_ms: expire_timeout,
        });
        debug!(id, "Notify");
        id
    }

    fn close_notification(&self, id: u32) {
        self.notifd.close_notification(id);
    }

    fn get_capabilities(&self) -> Vec<String> {
        self.notifd.capabilities()
    }

    #[zbus(out_args("name", "vendor", "version", "spec_version"))]
    fn get_server_information(&self) -> (String, String, String, String) {
        let info = self.notifd.server_information();
        (
            info.name.to_string(),
            info.vendor.to_string(),
            info.version.to_string(),
            info.spec_version.to_string(),
        )
    }

    #[zbus(signal)]
    async fn notification_closed(
        emitter: &SignalEmitter<'_>,
        id: u32,
        reason: u32,
    ) -> zbus::Result<()>;

    #[zbus(signal)]
    async fn action_invoked(
        emitter: &SignalEmitter<'_>,
        id: u32,
        action_key: &str,
    ) -> zbus::Result<()>;
}

/// Scalar hints are kept; arrays, structs (`image-data`) and the like are
/// not carried on the bus projection.
fn hint_value(value: &Value<'_>) -> Option<HintValue> {
    let hint = match value {
        Value::Bool(b) => HintValue::Bool(*b),
        Value::U8(n) => HintValue::Int(i64::from(*n)),
        Value::I16(n) => HintValue::Int(i64::from(*n)),
        Value::U16(n) => HintValue::Int(i64::from(*n)),
        Value::I32(n) => HintValue::Int(i64::from(*n)),
        Value::U32(n) => HintValue::Int(i64::from(*n)),
        Value::I64(n) => HintValue::Int(*n),
        Value::U64(n) => HintValue::Int(i64::try_from(*n).ok()?),
        Value::F64(f) => HintValue::Float(*f),
        Value::Str(s) => HintValue::Str(s.as_str().to_string()),
        Value::Value(inner) => return hint_value(inner),
        _ => return None,
    };
    Some(hint)
}

/// [`NotificationSignals`] that queues signals for [`run_signal_forwarder`].
pub struct DbusSignals {
    tx: mpsc::UnboundedSender<NotificationSignal>,
}

impl DbusSignals {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<NotificationSignal>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl NotificationSignals for DbusSignals {
    fn notification_closed(&self, id: u32, reason: CloseReason) {
        // Fails only once the forwarder is gone.
        let _ = self.tx.send(NotificationSignal::Closed { id, reason });
    }

    fn action_invoked(&self, id: u32, action_key: &str) {
        let _ = self.tx.send(NotificationSignal::ActionInvoked {
            id,
            action: action_key.to_string(),
        });
    }
}

/// Connect to the session bus, export the server and claim [`BUS_NAME`].
pub async fn serve(notifd: Notifd) -> Result<Connection, DaemonError> {
    let connection = zbus::connection::Builder::session()?
        .name(BUS_NAME)?
        .serve_at(OBJECT_PATH, NotificationServer::new(notifd))?
        .build()
        .await?;
    info!(name = BUS_NAME, path = OBJECT_PATH, "notification service registered");
    Ok(connection)
}

/// Emit queued signals until `cancel` fires. Dropping the connection on
/// return releases the bus name.
pub async fn run_signal_forwarder(
    connection: Connection,
    mut signals: mpsc::UnboundedReceiver<NotificationSignal>,
    cancel: CancellationToken,
) {
    let emitter = match SignalEmitter::new(&connection, OBJECT_PATH) {
        Ok(emitter) => emitter,
        Err(e) => {
            error!(error = %e, "cannot emit notification signals");
            return;
        }
    };

    loop {
        let signal = tokio::select! {
            () = cancel.cancelled() => break,
            signal = signals.recv() => signal,
        };
        let Some(signal) = signal else { break };

        let result = match &signal {
            NotificationSignal::Closed { id, reason } => {
                NotificationServer::notification_closed(&emitter, *id, reason.code()).await
            }
            NotificationSignal::ActionInvoked { id, action } => {
                NotificationServer::action_invoked(&emitter, *id, action).await
            }
        };
        if let Err(e) = result {
            warn!(signal = ?signal, error = %e, "failed to emit notification signal");
        }
    }
    debug!("notification service stopped");
}
