//! Built-in message handlers for the bus and the command channel.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::runtime::Handle;
use tracing::{debug, info, warn};
use webshell_protocol::Publisher;
use webshell_types::message::{
    ApplicationInfo, ApplicationResult, ClickRegionPayload, KeyboardInteractivityPayload,
    MonitorInfoResponse, NotificationActionPayload, NotificationIdPayload, NotifyPayload,
    RunApplicationPayload, SetVisiblePayload, ToggleVisiblePayload,
};
use webshell_types::{kind, ClickRegion, CloseReason, ConnectionId, Session};

use crate::bus::envelope;
use crate::error::HandlerError;
use crate::notifd::{Notifd, NotifyRequest};
use crate::router::Router;
use crate::session::SessionRegistry;
use crate::shell::{Shell, ShellError};

/// Everything a handler can reach.
pub struct Services {
    pub shell: Arc<dyn Shell>,
    pub notifd: Notifd,
    pub sessions: SessionRegistry,
    pub publisher: Arc<dyn Publisher>,
    /// Runtime used for work handed off by handlers (application launches).
    pub runtime: Handle,
}

/// Handler context on the bus: the services plus the sending connection.
#[derive(Clone)]
pub struct ClientContext {
    pub services: Arc<Services>,
    pub connection: ConnectionId,
}

impl ClientContext {
    /// The session of the sending connection, for handlers that need one.
    fn session(&self) -> Result<Session, HandlerError> {
        self.services
            .sessions
            .lookup(self.connection)
            .ok_or(HandlerError::SessionMissing(self.connection))
    }

    /// Send a typed payload back to the sending connection only.
    fn reply<T: Serialize>(&self, kind: &str, payload: &T) {
        if let Some(env) = envelope(kind, payload) {
            if !self.services.publisher.send_to(self.connection, &env) {
                warn!(conn = %self.connection, kind, "failed to queue reply");
            }
        }
    }
}

fn decode<T: DeserializeOwned>(payload: &Value) -> Result<T, HandlerError> {
    Ok(T::deserialize(payload)?)
}

/// Router for the bus with every built-in listener registered.
pub fn bus_router(notifications: bool) -> Router<ClientContext> {
    let router = Router::new();

    router.listen(kind::WINDOW_UPDATE_CLICK_REGION, |ctx: &ClientContext, payload| {
        let session = ctx.session()?;
        let p: ClickRegionPayload = decode(payload)?;
        let region = ClickRegion {
            x: p.x,
            y: p.y,
            width: p.width,
            height: p.height,
        };
        ctx.services
            .shell
            .set_click_region(&session.widget_name, session.monitor_id, &p.name, region)?;
        Ok(())
    });

    router.listen(kind::WIDGET_SET_KEYBOARD_INTERACTIVITY, |ctx: &ClientContext, payload| {
        let session = ctx.session()?;
        let p: KeyboardInteractivityPayload = decode(payload)?;
        ctx.services.shell.set_keyboard_interactivity(
            &session.widget_name,
            session.monitor_id,
            p.interactive,
        )?;
        Ok(())
    });

    router.listen(kind::MONITOR_INFO_REQUEST, |ctx: &ClientContext, _| {
        let session = ctx.session()?;
        let response = match ctx.services.shell.monitor(session.monitor_id) {
            Some(m) => MonitorInfoResponse {
                id: m.id,
                width: i64::from(m.width),
                height: i64::from(m.height),
            },
            None => MonitorInfoResponse {
                id: session.monitor_id,
                width: -1,
                height: -1,
            },
        };
        ctx.reply(kind::MONITOR_INFO_RESPONSE, &response);
        Ok(())
    });

    router.listen(kind::APPLICATION_LIST_REQUEST, |ctx: &ClientContext, _| {
        let apps = ctx.services.shell.applications();
        ctx.reply(kind::APPLICATION_LIST_RESPONSE, &apps);
        Ok(())
    });

    router.listen(kind::APPLICATION_RUN, |ctx: &ClientContext, payload| {
        let p: RunApplicationPayload = decode(payload)?;
        let app = ctx
            .services
            .shell
            .application(&p.app_id)
            .ok_or(ShellError::ApplicationNotFound(p.app_id))?;
        launch(&ctx.services, &p.prefix, app);
        Ok(())
    });

    if notifications {
        router.listen(kind::NOTIFICATION_DISMISS, |ctx: &ClientContext, payload| {
            let p: NotificationIdPayload = decode(payload)?;
            ctx.services
                .notifd
                .signal_notification_closed(p.id, CloseReason::DismissedByUser);
            Ok(())
        });

        router.listen(kind::NOTIFICATION_ACTION, |ctx: &ClientContext, payload| {
            let p: NotificationActionPayload = decode(payload)?;
            ctx.services.notifd.signal_action_invoked(p.id, &p.action);
            Ok(())
        });
    }

    router
}

/// Reply message produced by a command handler; `None` keeps the default.
pub type CommandOutput = Option<String>;

/// Router for the command channel. Each type has exactly one listener.
pub fn command_router(notifications: bool) -> Router<Services, CommandOutput> {
    let router = Router::new();

    router.replace(kind::WIDGET_SET_VISIBLE, |services: &Services, payload| {
        let p: SetVisiblePayload = decode(payload)?;
        services
            .shell
            .set_visible(&p.widget_name, p.monitor_id, p.visible)?;
        Ok(None)
    });

    router.replace(kind::WIDGET_TOGGLE_VISIBLE, |services: &Services, payload| {
        let p: ToggleVisiblePayload = decode(payload)?;
        let visible = services.shell.is_visible(&p.widget_name, p.monitor_id)?;
        services
            .shell
            .set_visible(&p.widget_name, p.monitor_id, !visible)?;
        Ok(None)
    });

    if notifications {
        router.replace(kind::NOTIFY, |services: &Services, payload| {
            let p: NotifyPayload = decode(payload)?;
            let id = services.notifd.notify(NotifyRequest::from(p));
            info!(id, "notification posted from command channel");
            Ok(Some(id.to_string()))
        });

        router.replace(kind::NOTIFY_CLOSE, |services: &Services, payload| {
            let p: NotificationIdPayload = decode(payload)?;
            services.notifd.close_notification(p.id);
            Ok(None)
        });
    }

    router
}

/// Shell command line that launches `app`, with `prefix` in front.
fn launch_command(prefix: &str, exec: &str) -> String {
    let prefix = prefix.trim();
    if prefix.is_empty() {
        exec.to_string()
    } else {
        format!("{prefix} {exec}")
    }
}

/// Run the application off the dispatching task and broadcast its exit
/// status when it finishes.
fn launch(services: &Services, prefix: &str, app: ApplicationInfo) {
    let command = launch_command(prefix, &app.exec);
    let publisher = Arc::clone(&services.publisher);
    debug!(app = %app.id, command = %command, "launching application");

    services.runtime.spawn(async move {
        let status = match tokio::process::Command::new("sh")
            .arg("-c")
            .arg(&command)
            .status()
            .await
        {
            Ok(status) => status.code().unwrap_or(-1),
            Err(e) => {
                warn!(app = %app.id, error = %e, "failed to launch application");
                -1
            }
        };
        if status != 0 {
            warn!(app = %app.id, status, "application exited with failure");
        }
        let result = ApplicationResult {
            id: app.id,
            name: app.name,
            status,
        };
        if let Some(env) = envelope(kind::APPLICATION_RESULT, &result) {
            publisher.broadcast(&env);
        }
    });
}
