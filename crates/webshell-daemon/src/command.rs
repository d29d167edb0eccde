//! Command channel server.
//!
//! Serves one caller at a time: a connection is read to completion (or
//! until it goes idle) before the next one is accepted, so external
//! commands are strictly serialised.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use webshell_protocol::{CommandConnection, CommandListener, Inbound, ProtocolError};
use webshell_types::{CommandReply, Envelope};

use crate::handlers::{CommandOutput, Services};
use crate::router::Router;

/// How long a caller may stay silent before its connection is dropped.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

pub struct CommandServer {
    listener: CommandListener,
    router: Arc<Router<Services, CommandOutput>>,
    services: Arc<Services>,
}

impl CommandServer {
    pub fn new(
        listener: CommandListener,
        router: Arc<Router<Services, CommandOutput>>,
        services: Arc<Services>,
    ) -> Self {
        Self {
            listener,
            router,
            services,
        }
    }

    /// Serve callers until `cancel` fires.
    pub async fn run(self, cancel: CancellationToken) {
        info!(path = %self.listener.path().display(), "command channel serving");
        loop {
            let conn = tokio::select! {
                () = cancel.cancelled() => break,
                result = self.listener.accept() => match result {
                    Ok(conn) => conn,
                    Err(e) => {
                        warn!(error = %e, "command accept error");
                        continue;
                    }
                },
            };

            tokio::select! {
                () = cancel.cancelled() => break,
                () = self.serve(conn) => {}
            }
        }
        debug!("command channel stopped");
    }

    async fn serve(&self, mut conn: CommandConnection) {
        loop {
            let request = match tokio::time::timeout(REQUEST_TIMEOUT, conn.recv_request()).await {
                Ok(Ok(Some(request))) => request,
                Ok(Ok(None)) => return,
                Ok(Err(e @ ProtocolError::FrameTooLarge { .. })) => {
                    // The oversized body is still unread, so the stream
                    // cannot be resynchronised after this reply.
                    warn!(error = %e, "oversized command");
                    let reply = CommandReply::failure("Malformed request", e.to_string());
                    if let Err(e) = conn.reply(&reply).await {
                        debug!(error = %e, "failed to send command reply");
                    }
                    return;
                }
                Ok(Err(e)) => {
                    debug!(error = %e, "command connection failed");
                    return;
                }
                Err(_) => {
                    debug!("command caller went idle");
                    return;
                }
            };

            let reply = match request {
                Inbound::Envelope(env) => execute(&self.router, &self.services, &env),
                Inbound::Malformed(e) => {
                    warn!(error = %e, "malformed command");
                    CommandReply::failure("Malformed request", e)
                }
            };

            if let Err(e) = conn.reply(&reply).await {
                debug!(error = %e, "failed to send command reply");
                return;
            }
        }
    }
}

/// Run one command through the router and turn the outcome into a reply.
///
/// A handler that returns a message (the id of a posted notification, for
/// instance) has it sent back in place of the generic success message.
pub fn execute(
    router: &Router<Services, CommandOutput>,
    services: &Services,
    request: &Envelope,
) -> CommandReply {
    let outcome = router.dispatch(&request.kind, services, &request.payload);
    if outcome.is_unhandled() {
        return CommandReply::failure("No listener for this message type", request.kind.clone());
    }
    if let Some(e) = outcome.failures.first() {
        return CommandReply::failure("Listener execution failed", e.to_string());
    }
    debug!(kind = %request.kind, "command executed");
    let message = outcome.outputs.into_iter().flatten().next();
    CommandReply::success(message.unwrap_or_else(|| "Listener executed successfully".to_string()))
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tokio::runtime::Handle;
    use webshell_protocol::ClientRegistry;

    use super::*;
    use crate::config::{Config, WidgetConfig};
    use crate::error::HandlerError;
    use crate::notifd::{ChannelSignals, Notifd};
    use crate::session::SessionRegistry;
    use crate::shell::HeadlessShell;

    fn services() -> Services {
        let config = Config {
            widgets: vec![WidgetConfig {
                name: "bar".into(),
                monitors: vec![],
                hidden: true,
            }],
            ..Config::default()
        };
        let publisher = Arc::new(ClientRegistry::new());
        Services {
            shell: Arc::new(HeadlessShell::from_config(&config)),
            notifd: Notifd::new(publisher.clone(), Arc::new(ChannelSignals::default())),
            sessions: SessionRegistry::new(),
            publisher,
            runtime: Handle::current(),
        }
    }

    #[tokio::test]
    async fn success_reply() {
        let services = services();
        let router = Router::new();
        router.replace("widget-set-visible", |_: &Services, _| Ok(None));

        let reply = execute(&router, &services, &Envelope::new("widget-set-visible", json!({})));
        assert_eq!(reply, CommandReply::success("Listener executed successfully"));
    }

    #[tokio::test]
    async fn no_listener_reply_names_the_type() {
        let services = services();
        let router: Router<Services, CommandOutput> = Router::new();

        let reply = execute(&router, &services, &Envelope::new("frobnicate", json!({})));
        assert_eq!(
            reply,
            CommandReply::failure("No listener for this message type", "frobnicate")
        );
    }

    #[tokio::test]
    async fn handler_failure_becomes_details() {
        let services = services();
        let router = Router::new();
        router.replace("x", |_: &Services, _| {
            Err(HandlerError::InvalidPayload("missing field".into()))
        });

        let reply = execute(&router, &services, &Envelope::new("x", json!({})));
        assert_eq!(
            reply,
            CommandReply::failure("Listener execution failed", "invalid payload: missing field")
        );
    }

    #[tokio::test]
    async fn serves_requests_over_the_socket() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cmd.sock");
        let services = Arc::new(services());
        let server = CommandServer::new(
            CommandListener::bind(&path).unwrap(),
            Arc::new(crate::handlers::command_router(true)),
            Arc::clone(&services),
        );
        let cancel = CancellationToken::new();
        let task = tokio::spawn(server.run(cancel.clone()));

        let client = webshell_protocol::CommandClient::new(&path);
        let reply = client
            .call(
                "widget-set-visible",
                json!({"widgetName": "bar", "monitorId": 0, "visible": true}),
                Duration::from_secs(2),
            )
            .await
            .unwrap();
        assert!(reply.is_success());
        assert!(services.shell.is_visible("bar", 0).unwrap());

        let reply = client
            .call("widget-set-visible", json!({"visible": true}), Duration::from_secs(2))
            .await
            .unwrap();
        assert!(!reply.is_success());

        cancel.cancel();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn notify_reply_carries_the_id() {
        let services = services();
        let router = crate::handlers::command_router(true);

        let reply = execute(
            &router,
            &services,
            &Envelope::new("notifd-notify", json!({"summary": "hi"})),
        );
        let live = services.notifd.active();
        assert_eq!(live.len(), 1);
        assert_eq!(reply, CommandReply::success(live[0].id.to_string()));

        let reply = execute(
            &router,
            &services,
            &Envelope::new("notifd-notify", json!({"summary": "again"})),
        );
        assert_eq!(reply, CommandReply::success((live[0].id + 1).to_string()));
    }

    #[tokio::test]
    async fn oversized_request_gets_an_error_reply() {
        use tokio::io::AsyncWriteExt;
        use webshell_protocol::wire::MAX_MESSAGE_SIZE;
        use webshell_protocol::FrameReceiver;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cmd.sock");
        let server = CommandServer::new(
            CommandListener::bind(&path).unwrap(),
            Arc::new(crate::handlers::command_router(true)),
            Arc::new(services()),
        );
        let cancel = CancellationToken::new();
        let task = tokio::spawn(server.run(cancel.clone()));

        let mut stream = tokio::net::UnixStream::connect(&path).await.unwrap();
        stream
            .write_all(&(MAX_MESSAGE_SIZE + 1).to_be_bytes())
            .await
            .unwrap();

        let mut rx = FrameReceiver::new(stream);
        let reply: CommandReply = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        match reply {
            CommandReply::Failure { error, details } => {
                assert_eq!(error, "Malformed request");
                assert!(details.contains("exceeds maximum"));
            }
            other @ CommandReply::Success { .. } => panic!("expected failure, got {other:?}"),
        }

        cancel.cancel();
        task.await.unwrap();
    }
}
