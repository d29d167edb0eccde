//! Pub/sub adapter: accepts widget connections on the WebSocket bus and
//! feeds their envelopes into the router.
//!
//! Every connection gets a reader loop (this module) and a writer task
//! draining the connection's outbound queue in the [`ClientRegistry`].
//! Handlers run synchronously in the reader loop, so a slow handler only
//! stalls its own connection.

use std::net::SocketAddr;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};
use webshell_protocol::{BusTransport, ClientRegistry, IncomingConnection, Inbound};
use webshell_types::message::HandshakePayload;
use webshell_types::{kind, ConnectionId, Envelope};

use crate::handlers::{ClientContext, Services};
use crate::router::Router;

/// Outbound messages queued per connection before broadcasts are dropped.
const OUTBOUND_QUEUE: usize = 256;

/// Build an envelope from a typed payload, logging if it cannot be encoded.
pub(crate) fn envelope<T: Serialize>(kind: &str, payload: &T) -> Option<Envelope> {
    match Envelope::with_payload(kind, payload) {
        Ok(env) => Some(env),
        Err(e) => {
            warn!(kind, error = %e, "failed to encode payload");
            None
        }
    }
}

/// The pub/sub server.
pub struct BusServer {
    transport: BusTransport,
    clients: ClientRegistry,
    router: Arc<Router<ClientContext>>,
    services: Arc<Services>,
    close_on_malformed: bool,
}

impl BusServer {
    pub fn new(
        transport: BusTransport,
        clients: ClientRegistry,
        router: Arc<Router<ClientContext>>,
        services: Arc<Services>,
        close_on_malformed: bool,
    ) -> Self {
        Self {
            transport,
            clients,
            router,
            services,
            close_on_malformed,
        }
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.transport.local_addr().ok()
    }

    /// Accept connections until `cancel` fires, then wait for every
    /// connection task to finish.
    pub async fn run(self, cancel: CancellationToken) {
        let connections = TaskTracker::new();

        loop {
            let incoming = tokio::select! {
                () = cancel.cancelled() => break,
                result = self.transport.accept() => result,
            };
            match incoming {
                Ok(incoming) => {
                    let conn = ConnectionTask {
                        clients: self.clients.clone(),
                        router: Arc::clone(&self.router),
                        services: Arc::clone(&self.services),
                        close_on_malformed: self.close_on_malformed,
                    };
                    connections.spawn(conn.run(incoming, cancel.clone()));
                }
                Err(e) => warn!(error = %e, "bus accept error"),
            }
        }

        connections.close();
        connections.wait().await;
        debug!("bus server stopped");
    }
}

struct ConnectionTask {
    clients: ClientRegistry,
    router: Arc<Router<ClientContext>>,
    services: Arc<Services>,
    close_on_malformed: bool,
}

impl ConnectionTask {
    async fn run(self, incoming: IncomingConnection, cancel: CancellationToken) {
        let remote = incoming.remote_address();
        let conn = match incoming.upgrade().await {
            Ok(conn) => conn,
            Err(e) => {
                debug!(remote = %remote, error = %e, "websocket upgrade failed");
                return;
            }
        };

        let id = ConnectionId::new();
        let (mut sender, mut receiver) = conn.split();
        let (tx, mut rx) = mpsc::channel::<Arc<str>>(OUTBOUND_QUEUE);
        self.clients.add(id, tx);
        info!(conn = %id, remote = %remote, "client connected");

        // Ends once the registry drops the queue's sender.
        let writer = tokio::spawn(async move {
            while let Some(text) = rx.recv().await {
                if let Err(e) = sender.send_text(text.to_string()).await {
                    debug!(conn = %id, error = %e, "write failed");
                    break;
                }
            }
            let _ = sender.close().await;
        });

        let ctx = ClientContext {
            services: Arc::clone(&self.services),
            connection: id,
        };

        loop {
            let inbound = tokio::select! {
                () = cancel.cancelled() => break,
                inbound = receiver.recv() => inbound,
            };
            match inbound {
                Ok(Some(Inbound::Envelope(env))) => self.handle(&ctx, &env),
                Ok(Some(Inbound::Malformed(e))) => {
                    warn!(conn = %id, error = %e, "malformed envelope");
                    if self.close_on_malformed {
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    debug!(conn = %id, error = %e, "read failed");
                    break;
                }
            }
        }

        self.clients.remove(id);
        self.services.sessions.remove(id);
        let _ = writer.await;
        info!(conn = %id, "client disconnected");
    }

    fn handle(&self, ctx: &ClientContext, env: &Envelope) {
        if env.kind == kind::HANDSHAKE {
            match env.payload_as::<HandshakePayload>() {
                Ok(hs) => {
                    self.services
                        .sessions
                        .register(ctx.connection, hs.monitor_id, &hs.widget_name);
                    info!(
                        conn = %ctx.connection,
                        monitor_id = hs.monitor_id,
                        widget = %hs.widget_name,
                        "handshake"
                    );
                }
                Err(e) => warn!(conn = %ctx.connection, error = %e, "malformed handshake"),
            }
            return;
        }

        debug!(conn = %ctx.connection, kind = %env.kind, "dispatch");
        self.router.dispatch(&env.kind, ctx, &env.payload);
    }
}
