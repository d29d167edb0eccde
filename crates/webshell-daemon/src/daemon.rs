//! Core daemon orchestration.

use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{error, info, warn};
use webshell_protocol::{BusTransport, ClientRegistry, CommandListener, Publisher};

use crate::bus::BusServer;
use crate::command::CommandServer;
use crate::config::Config;
use crate::cursor::{self, CommandCursor};
use crate::dbus::{self, DbusSignals};
use crate::error::DaemonError;
use crate::handlers::{self, Services};
use crate::notifd::{ChannelSignals, NotificationSignal, NotificationSignals, Notifd, SignalFanout};
use crate::session::SessionRegistry;
use crate::shell::{HeadlessShell, Shell};

/// A running daemon.
///
/// Owns every background task and the token that stops them. Dropping it
/// without calling [`Daemon::shutdown`] leaves the tasks running until the
/// runtime exits.
pub struct Daemon {
    cancel: CancellationToken,
    tasks: TaskTracker,
    services: Arc<Services>,
    clients: ClientRegistry,
    signals: Arc<ChannelSignals>,
    bus_addr: Option<SocketAddr>,
    command_socket: Option<PathBuf>,
    shutdown_timeout: Duration,
}

impl Daemon {
    /// Start the daemon with a headless shell built from `config`.
    pub async fn start(config: &Config) -> Result<Self, DaemonError> {
        let shell = Arc::new(HeadlessShell::from_config(config));
        Self::start_with_shell(config, shell).await
    }

    /// Start every subsystem.
    ///
    /// A transport that fails to bind is logged and skipped; the rest of
    /// the daemon keeps running without it.
    pub async fn start_with_shell(
        config: &Config,
        shell: Arc<dyn Shell>,
    ) -> Result<Self, DaemonError> {
        let ip: IpAddr = config
            .daemon
            .bind
            .parse()
            .map_err(|e| DaemonError::Config(format!("invalid bind address: {e}")))?;
        let bind = SocketAddr::new(ip, config.daemon.ipc_port);

        let cancel = CancellationToken::new();
        let tasks = TaskTracker::new();
        let clients = ClientRegistry::new();
        let publisher: Arc<dyn Publisher> = Arc::new(clients.clone());
        let signals = Arc::new(ChannelSignals::default());
        let notifications = config.notifications.enabled;
        let dbus_enabled = notifications && config.notifications.dbus;

        let mut sinks: Vec<Arc<dyn NotificationSignals>> = vec![signals.clone()];
        let dbus_signals = if dbus_enabled {
            let (sink, rx) = DbusSignals::new();
            sinks.push(Arc::new(sink));
            Some(rx)
        } else {
            None
        };

        let notifd = Notifd::with_timeout_override(
            Arc::clone(&publisher),
            Arc::new(SignalFanout::new(sinks)),
            config.notifications.timeout_override_ms,
        );
        let services = Arc::new(Services {
            shell,
            notifd,
            sessions: SessionRegistry::new(),
            publisher: Arc::clone(&publisher),
            runtime: Handle::current(),
        });

        let bus_addr = match BusTransport::bind(bind).await {
            Ok(transport) => {
                let server = BusServer::new(
                    transport,
                    clients.clone(),
                    Arc::new(handlers::bus_router(notifications)),
                    Arc::clone(&services),
                    config.daemon.close_on_malformed,
                );
                let addr = server.local_addr();
                tasks.spawn(server.run(cancel.clone()));
                addr
            }
            Err(e) => {
                error!(addr = %bind, error = %e, "bus transport unavailable");
                None
            }
        };

        let command_socket = match CommandListener::bind(&config.daemon.command_socket) {
            Ok(listener) => {
                let path = listener.path().to_path_buf();
                let server = CommandServer::new(
                    listener,
                    Arc::new(handlers::command_router(notifications)),
                    Arc::clone(&services),
                );
                tasks.spawn(server.run(cancel.clone()));
                Some(path)
            }
            Err(e) => {
                error!(error = %e, "command channel unavailable");
                None
            }
        };

        if let Some(rx) = dbus_signals {
            match dbus::serve(services.notifd.clone()).await {
                Ok(connection) => {
                    tasks.spawn(dbus::run_signal_forwarder(connection, rx, cancel.clone()));
                }
                Err(e) => error!(error = %e, "notification service unavailable"),
            }
        }

        if config.cursor.enabled {
            if let Some(source) = CommandCursor::new(&config.cursor.command) {
                tasks.spawn(cursor::run_poller(
                    Arc::new(source),
                    Arc::clone(&publisher),
                    Duration::from_millis(config.cursor.poll_interval_ms),
                    cancel.clone(),
                ));
            } else {
                warn!("cursor polling enabled with an empty command");
            }
        }

        info!(bus = ?bus_addr, command = ?command_socket, "daemon running");

        Ok(Self {
            cancel,
            tasks,
            services,
            clients,
            signals,
            bus_addr,
            command_socket,
            shutdown_timeout: Duration::from_millis(config.daemon.shutdown_timeout_ms),
        })
    }

    /// Address the bus is listening on, if it bound.
    pub fn bus_addr(&self) -> Option<SocketAddr> {
        self.bus_addr
    }

    /// Path of the command socket, if it bound.
    pub fn command_socket(&self) -> Option<&Path> {
        self.command_socket.as_deref()
    }

    pub fn notifd(&self) -> &Notifd {
        &self.services.notifd
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.services.sessions
    }

    /// Number of connected bus clients.
    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    /// Subscribe to `NotificationClosed` / `ActionInvoked` signals.
    pub fn subscribe_signals(&self) -> broadcast::Receiver<NotificationSignal> {
        self.signals.subscribe()
    }

    /// Stop every loop and wait for the tasks to finish.
    pub async fn shutdown(self) {
        info!("shutting down");
        self.cancel.cancel();
        self.tasks.close();
        if tokio::time::timeout(self.shutdown_timeout, self.tasks.wait())
            .await
            .is_err()
        {
            warn!(timeout = ?self.shutdown_timeout, "tasks still running after shutdown timeout");
        }
        info!("daemon stopped");
    }
}
