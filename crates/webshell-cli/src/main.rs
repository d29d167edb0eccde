//! webshell CLI: runs the daemon and sends it one-shot commands.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use serde_json::Value;
use tracing_subscriber::EnvFilter;
use webshell_daemon::{setup, Daemon};
use webshell_protocol::{CommandClient, CommandError};
use webshell_types::message::{
    NotificationIdPayload, NotifyPayload, SetVisiblePayload, ToggleVisiblePayload,
};
use webshell_types::{kind, CommandReply, MonitorId};

#[derive(Parser)]
#[command(
    name = "wss",
    about = "Desktop shell daemon and its command-line client",
    version,
    propagate_version = true
)]
struct Cli {
    /// Path to configuration file.
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Enable debug logging.
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the daemon and run until interrupted.
    Start,

    /// Send one command to the running daemon.
    Dispatch {
        /// How long to wait for the daemon's reply.
        #[arg(long, default_value_t = 1000)]
        timeout_ms: u64,

        /// Command socket path (defaults to the configured one).
        #[arg(long)]
        socket: Option<PathBuf>,

        #[command(subcommand)]
        action: DispatchAction,
    },
}

#[derive(Subcommand)]
enum DispatchAction {
    /// Show a widget.
    Show {
        widget: String,
        #[arg(default_value_t = 0)]
        monitor: MonitorId,
    },
    /// Hide a widget.
    Hide {
        widget: String,
        #[arg(default_value_t = 0)]
        monitor: MonitorId,
    },
    /// Toggle a widget's visibility.
    Toggle {
        widget: String,
        #[arg(default_value_t = 0)]
        monitor: MonitorId,
    },
    /// Post a notification and print its id.
    Notify {
        summary: String,
        #[arg(long, default_value = "")]
        body: String,
        #[arg(long, default_value = "wss")]
        app_name: String,
        /// Expiry in milliseconds; -1 never expires.
        #[arg(long, default_value_t = -1, allow_hyphen_values = true)]
        timeout: i32,
    },
    /// Close a notification by id.
    Close { id: u32 },
}

impl DispatchAction {
    /// Command name and payload to send.
    fn into_request(self) -> anyhow::Result<(&'static str, Value)> {
        let request = match self {
            Self::Show { widget, monitor } => (
                kind::WIDGET_SET_VISIBLE,
                serde_json::to_value(SetVisiblePayload {
                    widget_name: widget,
                    monitor_id: monitor,
                    visible: true,
                })?,
            ),
            Self::Hide { widget, monitor } => (
                kind::WIDGET_SET_VISIBLE,
                serde_json::to_value(SetVisiblePayload {
                    widget_name: widget,
                    monitor_id: monitor,
                    visible: false,
                })?,
            ),
            Self::Toggle { widget, monitor } => (
                kind::WIDGET_TOGGLE_VISIBLE,
                serde_json::to_value(ToggleVisiblePayload {
                    widget_name: widget,
                    monitor_id: monitor,
                })?,
            ),
            Self::Notify {
                summary,
                body,
                app_name,
                timeout,
            } => (
                kind::NOTIFY,
                serde_json::to_value(NotifyPayload {
                    app_name,
                    replaces_id: 0,
                    app_icon: String::new(),
                    summary,
                    body,
                    actions: Vec::new(),
                    hints: std::collections::BTreeMap::new(),
                    expire_timeout: timeout,
                })?,
            ),
            Self::Close { id } => (
                kind::NOTIFY_CLOSE,
                serde_json::to_value(NotificationIdPayload { id })?,
            ),
        };
        Ok(request)
    }
}

fn init_tracing(debug: bool, default_level: &str) {
    let level = if debug { "debug" } else { default_level };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)),
        )
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Start => {
            let config = setup::load_config(cli.config.as_deref())?;
            init_tracing(cli.debug, &config.daemon.log_level);
            tracing::info!(config = ?cli.config, "starting webshell daemon");

            let daemon = Daemon::start(&config).await?;
            tokio::signal::ctrl_c()
                .await
                .context("failed to listen for Ctrl-C")?;
            daemon.shutdown().await;
        }
        Commands::Dispatch {
            timeout_ms,
            socket,
            action,
        } => {
            init_tracing(cli.debug, "warn");
            let socket = match socket {
                Some(path) => path,
                None => setup::load_config(cli.config.as_deref())?.daemon.command_socket,
            };
            let (command, payload) = action.into_request()?;
            let timeout = Duration::from_millis(timeout_ms);

            match CommandClient::new(socket).call(command, payload, timeout).await {
                Ok(CommandReply::Success { message, .. }) => println!("{message}"),
                Ok(CommandReply::Failure { error, details }) => bail!("{error}: {details}"),
                Err(CommandError::Timeout(d)) => {
                    bail!("no reply from the daemon within {} ms", d.as_millis())
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    Ok(())
}
