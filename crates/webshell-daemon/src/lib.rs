//! Core daemon for webshell.
//!
//! Hosts the message bus widgets talk to: the type-keyed router, the
//! session registry, the notification engine and its D-Bus service, the
//! command channel used by one-shot CLI invocations, and the lifecycle
//! object that owns them.

pub mod bus;
pub mod command;
pub mod config;
pub mod cursor;
pub mod daemon;
pub mod dbus;
pub mod error;
pub mod handlers;
pub mod notifd;
pub mod router;
pub mod session;
pub mod setup;
pub mod shell;

pub use config::Config;
pub use daemon::Daemon;
pub use error::{DaemonError, HandlerError};
pub use notifd::{
    ChannelSignals, NotificationSignal, NotificationSignals, Notifd, NotifyRequest, SignalFanout,
};
pub use router::{DispatchOutcome, Router};
pub use session::SessionRegistry;
pub use shell::{HeadlessShell, Shell, ShellError};
