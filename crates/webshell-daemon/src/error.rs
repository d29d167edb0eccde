//! Daemon errors.

use thiserror::Error;
use webshell_types::ConnectionId;

use crate::shell::ShellError;

#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("D-Bus error: {0}")]
    Dbus(#[from] zbus::Error),
}

/// Failure of a single message handler.
///
/// The router collects these per handler; on the bus they are logged, on the
/// command channel they become the `details` of an error reply.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    #[error("no session for connection {0}")]
    SessionMissing(ConnectionId),

    #[error(transparent)]
    Shell(#[from] ShellError),
}

impl From<serde_json::Error> for HandlerError {
    fn from(e: serde_json::Error) -> Self {
        Self::InvalidPayload(e.to_string())
    }
}
