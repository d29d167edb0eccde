//! Command channel: a Unix socket carrying one request and one reply at a
//! time.
//!
//! An external short-lived process connects, sends a request envelope and
//! blocks for the daemon's [`CommandReply`]. The daemon serves exactly one
//! connection at a time.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde_json::Value;
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{UnixListener, UnixStream};
use tracing::{debug, info, trace};
use webshell_types::{CommandReply, Envelope};

use crate::connection::{FrameReceiver, FrameSender};
use crate::error::{CommandError, ProtocolError};
use crate::wire::{self, Inbound};

/// Default time a caller waits for a reply.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_millis(1000);

/// Delay between connection attempts while the daemon is not listening.
const RECONNECT_INTERVAL: Duration = Duration::from_millis(25);

/// Server side of the command channel.
pub struct CommandListener {
    listener: UnixListener,
    path: PathBuf,
}

impl CommandListener {
    /// Bind the command socket, replacing a stale socket file if present.
    pub fn bind(path: &Path) -> Result<Self, ProtocolError> {
        let bind_err = |source: std::io::Error| ProtocolError::Bind {
            endpoint: path.display().to_string(),
            source,
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(bind_err)?;
        }
        if path.exists() {
            std::fs::remove_file(path).map_err(bind_err)?;
        }

        let listener = UnixListener::bind(path).map_err(bind_err)?;
        info!(path = %path.display(), "command channel bound");
        Ok(Self {
            listener,
            path: path.to_path_buf(),
        })
    }

    /// Accept the next caller.
    pub async fn accept(&self) -> Result<CommandConnection, ProtocolError> {
        let (stream, _addr) = self.listener.accept().await?;
        debug!("accepted command connection");
        Ok(CommandConnection::new(stream))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for CommandListener {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

/// One accepted caller on the command channel.
pub struct CommandConnection {
    rx: FrameReceiver<OwnedReadHalf>,
    tx: FrameSender<OwnedWriteHalf>,
}

impl CommandConnection {
    fn new(stream: UnixStream) -> Self {
        let (read, write) = stream.into_split();
        Self {
            rx: FrameReceiver::new(read),
            tx: FrameSender::new(write),
        }
    }

    /// Receive the next request.
    ///
    /// Returns `None` when the caller hung up. A frame that is not a valid
    /// envelope is returned as [`Inbound::Malformed`].
    pub async fn recv_request(&mut self) -> Result<Option<Inbound>, ProtocolError> {
        Ok(self
            .rx
            .recv_bytes()
            .await?
            .map(|bytes| wire::decode_inbound(&bytes)))
    }

    pub async fn reply(&mut self, reply: &CommandReply) -> Result<(), ProtocolError> {
        self.tx.send(reply).await
    }
}

/// Client side of the command channel.
#[derive(Debug, Clone)]
pub struct CommandClient {
    path: PathBuf,
}

impl CommandClient {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Send one command and wait up to `timeout` for the reply.
    ///
    /// While the daemon is not listening the client keeps trying to connect
    /// until the deadline, so a missing daemon surfaces as
    /// [`CommandError::Timeout`]. The request itself is never resent.
    pub async fn call(
        &self,
        command: &str,
        payload: Value,
        timeout: Duration,
    ) -> Result<CommandReply, CommandError> {
        let request = Envelope::new(command, payload);
        tokio::time::timeout(timeout, self.exchange(&request))
            .await
            .map_err(|_| CommandError::Timeout(timeout))?
    }

    async fn exchange(&self, request: &Envelope) -> Result<CommandReply, CommandError> {
        let stream = self.connect().await;
        let (read, write) = stream.into_split();
        let mut tx = FrameSender::new(write);
        let mut rx = FrameReceiver::new(read);

        tx.send(request).await?;
        debug!(command = %request.kind, "sent command");

        let reply = rx
            .recv::<CommandReply>()
            .await?
            .ok_or(ProtocolError::StreamClosed)?;
        Ok(reply)
    }

    async fn connect(&self) -> UnixStream {
        loop {
            match UnixStream::connect(&self.path).await {
                Ok(stream) => return stream,
                Err(e) => {
                    trace!(path = %self.path.display(), error = %e, "command socket not ready");
                    tokio::time::sleep(RECONNECT_INTERVAL).await;
                }
            }
        }
    }
}
