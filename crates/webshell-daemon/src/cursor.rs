//! Cursor position poller.
//!
//! Periodically asks the compositor where the pointer is and broadcasts
//! `mouse-position-update` when it moves.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use webshell_protocol::Publisher;
use webshell_types::kind;
use webshell_types::message::CursorPosition;

use crate::bus::envelope;

/// Delay before retrying after a failed poll.
const RETRY_DELAY: Duration = Duration::from_secs(1);

#[derive(Debug, Error)]
pub enum CursorError {
    #[error("failed to run {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{command} exited with {status}")]
    Status { command: String, status: String },

    #[error("invalid cursor position: {0:?}")]
    Parse(String),
}

/// Something that can report the pointer position.
#[async_trait]
pub trait CursorSource: Send + Sync {
    async fn position(&self) -> Result<CursorPosition, CursorError>;
}

/// Runs an external command (`hyprctl cursorpos` by default) and parses
/// its `"x, y"` output.
pub struct CommandCursor {
    program: String,
    args: Vec<String>,
}

impl CommandCursor {
    /// Returns `None` for an empty command line.
    pub fn new(command: &[String]) -> Option<Self> {
        let (program, args) = command.split_first()?;
        Some(Self {
            program: program.clone(),
            args: args.to_vec(),
        })
    }

    fn display(&self) -> String {
        std::iter::once(&self.program)
            .chain(&self.args)
            .cloned()
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[async_trait]
impl CursorSource for CommandCursor {
    async fn position(&self) -> Result<CursorPosition, CursorError> {
        let output = tokio::process::Command::new(&self.program)
            .args(&self.args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| CursorError::Spawn {
                command: self.display(),
                source,
            })?;
        if !output.status.success() {
            return Err(CursorError::Status {
                command: self.display(),
                status: output.status.to_string(),
            });
        }
        let text = String::from_utf8_lossy(&output.stdout);
        parse_position(&text).ok_or_else(|| CursorError::Parse(text.trim().to_string()))
    }
}

/// Parse `"x, y"`.
pub fn parse_position(text: &str) -> Option<CursorPosition> {
    let (x, y) = text.trim().split_once(',')?;
    Some(CursorPosition {
        x: x.trim().parse().ok()?,
        y: y.trim().parse().ok()?,
    })
}

/// Poll `source` every `interval` until `cancel` fires.
pub async fn run_poller(
    source: Arc<dyn CursorSource>,
    publisher: Arc<dyn Publisher>,
    interval: Duration,
    cancel: CancellationToken,
) {
    let mut last: Option<CursorPosition> = None;
    loop {
        let result = tokio::select! {
            () = cancel.cancelled() => break,
            result = source.position() => result,
        };
        let delay = match result {
            Ok(pos) => {
                if last != Some(pos) {
                    if let Some(env) = envelope(kind::MOUSE_POSITION_UPDATE, &pos) {
                        publisher.broadcast(&env);
                    }
                    last = Some(pos);
                }
                interval
            }
            Err(e) => {
                warn!(error = %e, "cursor poll failed");
                RETRY_DELAY
            }
        };
        tokio::select! {
            () = cancel.cancelled() => break,
            () = tokio::time::sleep(delay) => {}
        }
    }
    debug!("cursor poller stopped");
}
