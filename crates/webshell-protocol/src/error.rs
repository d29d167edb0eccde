//! Protocol and transport errors.

use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("connection failed: {0}")]
    Connection(String),

    #[error("malformed envelope: {0}")]
    MalformedEnvelope(String),

    #[error("serialisation error: {0}")]
    Serialization(String),

    #[error("frame size {len} exceeds maximum {max}")]
    FrameTooLarge { len: u32, max: u32 },

    #[error("stream closed unexpectedly")]
    StreamClosed,

    #[error("failed to bind {endpoint}: {source}")]
    Bind {
        endpoint: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Failure of a client-side command-channel call.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("no reply within {0:?}")]
    Timeout(Duration),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}
