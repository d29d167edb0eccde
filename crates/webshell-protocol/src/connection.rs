//! Length-prefixed JSON framing over byte streams.

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::trace;

use crate::error::ProtocolError;
use crate::wire::{self, MAX_MESSAGE_SIZE};

/// Sends length-prefixed JSON messages over a byte stream.
pub struct FrameSender<W> {
    stream: W,
}

impl<W: AsyncWrite + Unpin> FrameSender<W> {
    pub fn new(stream: W) -> Self {
        Self { stream }
    }

    /// Send a message, encoding it as a length-prefixed JSON frame.
    pub async fn send<T: Serialize>(&mut self, msg: &T) -> Result<(), ProtocolError> {
        let frame = wire::encode_frame(msg)?;
        self.stream
            .write_all(&frame)
            .await
            .map_err(|e| ProtocolError::Connection(e.to_string()))?;
        self.stream
            .flush()
            .await
            .map_err(|e| ProtocolError::Connection(e.to_string()))?;

        trace!(len = frame.len() - 4, "sent frame");
        Ok(())
    }

    /// Shut down the write side (signal no more data).
    pub async fn finish(mut self) -> Result<(), ProtocolError> {
        self.stream
            .shutdown()
            .await
            .map_err(|e| ProtocolError::Connection(e.to_string()))
    }
}

/// Receives length-prefixed JSON messages from a byte stream.
pub struct FrameReceiver<R> {
    stream: R,
}

impl<R: AsyncRead + Unpin> FrameReceiver<R> {
    pub fn new(stream: R) -> Self {
        Self { stream }
    }

    /// Receive one raw frame payload.
    ///
    /// Returns `None` if the stream has been cleanly closed by the peer
    /// between frames.
    pub async fn recv_bytes(&mut self) -> Result<Option<Vec<u8>>, ProtocolError> {
        let mut len_buf = [0u8; 4];
        match self.stream.read_exact(&mut len_buf).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(ProtocolError::Connection(e.to_string())),
        }

        let len = u32::from_be_bytes(len_buf);
        if len > MAX_MESSAGE_SIZE {
            return Err(ProtocolError::FrameTooLarge {
                len,
                max: MAX_MESSAGE_SIZE,
            });
        }

        let mut payload = vec![0u8; len as usize];
        match self.stream.read_exact(&mut payload).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                return Err(ProtocolError::StreamClosed);
            }
            Err(e) => return Err(ProtocolError::Connection(e.to_string())),
        }

        trace!(len, "received frame");
        Ok(Some(payload))
    }

    /// Receive and decode a message.
    pub async fn recv<T: DeserializeOwned>(&mut self) -> Result<Option<T>, ProtocolError> {
        match self.recv_bytes().await? {
            Some(payload) => wire::decode_frame(&payload).map(Some),
            None => Ok(None),
        }
    }
}
