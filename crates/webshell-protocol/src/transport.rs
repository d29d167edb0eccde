//! WebSocket bus transport: bind, accept, and split.

use std::net::SocketAddr;

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, info, trace};

use crate::error::ProtocolError;
use crate::wire::{self, Inbound};

type WsStream = WebSocketStream<TcpStream>;

/// WebSocket listener for the pub/sub bus.
pub struct BusTransport {
    listener: TcpListener,
}

impl BusTransport {
    /// Bind a TCP listener for WebSocket clients.
    pub async fn bind(addr: SocketAddr) -> Result<Self, ProtocolError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ProtocolError::Bind {
                endpoint: addr.to_string(),
                source,
            })?;
        info!(addr = %addr, "bus transport bound");
        Ok(Self { listener })
    }

    /// Accept an incoming TCP connection.
    ///
    /// The WebSocket handshake is deferred to [`IncomingConnection::upgrade`]
    /// so a slow client cannot stall the accept loop.
    pub async fn accept(&self) -> Result<IncomingConnection, ProtocolError> {
        let (stream, remote) = self.listener.accept().await?;
        debug!(remote = %remote, "accepted connection");
        Ok(IncomingConnection { stream, remote })
    }

    /// Get the local address this transport is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, ProtocolError> {
        Ok(self.listener.local_addr()?)
    }
}

/// A TCP connection that has not completed the WebSocket handshake yet.
pub struct IncomingConnection {
    stream: TcpStream,
    remote: SocketAddr,
}

impl IncomingConnection {
    pub fn remote_address(&self) -> SocketAddr {
        self.remote
    }

    /// Perform the WebSocket upgrade.
    pub async fn upgrade(self) -> Result<BusConnection, ProtocolError> {
        let ws = tokio_tungstenite::accept_async(self.stream)
            .await
            .map_err(|e| ProtocolError::Connection(e.to_string()))?;
        Ok(BusConnection {
            ws,
            remote: self.remote,
        })
    }
}

/// An upgraded bus connection.
pub struct BusConnection {
    ws: WsStream,
    remote: SocketAddr,
}

impl BusConnection {
    pub fn remote_address(&self) -> SocketAddr {
        self.remote
    }

    /// Split into independently owned write and read halves.
    pub fn split(self) -> (BusSender, BusReceiver) {
        let (sink, stream) = self.ws.split();
        (BusSender { sink }, BusReceiver { stream })
    }
}

/// Write half of a bus connection.
pub struct BusSender {
    sink: SplitSink<WsStream, Message>,
}

impl BusSender {
    /// Send one pre-encoded envelope as a text frame.
    pub async fn send_text(&mut self, text: String) -> Result<(), ProtocolError> {
        self.sink
            .send(Message::text(text))
            .await
            .map_err(|e| ProtocolError::Connection(e.to_string()))
    }

    /// Send a close frame and flush.
    pub async fn close(mut self) -> Result<(), ProtocolError> {
        self.sink
            .close()
            .await
            .map_err(|e| ProtocolError::Connection(e.to_string()))
    }
}

/// Read half of a bus connection.
pub struct BusReceiver {
    stream: SplitStream<WsStream>,
}

impl BusReceiver {
    /// Receive the next envelope.
    ///
    /// Returns `None` once the peer has closed the connection. Binary and
    /// control frames are skipped.
    pub async fn recv(&mut self) -> Result<Option<Inbound>, ProtocolError> {
        while let Some(frame) = self.stream.next().await {
            let frame = frame.map_err(|e| ProtocolError::Connection(e.to_string()))?;
            match frame {
                Message::Text(text) => {
                    trace!(len = text.len(), "received text frame");
                    return Ok(Some(wire::decode_inbound(text.as_bytes())));
                }
                Message::Close(_) => return Ok(None),
                Message::Binary(_) => debug!("ignoring binary frame"),
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {}
            }
        }
        Ok(None)
    }
}
