//! Transports and wire format for webshell.
//!
//! This crate carries [`Envelope`](webshell_types::Envelope)s between the
//! daemon and its peers: the long-lived WebSocket pub/sub bus used by widget
//! surfaces, the connection registry that fans broadcasts out to them, and
//! the one-request-at-a-time command channel (a Unix socket speaking
//! length-prefixed JSON frames) used by short-lived CLI invocations.

pub mod clients;
pub mod command;
pub mod connection;
pub mod error;
pub mod transport;
pub mod wire;

pub use clients::{ClientRegistry, Publisher};
pub use command::{CommandClient, CommandConnection, CommandListener, DEFAULT_CALL_TIMEOUT};
pub use connection::{FrameReceiver, FrameSender};
pub use error::{CommandError, ProtocolError};
pub use transport::{BusConnection, BusReceiver, BusSender, BusTransport, IncomingConnection};
pub use wire::Inbound;
