//! Shared types for webshell.
//!
//! This crate contains the types shared across the webshell workspace:
//! the `{type, payload}` envelope, connection and session identity,
//! the notification model with its close reasons, command-channel replies,
//! monitor geometry, and the typed payloads of the well-known message types.

pub mod command;
pub mod envelope;
pub mod message;
pub mod notification;
pub mod screen;
pub mod session;

pub use command::CommandReply;
pub use envelope::Envelope;
pub use message::kind;
pub use notification::{CloseReason, HintValue, Notification, NotificationClosed};
pub use screen::{ClickRegion, MonitorGeometry, MonitorId};
pub use session::{ConnectionId, Session};
