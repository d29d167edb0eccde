//! Well-known message types and their payloads.
//!
//! Widgets talk to the daemon over the pub/sub bus; external processes talk
//! to it over the command channel. Both use [`crate::Envelope`]; the
//! constants in [`kind`] are the `type` strings, the structs below are the
//! payloads handlers decode.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::notification::HintValue;
use crate::screen::MonitorId;

/// Message `type` strings.
pub mod kind {
    /// Reserved inbound type that binds a connection to a session.
    pub const HANDSHAKE: &str = "handshake";

    // Inbound on the bus.
    pub const WINDOW_UPDATE_CLICK_REGION: &str = "window-update-click-region";
    pub const NOTIFICATION_DISMISS: &str = "notifd-notification-dismiss";
    pub const NOTIFICATION_ACTION: &str = "notifd-notification-action";
    pub const APPLICATION_RUN: &str = "appd-application-run";
    pub const APPLICATION_LIST_REQUEST: &str = "appd-application-list-request";
    pub const MONITOR_INFO_REQUEST: &str = "monitor-info-request";
    pub const WIDGET_SET_KEYBOARD_INTERACTIVITY: &str = "widget-set-keyboard-interactivity";

    // Outbound on the bus.
    pub const NOTIFICATION_CREATED: &str = "notifd-notification";
    pub const NOTIFICATION_CLOSED: &str = "notifd-notification-closed";
    pub const APPLICATION_LIST_RESPONSE: &str = "appd-application-list-response";
    pub const APPLICATION_ADDED: &str = "appd-application-added";
    pub const APPLICATION_RESULT: &str = "appd-application-result";
    pub const MOUSE_POSITION_UPDATE: &str = "mouse-position-update";
    pub const MONITOR_INFO_RESPONSE: &str = "monitor-info-response";

    // Command channel.
    pub const WIDGET_SET_VISIBLE: &str = "widget-set-visible";
    pub const WIDGET_TOGGLE_VISIBLE: &str = "widget-toggle-visible";
    pub const NOTIFY: &str = "notifd-notify";
    pub const NOTIFY_CLOSE: &str = "notifd-close";
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandshakePayload {
    pub monitor_id: MonitorId,
    pub widget_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClickRegionPayload {
    pub name: String,
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationIdPayload {
    pub id: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationActionPayload {
    pub id: u32,
    pub action: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunApplicationPayload {
    #[serde(default)]
    pub prefix: String,
    pub app_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyboardInteractivityPayload {
    pub interactive: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorInfoResponse {
    pub id: MonitorId,
    pub width: i64,
    pub height: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CursorPosition {
    pub x: i32,
    pub y: i32,
}

/// An entry in the launchable application catalogue.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationInfo {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub comment: String,
    pub exec: String,
    #[serde(default)]
    pub icon_base64_large: String,
    #[serde(default)]
    pub icon_base64_small: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationResult {
    pub id: String,
    pub name: String,
    pub status: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetVisiblePayload {
    pub widget_name: String,
    #[serde(default)]
    pub monitor_id: MonitorId,
    pub visible: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToggleVisiblePayload {
    pub widget_name: String,
    #[serde(default)]
    pub monitor_id: MonitorId,
}

/// Command-channel form of the notification service's `Notify` method.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotifyPayload {
    #[serde(default)]
    pub app_name: String,
    #[serde(default)]
    pub replaces_id: u32,
    #[serde(default)]
    pub app_icon: String,
    pub summary: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub actions: Vec<String>,
    #[serde(default)]
    pub hints: BTreeMap<String, HintValue>,
    #[serde(default = "default_expire_timeout")]
    pub expire_timeout: i32,
}

fn default_expire_timeout() -> i32 {
    crate::notification::NEVER_EXPIRE
}
