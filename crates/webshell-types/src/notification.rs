//! Notification model and close reasons.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Expiry value meaning "never expire".
pub const NEVER_EXPIRE: i32 = -1;

/// A scalar hint value attached to a notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HintValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl From<bool> for HintValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for HintValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<&str> for HintValue {
    fn from(v: &str) -> Self {
        Self::Str(v.to_string())
    }
}

impl From<String> for HintValue {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

/// A live notification row.
///
/// Serialises to the projection broadcast as `notifd-notification`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: u32,
    pub app_name: String,
    pub app_icon: String,
    pub summary: String,
    pub body: String,
    pub actions: Vec<String>,
    pub hints: BTreeMap<String, HintValue>,
    /// Milliseconds until expiry; `-1` never expires.
    #[serde(rename = "expireTimeout")]
    pub expire_timeout_ms: i32,
}

/// Why a notification left the live table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CloseReason {
    Expired,
    DismissedByUser,
    ClosedByClient,
    Reserved,
}

impl CloseReason {
    /// Numeric reason code used on the wire and in the service signal.
    #[must_use]
    pub fn code(self) -> u32 {
        match self {
            Self::Expired => 1,
            Self::DismissedByUser => 2,
            Self::ClosedByClient => 3,
            Self::Reserved => 4,
        }
    }
}

impl std::fmt::Display for CloseReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Expired => write!(f, "Expired"),
            Self::DismissedByUser => write!(f, "DismissedByUser"),
            Self::ClosedByClient => write!(f, "ClosedByClient"),
            Self::Reserved => write!(f, "Reserved"),
        }
    }
}

/// Payload of `notifd-notification-closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationClosed {
    pub id: u32,
    pub reason: u32,
}

impl NotificationClosed {
    #[must_use]
    pub fn new(id: u32, reason: CloseReason) -> Self {
        Self {
            id,
            reason: reason.code(),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn reason_codes_match_service_contract() {
        assert_eq!(CloseReason::Expired.code(), 1);
        assert_eq!(CloseReason::DismissedByUser.code(), 2);
        assert_eq!(CloseReason::ClosedByClient.code(), 3);
        assert_eq!(CloseReason::Reserved.code(), 4);
    }

    #[test]
    fn projection_uses_camel_case() {
        let mut hints = BTreeMap::new();
        hints.insert("urgency".to_string(), HintValue::Int(2));
        hints.insert("transient".to_string(), HintValue::Bool(true));
        let n = Notification {
            id: 7,
            app_name: "mail".into(),
            app_icon: "mail-unread".into(),
            summary: "New mail".into(),
            body: "3 unread".into(),
            actions: vec!["default".into(), "Open".into()],
            hints,
            expire_timeout_ms: 5000,
        };
        let value = serde_json::to_value(&n).unwrap();
        assert_eq!(
            value,
            json!({
                "id": 7,
                "appName": "mail",
                "appIcon": "mail-unread",
                "summary": "New mail",
                "body": "3 unread",
                "actions": ["default", "Open"],
                "hints": {"transient": true, "urgency": 2},
                "expireTimeout": 5000,
            })
        );
    }

    #[test]
    fn hint_values_decode_untagged() {
        let hints: BTreeMap<String, HintValue> =
            serde_json::from_value(json!({"a": false, "b": 3, "c": 0.5, "d": "x"})).unwrap();
        assert_eq!(hints["a"], HintValue::Bool(false));
        assert_eq!(hints["b"], HintValue::Int(3));
        assert_eq!(hints["c"], HintValue::Float(0.5));
        assert_eq!(hints["d"], HintValue::Str("x".into()));
    }

    #[test]
    fn closed_payload_carries_code() {
        let closed = NotificationClosed::new(4, CloseReason::DismissedByUser);
        assert_eq!(
            serde_json::to_value(closed).unwrap(),
            json!({"id": 4, "reason": 2})
        );
    }
}
