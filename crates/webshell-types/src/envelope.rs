//! The envelope wrapper used on every transport.
//!
//! Both the pub/sub bus and the command channel carry
//! `{"type": <string>, "payload": <value>}`. The `type` selects routing;
//! the payload is opaque until a handler decodes it.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A typed message on the bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: String,
    pub payload: Value,
}

impl Envelope {
    pub fn new(kind: impl Into<String>, payload: Value) -> Self {
        Self {
            kind: kind.into(),
            payload,
        }
    }

    /// Build an envelope from any serialisable payload.
    pub fn with_payload<T: Serialize>(
        kind: impl Into<String>,
        payload: &T,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self::new(kind, serde_json::to_value(payload)?))
    }

    /// Decode the payload into a typed structure.
    pub fn payload_as<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        T::deserialize(&self.payload)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::message::HandshakePayload;

    #[test]
    fn serialises_type_field() {
        let env = Envelope::new("monitor-info-request", json!({}));
        let text = serde_json::to_string(&env).unwrap();
        assert_eq!(text, r#"{"type":"monitor-info-request","payload":{}}"#);
    }

    #[test]
    fn missing_payload_is_rejected() {
        let err = serde_json::from_str::<Envelope>(r#"{"type":"handshake"}"#);
        assert!(err.is_err());
    }

    #[test]
    fn missing_type_is_rejected() {
        let err = serde_json::from_str::<Envelope>(r#"{"payload":{}}"#);
        assert!(err.is_err());
    }

    #[test]
    fn payload_decodes_into_typed_struct() {
        let env: Envelope = serde_json::from_str(
            r#"{"type":"handshake","payload":{"monitorId":2,"widgetName":"bar"}}"#,
        )
        .unwrap();
        let hs: HandshakePayload = env.payload_as().unwrap();
        assert_eq!(hs.monitor_id, 2);
        assert_eq!(hs.widget_name, "bar");
    }
}
