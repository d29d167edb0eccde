//! Wire format.
//!
//! On the bus each WebSocket text frame is one JSON envelope. On the
//! command channel each message is:
//!   [4 bytes big-endian length][JSON payload]

use serde::de::DeserializeOwned;
use serde::Serialize;
use webshell_types::Envelope;

use crate::error::ProtocolError;

/// Maximum message size (16 MiB). Prevents allocation bombs.
pub const MAX_MESSAGE_SIZE: u32 = 16 * 1024 * 1024;

/// A decoded inbound message, or the reason it could not be decoded.
///
/// Malformed input is a value rather than an error so the caller can apply
/// its own policy (reply, drop, or close the connection).
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Envelope(Envelope),
    Malformed(String),
}

/// Encode an envelope as JSON text.
pub fn encode_envelope(envelope: &Envelope) -> Result<String, ProtocolError> {
    serde_json::to_string(envelope).map_err(|e| ProtocolError::Serialization(e.to_string()))
}

/// Decode raw bytes into an [`Inbound`].
pub fn decode_inbound(bytes: &[u8]) -> Inbound {
    match serde_json::from_slice::<Envelope>(bytes) {
        Ok(envelope) => Inbound::Envelope(envelope),
        Err(e) => Inbound::Malformed(e.to_string()),
    }
}

/// Encode a message to a length-prefixed byte vector.
pub fn encode_frame<T: Serialize>(msg: &T) -> Result<Vec<u8>, ProtocolError> {
    let payload =
        serde_json::to_vec(msg).map_err(|e| ProtocolError::Serialization(e.to_string()))?;

    let len = u32::try_from(payload.len())
        .map_err(|_| ProtocolError::Serialization("message too large".to_string()))?;
    if len > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::FrameTooLarge {
            len,
            max: MAX_MESSAGE_SIZE,
        });
    }

    let mut buf = Vec::with_capacity(4 + payload.len());
    buf.extend_from_slice(&len.to_be_bytes());
    buf.extend_from_slice(&payload);
    Ok(buf)
}

/// Decode a frame payload (without the length prefix).
pub fn decode_frame<T: DeserializeOwned>(payload: &[u8]) -> Result<T, ProtocolError> {
    serde_json::from_slice(payload).map_err(|e| ProtocolError::MalformedEnvelope(e.to_string()))
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use webshell_types::CommandReply;

    use super::*;

    #[test]
    fn frame_prefix_matches_payload_length() {
        let env = Envelope::new("widget-set-visible", json!({"widgetName": "bar"}));
        let bytes = encode_frame(&env).unwrap();
        let len = u32::from_be_bytes(bytes[..4].try_into().unwrap());
        assert_eq!(len as usize, bytes.len() - 4);

        let decoded: Envelope = decode_frame(&bytes[4..]).unwrap();
        assert_eq!(decoded, env);
    }

    #[test]
    fn reply_frame_decodes() {
        let bytes = encode_frame(&CommandReply::failure("boom", "details")).unwrap();
        let reply: CommandReply = decode_frame(&bytes[4..]).unwrap();
        assert_eq!(reply, CommandReply::failure("boom", "details"));
    }

    #[test]
    fn garbage_is_malformed() {
        assert!(matches!(decode_inbound(b"not json"), Inbound::Malformed(_)));
        assert!(matches!(decode_inbound(b"{\"type\":1}"), Inbound::Malformed(_)));
    }

    #[test]
    fn envelope_text_roundtrip() {
        let env = Envelope::new("mouse-position-update", json!({"x": 1, "y": 2}));
        let text = encode_envelope(&env).unwrap();
        assert_eq!(decode_inbound(text.as_bytes()), Inbound::Envelope(env));
    }
}
