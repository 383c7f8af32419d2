//! Gateway message format
//!
//! Every frame on the wire is a JSON envelope `{"op", "d", "s", "t"}`.
//! Inbound envelopes are lifted into [`GatewayMessage`]; outbound frames are
//! encoded as the minimal `{"op", "d"}` object.

use super::{HelloPayload, OpCode};
use crate::error::DecodeError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The envelope as it appears on the wire, before opcode interpretation
#[derive(Debug, Clone, Deserialize)]
struct RawEnvelope {
    op: Option<u64>,
    #[serde(default)]
    d: Value,
    #[serde(default)]
    s: Option<u64>,
    #[serde(default)]
    t: Option<String>,
}

/// A decoded inbound envelope
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    /// Sequence number carried by the envelope, if any
    pub sequence: Option<u64>,
    pub message: GatewayMessage,
}

/// Typed view of an inbound payload
#[derive(Debug, Clone, PartialEq)]
pub enum GatewayMessage {
    /// op 0; `event` is the `t` field
    Dispatch { event: Option<String>, data: Value },
    /// op 1, sent by the server to request an immediate heartbeat
    Heartbeat { last_sequence: Option<u64> },
    /// op 7
    Reconnect,
    /// op 9; `d` absent or non-boolean means not resumable
    InvalidateSession { resumable: bool },
    /// op 10
    Hello(HelloPayload),
    /// op 11
    HeartbeatAck,
    /// A known opcode the client never expects to receive
    Other { op: OpCode, data: Value },
    /// An opcode outside the known table
    Unrecognized { op: u64 },
}

impl GatewayMessage {
    /// The opcode of this message, when it is a known one
    #[must_use]
    pub fn opcode(&self) -> Option<OpCode> {
        match self {
            Self::Dispatch { .. } => Some(OpCode::Dispatch),
            Self::Heartbeat { .. } => Some(OpCode::Heartbeat),
            Self::Reconnect => Some(OpCode::Reconnect),
            Self::InvalidateSession { .. } => Some(OpCode::InvalidateSession),
            Self::Hello(_) => Some(OpCode::Hello),
            Self::HeartbeatAck => Some(OpCode::HeartbeatAck),
            Self::Other { op, .. } => Some(*op),
            Self::Unrecognized { .. } => None,
        }
    }
}

/// Decode one JSON envelope
///
/// Unknown opcodes are not an error; they decode to
/// [`GatewayMessage::Unrecognized`].
pub fn decode(text: &str) -> Result<Envelope, DecodeError> {
    let raw: RawEnvelope = serde_json::from_str(text)?;
    let op = raw.op.ok_or(DecodeError::MissingOpcode)?;

    let message = match OpCode::from_u64(op) {
        None => GatewayMessage::Unrecognized { op },
        Some(OpCode::Dispatch) => GatewayMessage::Dispatch {
            event: raw.t,
            data: raw.d,
        },
        Some(OpCode::Heartbeat) => GatewayMessage::Heartbeat {
            last_sequence: raw.d.as_u64(),
        },
        Some(OpCode::Reconnect) => GatewayMessage::Reconnect,
        Some(OpCode::InvalidateSession) => GatewayMessage::InvalidateSession {
            resumable: raw.d.as_bool().unwrap_or(false),
        },
        Some(OpCode::Hello) => {
            // A HELLO with a null or malformed body still starts heartbeating.
            let hello = serde_json::from_value(raw.d).unwrap_or_default();
            GatewayMessage::Hello(hello)
        }
        Some(OpCode::HeartbeatAck) => GatewayMessage::HeartbeatAck,
        Some(op) => GatewayMessage::Other { op, data: raw.d },
    };

    Ok(Envelope {
        sequence: raw.s,
        message,
    })
}

#[derive(Serialize)]
struct Frame<'a, T: Serialize> {
    op: OpCode,
    d: &'a T,
}

/// Encode an outbound frame as `{"op": <int>, "d": <data>}`
pub fn encode<T: Serialize>(op: OpCode, data: &T) -> Result<String, serde_json::Error> {
    serde_json::to_string(&Frame { op, d: data })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::RequestGuildMembers;
    use serde_json::json;

    #[test]
    fn test_heartbeat_roundtrip() {
        let text = encode(OpCode::Heartbeat, &Some(42u64)).unwrap();
        assert_eq!(text, r#"{"op":1,"d":42}"#);

        let envelope = decode(&text).unwrap();
        assert_eq!(envelope.message.opcode(), Some(OpCode::Heartbeat));
        assert_eq!(
            envelope.message,
            GatewayMessage::Heartbeat {
                last_sequence: Some(42)
            }
        );
        assert_eq!(envelope.sequence, None);
    }

    #[test]
    fn test_null_heartbeat() {
        let text = encode(OpCode::Heartbeat, &None::<u64>).unwrap();
        assert_eq!(text, r#"{"op":1,"d":null}"#);
    }

    #[test]
    fn test_decode_dispatch() {
        let envelope = decode(
            r#"{"op":0,"s":7,"t":"MESSAGE_CREATE","d":{"id":"1","content":"hi"}}"#,
        )
        .unwrap();

        assert_eq!(envelope.sequence, Some(7));
        match envelope.message {
            GatewayMessage::Dispatch { event, data } => {
                assert_eq!(event.as_deref(), Some("MESSAGE_CREATE"));
                assert_eq!(data["content"], "hi");
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn test_decode_hello() {
        let envelope =
            decode(r#"{"op":10,"d":{"heartbeat_interval":41250,"_trace":["gw"]},"s":null}"#)
                .unwrap();
        match envelope.message {
            GatewayMessage::Hello(hello) => {
                assert_eq!(hello.heartbeat_interval, 41250);
                assert_eq!(hello.trace, vec!["gw".to_string()]);
            }
            other => panic!("unexpected message: {other:?}"),
        }

        let envelope = decode(r#"{"op":10,"d":null}"#).unwrap();
        assert_eq!(envelope.message, GatewayMessage::Hello(HelloPayload::default()));
    }

    #[test]
    fn test_decode_invalidate_session() {
        let resumable = decode(r#"{"op":9,"d":true}"#).unwrap();
        assert_eq!(
            resumable.message,
            GatewayMessage::InvalidateSession { resumable: true }
        );

        for text in [r#"{"op":9,"d":false}"#, r#"{"op":9}"#, r#"{"op":9,"d":null}"#] {
            let envelope = decode(text).unwrap();
            assert_eq!(
                envelope.message,
                GatewayMessage::InvalidateSession { resumable: false }
            );
        }
    }

    #[test]
    fn test_unknown_opcode_is_not_an_error() {
        let envelope = decode(r#"{"op":99,"d":{}}"#).unwrap();
        assert_eq!(envelope.message, GatewayMessage::Unrecognized { op: 99 });
        assert_eq!(envelope.message.opcode(), None);
    }

    #[test]
    fn test_known_but_unexpected_opcode() {
        let envelope = decode(r#"{"op":12,"d":{"x":1}}"#).unwrap();
        assert_eq!(
            envelope.message,
            GatewayMessage::Other {
                op: OpCode::GuildSync,
                data: json!({"x": 1})
            }
        );
    }

    #[test]
    fn test_decode_errors() {
        assert!(matches!(decode("not json"), Err(DecodeError::Json(_))));
        assert!(matches!(decode(r#"{"d":1}"#), Err(DecodeError::MissingOpcode)));
    }

    #[test]
    fn test_encode_is_minimal() {
        let text = encode(OpCode::RequestGuildMembers, &RequestGuildMembers::all(&[5])).unwrap();
        let value: Value = serde_json::from_str(&text).unwrap();

        assert_eq!(value["op"], 8);
        assert_eq!(value["d"]["guild_id"], json!(["5"]));
        assert!(value.get("s").is_none());
        assert!(value.get("t").is_none());
        assert!(!text.contains('\n'));
    }
}
