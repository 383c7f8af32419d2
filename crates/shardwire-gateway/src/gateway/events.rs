//! Events emitted by the gateway state machine

use serde_json::Value;

/// Dispatch name of the event that completes an IDENTIFY
pub const READY: &str = "READY";
/// Dispatch name of the event that completes a RESUME
pub const RESUMED: &str = "RESUMED";

/// One protocol occurrence, surfaced to the caller in receipt order
#[derive(Debug, Clone, PartialEq)]
pub enum GatewayEvent {
    WebsocketClosed { code: u16, reason: String },
    WebsocketOpened { url: String },
    WebsocketConnected { url: String, proxy: Option<String> },
    Hello { trace: Vec<String> },
    /// The server asked for a heartbeat and one was sent
    HeartbeatReceived,
    HeartbeatAck,
    InvalidateSession { resumable: bool },
    Dispatch { event_name: String, payload: Value },
}

impl GatewayEvent {
    /// Stable snake_case name, for logging
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::WebsocketClosed { .. } => "websocket_closed",
            Self::WebsocketOpened { .. } => "websocket_opened",
            Self::WebsocketConnected { .. } => "websocket_connected",
            Self::Hello { .. } => "gateway_hello",
            Self::HeartbeatReceived => "gateway_heartbeat_received",
            Self::HeartbeatAck => "gateway_heartbeat_ack",
            Self::InvalidateSession { .. } => "gateway_invalidate_session",
            Self::Dispatch { .. } => "gateway_dispatch_received",
        }
    }

    /// READY or RESUMED: the session is authenticated and receiving events
    #[must_use]
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Dispatch { event_name, .. } if event_name == READY || event_name == RESUMED)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_ready_detection() {
        let ready = GatewayEvent::Dispatch {
            event_name: READY.into(),
            payload: json!({}),
        };
        let resumed = GatewayEvent::Dispatch {
            event_name: RESUMED.into(),
            payload: json!(null),
        };
        let other = GatewayEvent::Dispatch {
            event_name: "MESSAGE_CREATE".into(),
            payload: json!({}),
        };

        assert!(ready.is_ready());
        assert!(resumed.is_ready());
        assert!(!other.is_ready());
        assert!(!GatewayEvent::HeartbeatAck.is_ready());
    }

    #[test]
    fn test_event_names() {
        assert_eq!(GatewayEvent::HeartbeatAck.name(), "gateway_heartbeat_ack");
        assert_eq!(
            GatewayEvent::WebsocketClosed {
                code: 1000,
                reason: String::new()
            }
            .name(),
            "websocket_closed"
        );
    }
}
