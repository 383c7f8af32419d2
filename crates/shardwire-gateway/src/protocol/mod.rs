//! Gateway protocol definitions
//!
//! Op codes, close codes, payload bodies and the envelope codec.

mod close_codes;
mod messages;
mod opcodes;
mod payloads;

pub use close_codes::CloseCode;
pub use messages::{decode, encode, Envelope, GatewayMessage};
pub use opcodes::OpCode;
pub use payloads::{
    Game, HelloPayload, IdentifyPayload, IdentifyProperties, PresenceUpdate, ReadyPayload,
    RequestGuildMembers, ResumePayload, Status, GATEWAY_VERSION, LIBRARY_NAME,
};

/// Query string appended to the gateway URL
pub const CONNECT_QUERY: &str = "/?v=6&encoding=json&compress=zlib-stream";

/// Build the full connection URL for a gateway base URL
#[must_use]
pub fn connect_url(base: &str) -> String {
    format!("{}{CONNECT_QUERY}", base.trim_end_matches('/'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_url() {
        assert_eq!(
            connect_url("wss://gateway.example.com"),
            "wss://gateway.example.com/?v=6&encoding=json&compress=zlib-stream"
        );
        assert_eq!(
            connect_url("wss://gateway.example.com/"),
            "wss://gateway.example.com/?v=6&encoding=json&compress=zlib-stream"
        );
    }
}
