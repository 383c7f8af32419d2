//! Gateway operation codes
//!
//! The opcode values are wire-stable and must match the service exactly.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Gateway operation codes
///
/// Op codes define the type of payload sent or received over the gateway connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum OpCode {
    /// Server dispatches a named event (receive only)
    Dispatch = 0,
    /// Heartbeat, sent periodically by the client or requested by the server
    Heartbeat = 1,
    /// Identify - start a new session (send only)
    Identify = 2,
    /// Presence Update - change status/game (send only)
    PresenceUpdate = 3,
    /// Voice State Update (send only, unused by this client)
    VoiceStateUpdate = 4,
    /// Voice server ping (unused by this client)
    VoicePing = 5,
    /// Resume - replay missed events of an existing session (send only)
    Resume = 6,
    /// Server asks the client to reconnect (receive only)
    Reconnect = 7,
    /// Request Guild Members - ask for member chunks (send only)
    RequestGuildMembers = 8,
    /// Invalidate Session - the session can or cannot be resumed (receive only)
    InvalidateSession = 9,
    /// Hello - carries the heartbeat interval (receive only)
    Hello = 10,
    /// Heartbeat ACK (receive only)
    HeartbeatAck = 11,
    /// Guild Sync (legacy, unused by this client)
    GuildSync = 12,
}

impl OpCode {
    /// Create an `OpCode` from a raw integer value
    #[must_use]
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Dispatch),
            1 => Some(Self::Heartbeat),
            2 => Some(Self::Identify),
            3 => Some(Self::PresenceUpdate),
            4 => Some(Self::VoiceStateUpdate),
            5 => Some(Self::VoicePing),
            6 => Some(Self::Resume),
            7 => Some(Self::Reconnect),
            8 => Some(Self::RequestGuildMembers),
            9 => Some(Self::InvalidateSession),
            10 => Some(Self::Hello),
            11 => Some(Self::HeartbeatAck),
            12 => Some(Self::GuildSync),
            _ => None,
        }
    }

    /// Create an `OpCode` from the integer found in a decoded envelope
    #[must_use]
    pub fn from_u64(value: u64) -> Option<Self> {
        u8::try_from(value).ok().and_then(Self::from_u8)
    }

    /// Get the raw integer value
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Get the name of this op code
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Dispatch => "Dispatch",
            Self::Heartbeat => "Heartbeat",
            Self::Identify => "Identify",
            Self::PresenceUpdate => "PresenceUpdate",
            Self::VoiceStateUpdate => "VoiceStateUpdate",
            Self::VoicePing => "VoicePing",
            Self::Resume => "Resume",
            Self::Reconnect => "Reconnect",
            Self::RequestGuildMembers => "RequestGuildMembers",
            Self::InvalidateSession => "InvalidateSession",
            Self::Hello => "Hello",
            Self::HeartbeatAck => "HeartbeatAck",
            Self::GuildSync => "GuildSync",
        }
    }
}

impl Serialize for OpCode {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u8(self.as_u8())
    }
}

impl<'de> Deserialize<'de> for OpCode {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = u8::deserialize(deserializer)?;
        Self::from_u8(value)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid op code: {value}")))
    }
}

impl std::fmt::Display for OpCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.name(), self.as_u8())
    }
}
