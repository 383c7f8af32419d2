//! Error types

use crate::protocol::CloseCode;
use thiserror::Error;

/// Errors raised by a frame transport
///
/// Socket failures are not errors here: they end the event stream with a
/// `Closing` event instead.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The connection is closing or closed; nothing more can be sent
    #[error("Transport is closed")]
    Closed,
}

/// Errors turning inbound bytes into an envelope
///
/// Any of these means the connection's stream can no longer be trusted.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("Failed to inflate zlib stream: {0}")]
    Inflate(#[from] flate2::DecompressError),

    #[error("Payload is not valid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    #[error("Invalid JSON payload: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Envelope has no opcode")]
    MissingOpcode,
}

/// Errors surfaced by a shard or the fleet
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The gateway rejected the token (close code 4004)
    #[error("Invalid token (close code 4004)")]
    InvalidToken,

    /// The gateway demands more shards (close code 4011)
    #[error("Resharding needed (close code 4011)")]
    ReshardingNeeded,

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    /// HTTP error fetching gateway info
    #[error("HTTP error fetching gateway info: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Protocol error: {0}")]
    Protocol(String),
}

impl GatewayError {
    /// Map a terminal close code to its error, if the code is terminal
    #[must_use]
    pub fn from_close_code(code: u16) -> Option<Self> {
        let code = CloseCode::from_u16(code).filter(|code| code.is_fatal())?;
        match code {
            CloseCode::AuthenticationFailed => Some(Self::InvalidToken),
            CloseCode::ShardingRequired => Some(Self::ReshardingNeeded),
            _ => None,
        }
    }

    /// Whether this error ends the shard instead of triggering a reconnect
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::InvalidToken | Self::ReshardingNeeded)
    }

    /// The close code this error originated from, if any
    #[must_use]
    pub fn close_code(&self) -> Option<CloseCode> {
        match self {
            Self::InvalidToken => Some(CloseCode::AuthenticationFailed),
            Self::ReshardingNeeded => Some(CloseCode::ShardingRequired),
            _ => None,
        }
    }
}

/// Gateway result type
pub type GatewayResult<T> = Result<T, GatewayError>;
