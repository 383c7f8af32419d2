//! Payload definitions
//!
//! Typed `d` bodies for the frames this client sends, plus the few inbound
//! bodies the state machine inspects (HELLO, READY).

use serde::{Deserialize, Serialize};

/// Library name reported in IDENTIFY properties
pub const LIBRARY_NAME: &str = "shardwire";

/// Gateway protocol version sent in IDENTIFY and the connection URL
pub const GATEWAY_VERSION: u8 = 6;

/// Payload for op 10 (Hello)
///
/// Sent by the server immediately after connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HelloPayload {
    /// Heartbeat interval in milliseconds
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval: u64,

    /// Names of the gateway servers handling this connection
    #[serde(default, rename = "_trace")]
    pub trace: Vec<String>,
}

impl HelloPayload {
    /// Default heartbeat interval (45 seconds)
    pub const DEFAULT_HEARTBEAT_INTERVAL: u64 = 45_000;

    /// Create a Hello payload with a custom interval and no trace
    #[must_use]
    pub fn with_interval(heartbeat_interval: u64) -> Self {
        Self {
            heartbeat_interval,
            trace: Vec::new(),
        }
    }
}

impl Default for HelloPayload {
    fn default() -> Self {
        Self::with_interval(Self::DEFAULT_HEARTBEAT_INTERVAL)
    }
}

fn default_heartbeat_interval() -> u64 {
    HelloPayload::DEFAULT_HEARTBEAT_INTERVAL
}

/// The part of a READY dispatch the session cares about
#[derive(Debug, Clone, Deserialize)]
pub struct ReadyPayload {
    #[serde(default)]
    pub session_id: Option<String>,
}

/// Payload for op 2 (Identify)
///
/// Sent by the client to authenticate a new session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentifyPayload {
    /// Bot token
    pub token: String,

    /// Client connection properties
    pub properties: IdentifyProperties,

    /// Member count above which a guild is considered large
    pub large_threshold: u32,

    /// Gateway protocol version
    pub v: u8,

    /// `[shard_id, shard_count]`
    pub shard: [u32; 2],
}

impl IdentifyPayload {
    /// Build an IDENTIFY body for one shard
    #[must_use]
    pub fn new(token: impl Into<String>, shard_id: u32, shard_count: u32) -> Self {
        Self {
            token: token.into(),
            properties: IdentifyProperties::default(),
            large_threshold: 250,
            v: GATEWAY_VERSION,
            shard: [shard_id, shard_count],
        }
    }
}

/// Client connection properties
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentifyProperties {
    #[serde(rename = "$os")]
    pub os: String,

    #[serde(rename = "$browser")]
    pub browser: String,

    #[serde(rename = "$device")]
    pub device: String,

    #[serde(rename = "$referrer")]
    pub referrer: String,

    #[serde(rename = "$referring_domain")]
    pub referring_domain: String,
}

impl Default for IdentifyProperties {
    fn default() -> Self {
        Self {
            os: std::env::consts::OS.to_string(),
            browser: LIBRARY_NAME.to_string(),
            device: LIBRARY_NAME.to_string(),
            referrer: String::new(),
            referring_domain: String::new(),
        }
    }
}

/// Payload for op 6 (Resume)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResumePayload {
    pub token: String,
    pub session_id: String,
    /// Last sequence number received
    pub seq: Option<u64>,
}

/// Presence status values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Online,
    Idle,
    Dnd,
    Invisible,
    Offline,
}

/// The activity shown alongside a presence
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Game {
    pub name: String,

    /// Activity type (0 = playing, 1 = streaming, ...)
    #[serde(rename = "type")]
    pub kind: u8,

    /// Stream URL, only meaningful for streaming activities
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl Game {
    /// Create a "playing" activity
    #[must_use]
    pub fn playing(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: 0,
            url: None,
        }
    }

    /// Create a "streaming" activity
    #[must_use]
    pub fn streaming(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: 1,
            url: Some(url.into()),
        }
    }
}

/// Payload for op 3 (Presence Update)
///
/// `afk` and `since` are always present on the wire; the gateway rejects
/// presence updates without them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceUpdate {
    pub afk: bool,

    /// Unix time in milliseconds
    pub since: i64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<Status>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub game: Option<Game>,
}

impl PresenceUpdate {
    /// Create a presence update stamped with the current time
    #[must_use]
    pub fn new() -> Self {
        Self {
            afk: false,
            since: chrono::Utc::now().timestamp_millis(),
            status: None,
            game: None,
        }
    }

    /// Set status
    #[must_use]
    pub fn with_status(mut self, status: Status) -> Self {
        self.status = Some(status);
        self
    }

    /// Set the displayed activity
    #[must_use]
    pub fn with_game(mut self, game: Game) -> Self {
        self.game = Some(game);
        self
    }
}

impl Default for PresenceUpdate {
    fn default() -> Self {
        Self::new()
    }
}

/// Payload for op 8 (Request Guild Members)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestGuildMembers {
    /// Guild ids, stringified
    pub guild_id: Vec<String>,
    pub query: String,
    /// 0 requests every member
    pub limit: u32,
}

impl RequestGuildMembers {
    /// Request all members of the given guilds
    #[must_use]
    pub fn all(guild_ids: &[u64]) -> Self {
        Self {
            guild_id: guild_ids.iter().map(ToString::to_string).collect(),
            query: String::new(),
            limit: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_hello_defaults() {
        let hello: HelloPayload = serde_json::from_value(json!({})).unwrap();
        assert_eq!(hello.heartbeat_interval, 45_000);
        assert!(hello.trace.is_empty());

        let hello: HelloPayload =
            serde_json::from_value(json!({"heartbeat_interval": 41250, "_trace": ["gw-1"]}))
                .unwrap();
        assert_eq!(hello.heartbeat_interval, 41250);
        assert_eq!(hello.trace, vec!["gw-1".to_string()]);
    }

    #[test]
    fn test_identify_wire_shape() {
        let value = serde_json::to_value(IdentifyPayload::new("tok", 1, 3)).unwrap();

        assert_eq!(value["token"], "tok");
        assert_eq!(value["large_threshold"], 250);
        assert_eq!(value["v"], 6);
        assert_eq!(value["shard"], json!([1, 3]));
        assert_eq!(value["properties"]["$browser"], "shardwire");
        assert_eq!(value["properties"]["$device"], "shardwire");
        assert_eq!(value["properties"]["$referrer"], "");
        assert_eq!(value["properties"]["$referring_domain"], "");
        assert_eq!(value["properties"]["$os"], std::env::consts::OS);
    }

    #[test]
    fn test_presence_omits_unset_fields() {
        let presence = PresenceUpdate {
            since: 42,
            ..PresenceUpdate::new()
        };
        let value = serde_json::to_value(&presence).unwrap();
        assert_eq!(value, json!({"afk": false, "since": 42}));

        let value = serde_json::to_value(
            presence
                .with_status(Status::Dnd)
                .with_game(Game::streaming("live", "https://example.com/live")),
        )
        .unwrap();
        assert_eq!(value["status"], "dnd");
        assert_eq!(value["game"]["type"], 1);
        assert_eq!(value["game"]["url"], "https://example.com/live");
    }

    #[test]
    fn test_playing_game_has_no_url() {
        let value = serde_json::to_value(Game::playing("chess")).unwrap();
        assert_eq!(value, json!({"name": "chess", "type": 0}));
    }

    #[test]
    fn test_guild_member_request_stringifies_ids() {
        let value = serde_json::to_value(RequestGuildMembers::all(&[1, 22])).unwrap();
        assert_eq!(value, json!({"guild_id": ["1", "22"], "query": "", "limit": 0}));
    }
}
