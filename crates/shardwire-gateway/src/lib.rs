//! # shardwire-gateway
//!
//! Client for a sharded, zlib-stream compressed websocket gateway.
//!
//! A [`ShardManager`] boots one [`GatewayHandler`] per shard, keeps each
//! connection alive with heartbeats, resumes sessions after disconnects and
//! restarts the fleet when the gateway asks for more shards. Events reach the
//! application through an [`EventSink`].

pub mod compression;
pub mod error;
pub mod gateway;
pub mod heartbeat;
pub mod info;
pub mod protocol;
pub mod session;
pub mod shard;
pub mod transport;

pub use error::{DecodeError, GatewayError, GatewayResult, TransportError};
pub use gateway::{CloseOptions, GatewayCommand, GatewayCommander, GatewayEvent, GatewayHandler};
pub use heartbeat::HeartbeatStats;
pub use info::{GatewayInfo, GatewayInfoProvider, HttpGatewayInfo, StaticGatewayInfo};
pub use shard::{
    ChannelSink, EventSink, FleetEvent, ShardInfo, ShardManager, ShardManagerConfig, ShardRegistry,
};
pub use transport::{Connector, Transport, TransportEvent, WebSocketConnector};
