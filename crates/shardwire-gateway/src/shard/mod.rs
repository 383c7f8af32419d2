//! Shard fleet: staggered boot, reconnection, readiness and resharding

mod backoff;
mod manager;
mod registry;
mod runner;
mod sink;

pub use backoff::ReconnectBackoff;
pub use manager::{ShardManager, ShardManagerConfig};
pub use registry::{ShardHandle, ShardInfo, ShardRegistry};
pub use sink::{ChannelSink, EventSink, FleetEvent};
