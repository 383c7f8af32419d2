//! Where shard events go

use super::ShardInfo;
use crate::gateway::GatewayEvent;
use async_trait::async_trait;
use tokio::sync::mpsc;

/// Consumer of the fleet's events
///
/// Events of one shard arrive in receipt order; shards are not ordered
/// relative to each other.
#[async_trait]
pub trait EventSink: Send + Sync + 'static {
    async fn on_event(&self, shard: ShardInfo, event: GatewayEvent);

    /// Every shard of the current boot has become ready; once per boot
    async fn on_shards_ready(&self, shard_count: u32) {
        let _ = shard_count;
    }
}

/// Events forwarded by [`ChannelSink`]
#[derive(Debug, Clone, PartialEq)]
pub enum FleetEvent {
    Gateway { shard: ShardInfo, event: GatewayEvent },
    AllReady { shard_count: u32 },
}

/// Forwards everything into an unbounded channel
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<FleetEvent>,
}

impl ChannelSink {
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<FleetEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl EventSink for ChannelSink {
    async fn on_event(&self, shard: ShardInfo, event: GatewayEvent) {
        let _ = self.tx.send(FleetEvent::Gateway { shard, event });
    }

    async fn on_shards_ready(&self, shard_count: u32) {
        let _ = self.tx.send(FleetEvent::AllReady { shard_count });
    }
}
