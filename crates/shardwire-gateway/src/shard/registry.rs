//! Running shards and fleet readiness

use crate::error::GatewayError;
use crate::gateway::GatewayCommander;
use crate::heartbeat::HeartbeatStats;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::HashMap;
use tokio::sync::watch;

/// Identity of a shard within the current fleet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShardInfo {
    pub shard_id: u32,
    pub shard_count: u32,
}

/// Handle to a running shard
#[derive(Debug, Clone)]
pub struct ShardHandle {
    info: ShardInfo,
    commander: GatewayCommander,
    stats: watch::Receiver<HeartbeatStats>,
}

impl ShardHandle {
    #[must_use]
    pub fn new(
        info: ShardInfo,
        commander: GatewayCommander,
        stats: watch::Receiver<HeartbeatStats>,
    ) -> Self {
        Self {
            info,
            commander,
            stats,
        }
    }

    #[must_use]
    pub fn info(&self) -> ShardInfo {
        self.info
    }

    #[must_use]
    pub fn commander(&self) -> &GatewayCommander {
        &self.commander
    }

    /// Latest heartbeat stats published by the shard
    #[must_use]
    pub fn heartbeat_stats(&self) -> HeartbeatStats {
        *self.stats.borrow()
    }
}

#[derive(Debug, Default)]
struct Readiness {
    ready: HashMap<u32, bool>,
    fired: bool,
}

/// Shard id to handle map plus the readiness map of the current boot
#[derive(Debug, Default)]
pub struct ShardRegistry {
    shards: DashMap<u32, ShardHandle>,
    readiness: Mutex<Readiness>,
}

impl ShardRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Prepare for a fleet boot: no handles, every shard not ready
    pub fn reset(&self, shard_count: u32) {
        self.shards.clear();
        let mut readiness = self.readiness.lock();
        readiness.ready = (0..shard_count).map(|id| (id, false)).collect();
        readiness.fired = false;
    }

    pub fn insert(&self, handle: ShardHandle) {
        self.shards.insert(handle.info.shard_id, handle);
    }

    pub fn remove(&self, shard_id: u32) -> Option<ShardHandle> {
        self.shards.remove(&shard_id).map(|(_, handle)| handle)
    }

    #[must_use]
    pub fn get(&self, shard_id: u32) -> Option<ShardHandle> {
        self.shards.get(&shard_id).map(|entry| entry.value().clone())
    }

    /// Same as [`get`](Self::get), with an error naming the missing shard
    pub fn require(&self, shard_id: u32) -> Result<ShardHandle, GatewayError> {
        self.get(shard_id)
            .ok_or_else(|| GatewayError::Protocol(format!("shard {shard_id} is not running")))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.shards.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.shards.is_empty()
    }

    /// Ids of running shards, ascending
    #[must_use]
    pub fn shard_ids(&self) -> Vec<u32> {
        let mut ids: Vec<u32> = self.shards.iter().map(|entry| *entry.key()).collect();
        ids.sort_unstable();
        ids
    }

    /// Mark a shard ready
    ///
    /// Returns `true` exactly once per boot: on the call that makes every
    /// shard ready.
    pub fn mark_ready(&self, shard_id: u32) -> bool {
        let mut readiness = self.readiness.lock();
        match readiness.ready.get_mut(&shard_id) {
            Some(ready) => *ready = true,
            None => return false,
        }

        if !readiness.fired && readiness.ready.values().all(|ready| *ready) {
            readiness.fired = true;
            return true;
        }
        false
    }

    #[must_use]
    pub fn is_ready(&self, shard_id: u32) -> bool {
        self.readiness
            .lock()
            .ready
            .get(&shard_id)
            .copied()
            .unwrap_or(false)
    }

    /// Whether every shard of the current boot has been ready
    #[must_use]
    pub fn all_ready(&self) -> bool {
        self.readiness.lock().fired
    }
}
