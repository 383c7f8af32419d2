//! Shard fleet orchestration
//!
//! Boots shards with a staggered start, tracks fleet readiness and restarts
//! the whole fleet with a recomputed shard count when the gateway demands
//! resharding.

use super::runner::ShardRunner;
use super::{EventSink, ReconnectBackoff, ShardRegistry};
use crate::error::{GatewayError, GatewayResult};
use crate::gateway::{GatewayHandler, GatewayCommand};
use crate::heartbeat::HeartbeatStats;
use crate::info::{GatewayInfoProvider, HttpGatewayInfo};
use crate::protocol::PresenceUpdate;
use crate::transport::{Connector, WebSocketConnector};
use shardwire_common::ClientConfig;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Fleet settings
#[derive(Clone)]
pub struct ShardManagerConfig {
    pub token: String,
    /// REST base for the gateway-info endpoint
    pub api_base: String,
    /// Fixed gateway URL; `None` uses the gateway-info endpoint
    pub gateway_url: Option<String>,
    /// Fixed shard count; `None` uses the recommended count
    pub shard_count: Option<u32>,
    /// Restart the fleet with a recomputed shard count on close code 4011
    pub allow_resharding: bool,
    /// Delay between consecutive shard starts
    pub startup_delay: Duration,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
}

impl ShardManagerConfig {
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            ..Self::default()
        }
    }
}

impl Default for ShardManagerConfig {
    fn default() -> Self {
        Self {
            token: String::new(),
            api_base: "https://discord.com/api/v6".to_string(),
            gateway_url: None,
            shard_count: None,
            allow_resharding: true,
            startup_delay: Duration::from_secs(5),
            backoff_base_ms: 1000,
            backoff_max_ms: 60_000,
        }
    }
}

impl From<&ClientConfig> for ShardManagerConfig {
    fn from(config: &ClientConfig) -> Self {
        Self {
            token: config.gateway.token.clone(),
            api_base: config.gateway.api_base.clone(),
            gateway_url: config.gateway.url.clone(),
            shard_count: config.sharding.shard_count,
            allow_resharding: config.sharding.allow_resharding,
            startup_delay: Duration::from_secs(config.sharding.startup_delay_secs),
            backoff_base_ms: config.sharding.backoff_base_ms,
            backoff_max_ms: config.sharding.backoff_max_ms,
        }
    }
}

impl std::fmt::Debug for ShardManagerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShardManagerConfig")
            .field("token", &"<redacted>")
            .field("api_base", &self.api_base)
            .field("gateway_url", &self.gateway_url)
            .field("shard_count", &self.shard_count)
            .field("allow_resharding", &self.allow_resharding)
            .field("startup_delay", &self.startup_delay)
            .finish()
    }
}

/// Runs a fleet of shards
pub struct ShardManager<C: Connector = WebSocketConnector> {
    config: ShardManagerConfig,
    connector: C,
    info: Arc<dyn GatewayInfoProvider>,
    sink: Arc<dyn EventSink>,
    registry: Arc<ShardRegistry>,
    shutdown: CancellationToken,
}

impl ShardManager<WebSocketConnector> {
    /// Websocket-backed manager using the REST gateway-info endpoint
    pub fn new(config: ShardManagerConfig, sink: Arc<dyn EventSink>) -> Self {
        let info = Arc::new(HttpGatewayInfo::new(
            config.api_base.clone(),
            config.token.clone(),
        ));
        Self::with_connector(config, WebSocketConnector, info, sink)
    }
}

impl<C: Connector> ShardManager<C> {
    pub fn with_connector(
        config: ShardManagerConfig,
        connector: C,
        info: Arc<dyn GatewayInfoProvider>,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            config,
            connector,
            info,
            sink,
            registry: Arc::new(ShardRegistry::new()),
            shutdown: CancellationToken::new(),
        }
    }

    /// Run the fleet until shutdown or a fatal error
    ///
    /// Returns `Ok(())` after [`shutdown`](Self::shutdown). Returns
    /// `Err(InvalidToken)` on close code 4004, and `Err(ReshardingNeeded)` on
    /// 4011 when resharding is disabled; with resharding enabled, 4011
    /// recomputes the shard count and boots a fresh fleet.
    pub async fn run(&self) -> GatewayResult<()> {
        let mut resharding = false;

        loop {
            let (url, shard_count) = self.resolve(resharding).await?;

            match self.run_fleet(&url, shard_count).await {
                Err(GatewayError::ReshardingNeeded)
                    if self.config.allow_resharding && !self.shutdown.is_cancelled() =>
                {
                    warn!(shard_count, "Resharding needed, restarting the fleet");
                    resharding = true;
                }
                result => return result,
            }
        }
    }

    /// Stop every shard; [`run`](Self::run) returns once they have closed
    pub fn shutdown(&self) {
        info!("Shutting down shard fleet");
        self.shutdown.cancel();
    }

    pub fn registry(&self) -> &Arc<ShardRegistry> {
        &self.registry
    }

    /// Latest heartbeat stats of a running shard
    pub fn heartbeat_stats(&self, shard_id: u32) -> Option<HeartbeatStats> {
        self.registry.get(shard_id).map(|shard| shard.heartbeat_stats())
    }

    pub fn update_presence(&self, shard_id: u32, presence: PresenceUpdate) -> GatewayResult<()> {
        self.send_command(shard_id, GatewayCommand::UpdatePresence(presence))
    }

    pub fn request_guild_members(&self, shard_id: u32, guild_ids: &[u64]) -> GatewayResult<()> {
        self.send_command(
            shard_id,
            GatewayCommand::RequestGuildMembers(guild_ids.to_vec()),
        )
    }

    fn send_command(&self, shard_id: u32, command: GatewayCommand) -> GatewayResult<()> {
        self.registry.require(shard_id)?.commander().send(command)
    }

    /// Gateway URL and shard count for the next boot
    ///
    /// A fixed shard count only applies until the gateway asks for resharding.
    async fn resolve(&self, resharding: bool) -> GatewayResult<(String, u32)> {
        let fixed_count = if resharding {
            None
        } else {
            self.config.shard_count
        };

        if let (Some(url), Some(count)) = (&self.config.gateway_url, fixed_count) {
            return Ok((url.clone(), count.max(1)));
        }

        let info = self.info.gateway_info().await?;
        let url = self.config.gateway_url.clone().unwrap_or(info.url);
        let count = fixed_count.unwrap_or(info.shards).max(1);
        info!(url = %url, shard_count = count, "Resolved gateway");
        Ok((url, count))
    }

    /// Boot `shard_count` shards and wait for all of them to stop
    async fn run_fleet(&self, url: &str, shard_count: u32) -> GatewayResult<()> {
        let fleet = self.shutdown.child_token();
        self.registry.reset(shard_count);
        info!(shard_count, "Booting shards");

        let mut shards = JoinSet::new();
        let mut outcome = Ok(());

        for shard_id in 0..shard_count {
            if shard_id > 0 {
                let stagger = tokio::time::sleep(self.config.startup_delay);
                tokio::pin!(stagger);

                loop {
                    tokio::select! {
                        () = &mut stagger => break,
                        () = fleet.cancelled() => break,
                        Some(joined) = shards.join_next() => {
                            if let Some(err) = shard_failure(joined) {
                                outcome = Err(err);
                                fleet.cancel();
                            }
                        }
                    }
                }
            }
            if fleet.is_cancelled() {
                break;
            }

            let handler = GatewayHandler::new(
                self.connector.clone(),
                self.config.token.clone(),
                url,
                shard_id,
                shard_count,
            );
            let runner = ShardRunner::new(
                handler,
                self.sink.clone(),
                self.registry.clone(),
                ReconnectBackoff::new(self.config.backoff_base_ms, self.config.backoff_max_ms),
                fleet.child_token(),
            );
            shards.spawn(runner.run());
        }

        while let Some(joined) = shards.join_next().await {
            if let Some(err) = shard_failure(joined) {
                if outcome.is_ok() {
                    outcome = Err(err);
                }
                // One fatal shard takes the fleet down.
                fleet.cancel();
            }
        }

        info!(shard_count, "All shards stopped");
        outcome
    }
}

fn shard_failure(joined: Result<GatewayResult<()>, JoinError>) -> Option<GatewayError> {
    match joined {
        Ok(Ok(())) => None,
        Ok(Err(err)) => Some(err),
        Err(err) => {
            error!(error = %err, "Shard task panicked");
            Some(GatewayError::Protocol(format!("shard task failed: {err}")))
        }
    }
}
