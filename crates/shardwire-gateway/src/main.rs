//! Gateway client entry point
//!
//! Run with:
//! ```bash
//! GATEWAY_TOKEN=... cargo run -p shardwire-gateway
//! ```
//!
//! Configuration is loaded from environment variables. Events are logged;
//! Ctrl-C closes every shard and exits.

use anyhow::Context;
use async_trait::async_trait;
use shardwire_common::{try_init_tracing_with_config, ClientConfig, TracingConfig};
use shardwire_gateway::{EventSink, GatewayEvent, ShardInfo, ShardManager, ShardManagerConfig};
use std::sync::Arc;
use tracing::{debug, error, info};

/// Logs every event
struct LogSink;

#[async_trait]
impl EventSink for LogSink {
    async fn on_event(&self, shard: ShardInfo, event: GatewayEvent) {
        match &event {
            GatewayEvent::Dispatch { event_name, .. } => {
                debug!(shard_id = shard.shard_id, event = %event_name, "Dispatch");
            }
            GatewayEvent::WebsocketClosed { code, reason } => {
                info!(shard_id = shard.shard_id, code, reason = %reason, "Connection closed");
            }
            other => debug!(shard_id = shard.shard_id, event = other.name(), "Gateway event"),
        }
    }

    async fn on_shards_ready(&self, shard_count: u32) {
        info!(shard_count, "All shards ready");
    }
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!(error = %e, "Gateway client failed");
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let config = ClientConfig::from_env().context("failed to load configuration")?;

    if let Err(e) = try_init_tracing_with_config(TracingConfig::for_environment(config.env)) {
        eprintln!("Warning: Failed to initialize tracing: {e}");
    }

    info!(
        env = ?config.env,
        shard_count = ?config.sharding.shard_count,
        "Configuration loaded"
    );

    let manager = Arc::new(ShardManager::new(
        ShardManagerConfig::from(&config),
        Arc::new(LogSink),
    ));

    let signals = tokio::spawn({
        let manager = manager.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Ctrl-C received");
                manager.shutdown();
            }
        }
    });

    let result = manager.run().await;
    signals.abort();
    result.context("gateway fleet stopped")?;

    info!("Gateway client stopped");
    Ok(())
}
