//! One shard's task: connect, pump events to the sink, reconnect with backoff

use super::{EventSink, ReconnectBackoff, ShardHandle, ShardInfo, ShardRegistry};
use crate::error::GatewayResult;
use crate::gateway::{CloseOptions, GatewayEvent, GatewayHandler};
use crate::protocol::CloseCode;
use crate::transport::{Connector, CLOSE_TIMEOUT};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, Instrument};

/// Upper bound on draining a shard's close during shutdown
const SHUTDOWN_GRACE: Duration = CLOSE_TIMEOUT.saturating_add(Duration::from_secs(1));

pub(crate) struct ShardRunner<C: Connector> {
    info: ShardInfo,
    handler: GatewayHandler<C>,
    sink: Arc<dyn EventSink>,
    registry: Arc<ShardRegistry>,
    backoff: ReconnectBackoff,
    cancel: CancellationToken,
}

impl<C: Connector> ShardRunner<C> {
    pub(crate) fn new(
        handler: GatewayHandler<C>,
        sink: Arc<dyn EventSink>,
        registry: Arc<ShardRegistry>,
        backoff: ReconnectBackoff,
        cancel: CancellationToken,
    ) -> Self {
        let session = handler.session();
        let info = ShardInfo {
            shard_id: session.shard_id,
            shard_count: session.shard_count,
        };

        Self {
            info,
            handler,
            sink,
            registry,
            backoff,
            cancel,
        }
    }

    /// Run until shutdown (`Ok`) or a fatal close (`Err`)
    pub(crate) async fn run(mut self) -> GatewayResult<()> {
        let span = tracing::info_span!(
            "shard",
            shard_id = self.info.shard_id,
            shard_count = self.info.shard_count
        );

        async move {
            self.registry.insert(ShardHandle::new(
                self.info,
                self.handler.commander(),
                self.handler.subscribe_stats(),
            ));
            info!("Shard starting");

            let result = self.drive().await;

            self.registry.remove(self.info.shard_id);
            match &result {
                Ok(()) => info!("Shard stopped"),
                Err(e) => error!(error = %e, "Shard terminated"),
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn drive(&mut self) -> GatewayResult<()> {
        loop {
            self.handler.open();

            loop {
                let next = tokio::select! {
                    biased;
                    () = self.cancel.cancelled() => None,
                    next = self.handler.next_event() => Some(next),
                };
                let Some(next) = next else {
                    self.shutdown().await;
                    return Ok(());
                };

                match next? {
                    Some(event) => self.deliver(event).await,
                    None => break,
                }
            }

            let delay = self.backoff.next_delay();
            info!(
                delay_ms = delay.as_millis() as u64,
                failures = self.backoff.failures(),
                "Connection closed, reconnecting"
            );
            tokio::select! {
                () = self.cancel.cancelled() => return Ok(()),
                () = tokio::time::sleep(delay) => {}
            }
        }
    }

    async fn deliver(&mut self, event: GatewayEvent) {
        let ready = event.is_ready();
        self.sink.on_event(self.info, event).await;

        if ready {
            self.backoff.session_established();
            if self.registry.mark_ready(self.info.shard_id) {
                info!("All shards ready");
                self.sink.on_shards_ready(self.info.shard_count).await;
            }
        }
    }

    /// Close politely and hand the final events to the sink
    async fn shutdown(&mut self) {
        debug!("Shutdown requested");
        if let Err(e) = self
            .handler
            .close(
                CloseCode::Normal.as_u16(),
                "Client shutting down",
                CloseOptions::default(),
            )
            .await
        {
            debug!(error = %e, "Close during shutdown failed");
        }

        let drain = async {
            while let Ok(Some(event)) = self.handler.next_event().await {
                self.sink.on_event(self.info, event).await;
            }
        };
        if tokio::time::timeout(SHUTDOWN_GRACE, drain).await.is_err() {
            debug!("Connection did not close in time");
        }
    }
}
