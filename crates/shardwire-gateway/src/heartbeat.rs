//! Heartbeat supervision
//!
//! The supervisor runs a ticker task at the interval the server sent in
//! HELLO. The ticker only posts ticks; the owning handler decides on each
//! tick whether to heartbeat or to tear down a zombied connection, so all
//! session and counter mutation stays in the shard's task.

use crate::session::SessionState;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// Heartbeat counters and timestamps for one connection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeartbeatStats {
    pub heartbeats_sent: u64,
    pub acks_received: u64,
    pub last_heartbeat_time: Option<Instant>,
    pub last_ack_time: Option<Instant>,
}

impl HeartbeatStats {
    /// Round trip of the most recent acknowledged heartbeat
    #[must_use]
    pub fn latency(&self) -> Option<Duration> {
        match (self.last_heartbeat_time, self.last_ack_time) {
            (Some(sent), Some(acked)) if acked >= sent => Some(acked - sent),
            _ => None,
        }
    }

    /// A connection is zombied when more than one heartbeat is unacknowledged
    /// on an authenticated session
    #[must_use]
    pub fn is_zombied(&self, session: &SessionState) -> bool {
        self.heartbeats_sent > self.acks_received + 1
            && session.session_id.is_some()
            && session.authenticated
    }

    pub fn record_heartbeat(&mut self) {
        self.heartbeats_sent += 1;
        self.last_heartbeat_time = Some(Instant::now());
    }

    pub fn record_ack(&mut self) {
        self.acks_received += 1;
        self.last_ack_time = Some(Instant::now());
    }

    /// Zero both counters, keeping the timestamps for latency reporting
    pub fn reset_counts(&mut self) {
        self.heartbeats_sent = 0;
        self.acks_received = 0;
    }
}

/// Periodic heartbeat timer: `Stopped` or `Running(interval)`
#[derive(Debug, Default)]
pub struct HeartbeatSupervisor {
    interval: Option<Duration>,
    ticks: Option<mpsc::Receiver<()>>,
    stop: Option<CancellationToken>,
    task: Option<JoinHandle<()>>,
    stats: HeartbeatStats,
}

impl HeartbeatSupervisor {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start ticking every `interval`, stopping any previous run first
    pub fn start(&mut self, interval: Duration) {
        self.stop();

        let token = CancellationToken::new();
        let (tx, rx) = mpsc::channel(1);
        let task = tokio::spawn(run_ticker(interval, tx, token.clone()));

        debug!(interval_ms = interval.as_millis() as u64, "Heartbeating started");
        self.interval = Some(interval);
        self.ticks = Some(rx);
        self.stop = Some(token);
        self.task = Some(task);
    }

    /// Cancel the ticker and zero both counters
    pub fn stop(&mut self) {
        if let Some(token) = self.stop.take() {
            token.cancel();
            trace!("Heartbeating stopped");
        }
        // The ticker exits on cancellation; the handle is only kept to detach it.
        self.task = None;
        self.ticks = None;
        self.interval = None;
        self.stats.reset_counts();
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.stop.is_some()
    }

    #[must_use]
    pub fn interval(&self) -> Option<Duration> {
        self.interval
    }

    /// Wait for the next tick; pends forever while stopped
    ///
    /// Cancel safe.
    pub async fn tick(&mut self) {
        loop {
            let Some(ticks) = self.ticks.as_mut() else {
                return std::future::pending().await;
            };
            if ticks.recv().await.is_some() {
                return;
            }
            self.ticks = None;
        }
    }

    #[must_use]
    pub fn stats(&self) -> &HeartbeatStats {
        &self.stats
    }

    pub fn stats_mut(&mut self) -> &mut HeartbeatStats {
        &mut self.stats
    }

    /// Replace the stats wholesale (counters and timestamps)
    pub fn reset_stats(&mut self) {
        self.stats = HeartbeatStats::default();
    }

    #[must_use]
    pub fn is_zombied(&self, session: &SessionState) -> bool {
        self.stats.is_zombied(session)
    }
}

impl Drop for HeartbeatSupervisor {
    fn drop(&mut self) {
        if let Some(token) = self.stop.take() {
            token.cancel();
        }
    }
}

async fn run_ticker(interval: Duration, ticks: mpsc::Sender<()>, stop: CancellationToken) {
    loop {
        tokio::select! {
            biased;
            () = stop.cancelled() => break,
            () = tokio::time::sleep(interval) => {
                match ticks.try_send(()) {
                    // A full queue means a tick is already pending.
                    Ok(()) | Err(mpsc::error::TrySendError::Full(())) => {}
                    Err(mpsc::error::TrySendError::Closed(())) => break,
                }
            }
        }
    }
}
