//! Gateway state machine
//!
//! [`GatewayHandler`] owns one shard's transport, stream inflater, heartbeat
//! supervisor and session. Callers pull events with
//! [`next_event`](GatewayHandler::next_event); every inbound payload, heartbeat
//! tick and queued command is handled inside that call, one at a time.

use super::commands::{GatewayCommand, GatewayCommander};
use super::events::{GatewayEvent, READY, RESUMED};
use crate::compression::StreamInflater;
use crate::error::{DecodeError, GatewayError, GatewayResult, TransportError};
use crate::heartbeat::{HeartbeatStats, HeartbeatSupervisor};
use crate::protocol::{
    self, CloseCode, GatewayMessage, HelloPayload, OpCode, PresenceUpdate, ReadyPayload,
    RequestGuildMembers,
};
use crate::session::SessionState;
use crate::transport::{Connector, Transport, TransportEvent};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, trace, warn};

/// How a connection should be torn down
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CloseOptions {
    /// Open a fresh connection as soon as this one has closed
    pub reconnect: bool,
    /// Forget the session id and sequence, so the next handshake identifies
    pub clear_session_id: bool,
    /// Drop the socket without a close handshake
    pub forceful: bool,
}

impl CloseOptions {
    /// Reconnect and resume the current session
    #[must_use]
    pub const fn resume() -> Self {
        Self {
            reconnect: true,
            clear_session_id: false,
            forceful: false,
        }
    }
}

impl Default for CloseOptions {
    fn default() -> Self {
        Self {
            reconnect: false,
            clear_session_id: true,
            forceful: false,
        }
    }
}

enum Step {
    Tick,
    Command(GatewayCommand),
    Transport(Option<TransportEvent>),
}

/// The per-shard gateway state machine
pub struct GatewayHandler<C: Connector> {
    connector: C,
    session: SessionState,
    heartbeat: HeartbeatSupervisor,
    inflater: StreamInflater,
    transport: Option<C::Transport>,
    reconnect_pending: bool,
    terminal: Option<GatewayError>,
    dispatches: HashMap<String, u64>,
    commands_tx: mpsc::UnboundedSender<GatewayCommand>,
    commands_rx: mpsc::UnboundedReceiver<GatewayCommand>,
    stats_tx: watch::Sender<HeartbeatStats>,
}

impl<C: Connector> GatewayHandler<C> {
    /// Create a handler for one shard
    ///
    /// `gateway_url` is the bare gateway URL; the protocol query string is
    /// appended here. Nothing connects until [`open`](Self::open).
    pub fn new(
        connector: C,
        token: impl Into<String>,
        gateway_url: &str,
        shard_id: u32,
        shard_count: u32,
    ) -> Self {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (stats_tx, _) = watch::channel(HeartbeatStats::default());

        Self {
            connector,
            session: SessionState::new(
                token,
                protocol::connect_url(gateway_url),
                shard_id,
                shard_count,
            ),
            heartbeat: HeartbeatSupervisor::new(),
            inflater: StreamInflater::new(),
            transport: None,
            reconnect_pending: false,
            terminal: None,
            dispatches: HashMap::new(),
            commands_tx,
            commands_rx,
            stats_tx,
        }
    }

    /// Start a new connection attempt, abandoning any current one
    pub fn open(&mut self) {
        self.transport = None;
        self.inflater.reset();
        self.reconnect_pending = false;
        self.session.authenticated = false;

        info!(url = %self.session.gateway_url, "Opening gateway connection");
        self.transport = Some(self.connector.open(&self.session.gateway_url));
    }

    /// Drive the connection until the next event
    ///
    /// Returns `Ok(None)` once the connection has ended and no internal
    /// reconnect is pending; the caller decides whether to [`open`](Self::open)
    /// again. A fatal close surfaces as `Err` right after its
    /// `WebsocketClosed` event.
    pub async fn next_event(&mut self) -> GatewayResult<Option<GatewayEvent>> {
        loop {
            if let Some(err) = self.terminal.take() {
                self.transport = None;
                self.reconnect_pending = false;
                return Err(err);
            }

            if self.transport.is_none() {
                if !self.reconnect_pending {
                    return Ok(None);
                }
                self.open();
            }

            // Commands wait in the queue until READY or RESUMED.
            let accepting_commands = self.session.authenticated;
            let step = {
                let Some(transport) = self.transport.as_mut() else {
                    continue;
                };
                tokio::select! {
                    biased;
                    () = self.heartbeat.tick() => Step::Tick,
                    Some(command) = self.commands_rx.recv(), if accepting_commands => {
                        Step::Command(command)
                    }
                    event = transport.next_event() => Step::Transport(event),
                }
            };

            let event = match step {
                Step::Tick => {
                    self.on_heartbeat_tick().await;
                    None
                }
                Step::Command(command) => {
                    self.on_command(command).await;
                    None
                }
                Step::Transport(Some(event)) => self.on_transport_event(event).await,
                Step::Transport(None) => {
                    trace!("Transport finished");
                    self.transport = None;
                    self.heartbeat.stop();
                    None
                }
            };

            self.publish_stats();
            if event.is_some() {
                return Ok(event);
            }
        }
    }

    /// Close the current connection
    ///
    /// Heartbeating always stops. The resulting `WebsocketClosed` event is
    /// still delivered through [`next_event`](Self::next_event).
    pub async fn close(
        &mut self,
        code: u16,
        reason: &str,
        options: CloseOptions,
    ) -> GatewayResult<()> {
        self.heartbeat.stop();
        if options.clear_session_id {
            self.session.clear();
        }
        self.reconnect_pending = options.reconnect;
        self.publish_stats();

        match self.transport.as_mut() {
            Some(transport) => {
                debug!(code, reason, forceful = options.forceful, "Closing connection");
                transport.close(code, reason, options.forceful).await?;
                Ok(())
            }
            None => Ok(()),
        }
    }

    /// Send a presence update on the current connection
    pub async fn send_presence(&mut self, presence: &PresenceUpdate) -> GatewayResult<()> {
        self.send(OpCode::PresenceUpdate, presence).await
    }

    /// Ask for the full member lists of the given guilds
    pub async fn request_guild_members(&mut self, guild_ids: &[u64]) -> GatewayResult<()> {
        self.send(OpCode::RequestGuildMembers, &RequestGuildMembers::all(guild_ids))
            .await
    }

    /// Handle for queueing commands from other tasks
    pub fn commander(&self) -> GatewayCommander {
        GatewayCommander::new(self.commands_tx.clone())
    }

    /// Receiver of this connection's heartbeat stats
    pub fn subscribe_stats(&self) -> watch::Receiver<HeartbeatStats> {
        self.stats_tx.subscribe()
    }

    pub fn heartbeat_stats(&self) -> HeartbeatStats {
        *self.heartbeat.stats()
    }

    pub fn session(&self) -> &SessionState {
        &self.session
    }

    /// Count of dispatches handled, by event name
    pub fn dispatches_handled(&self) -> &HashMap<String, u64> {
        &self.dispatches
    }

    pub fn is_connected(&self) -> bool {
        self.transport.is_some()
    }

    async fn on_transport_event(&mut self, event: TransportEvent) -> Option<GatewayEvent> {
        match event {
            TransportEvent::Connecting(url) => {
                info!("The websocket is opening");
                // New connection, new compression stream.
                self.inflater.reset();
                Some(GatewayEvent::WebsocketOpened { url })
            }
            TransportEvent::Connected(url, proxy) => {
                info!("The websocket has connected");
                self.session.authenticated = false;
                Some(GatewayEvent::WebsocketConnected { url, proxy })
            }
            TransportEvent::Closing(code, reason) => {
                self.heartbeat.stop();
                info!(code, reason = %reason, "The websocket has closed");

                if let Some(err) = GatewayError::from_close_code(code) {
                    error!(code, error = %err, "Gateway closed the connection");
                    self.reconnect_pending = false;
                    self.terminal = Some(err);
                }
                Some(GatewayEvent::WebsocketClosed { code, reason })
            }
            TransportEvent::Text(text) => self.on_payload(&text).await,
            TransportEvent::Binary(data) => match self.inflater.push(&data) {
                Ok(None) => None,
                Ok(Some(text)) => self.on_payload(&text).await,
                Err(e) => {
                    self.on_corrupt_stream(&e).await;
                    None
                }
            },
        }
    }

    async fn on_payload(&mut self, text: &str) -> Option<GatewayEvent> {
        if text.is_empty() {
            return None;
        }

        let envelope = match protocol::decode(text) {
            Ok(envelope) => envelope,
            Err(e) => {
                self.on_corrupt_stream(&e).await;
                return None;
            }
        };

        if let Some(sequence) = envelope.sequence {
            self.session.sequence = Some(sequence);
        }

        match envelope.message {
            GatewayMessage::Hello(hello) => Some(self.on_hello(hello).await),

            GatewayMessage::Heartbeat { .. } => {
                let result = self.send_heartbeat().await;
                log_send_failure("heartbeat", result);
                Some(GatewayEvent::HeartbeatReceived)
            }

            GatewayMessage::HeartbeatAck => {
                trace!("Received heartbeat ack");
                self.heartbeat.stats_mut().record_ack();
                Some(GatewayEvent::HeartbeatAck)
            }

            GatewayMessage::InvalidateSession { resumable } => {
                let result = if resumable {
                    debug!("Session invalidated but resumable, sending RESUME again");
                    self.send_resume().await
                } else {
                    warn!("Session invalidated, re-identifying");
                    self.session.invalidate();
                    self.heartbeat.reset_stats();
                    self.send_identify().await
                };
                log_send_failure("identify/resume", result);
                Some(GatewayEvent::InvalidateSession { resumable })
            }

            GatewayMessage::Dispatch { event, data } => {
                let event_name = event.filter(|name| !name.is_empty())?;
                self.on_dispatch(&event_name, &data);
                Some(GatewayEvent::Dispatch {
                    event_name,
                    payload: data,
                })
            }

            GatewayMessage::Reconnect => {
                info!("Being asked to reconnect");
                let result = self
                    .close(
                        CloseCode::Normal.as_u16(),
                        "Server requested reconnect",
                        CloseOptions::resume(),
                    )
                    .await;
                log_send_failure("close", result);
                None
            }

            GatewayMessage::Other { op, .. } => {
                warn!(op = %op, "Unhandled opcode");
                None
            }

            GatewayMessage::Unrecognized { op } => {
                warn!(op, "Unknown opcode");
                None
            }
        }
    }

    async fn on_hello(&mut self, hello: HelloPayload) -> GatewayEvent {
        let HelloPayload {
            heartbeat_interval,
            trace,
        } = hello;
        let interval_ms = if heartbeat_interval == 0 {
            HelloPayload::DEFAULT_HEARTBEAT_INTERVAL
        } else {
            heartbeat_interval
        };
        info!(interval_ms, trace = %trace.join(", "), "Received HELLO");

        self.heartbeat.start(Duration::from_millis(interval_ms));
        let result = self.send_heartbeat().await;
        log_send_failure("heartbeat", result);

        let result = if self.session.can_resume() {
            self.send_resume().await
        } else {
            self.send_identify().await
        };
        log_send_failure("identify/resume", result);

        GatewayEvent::Hello { trace }
    }

    fn on_dispatch(&mut self, event_name: &str, data: &Value) {
        match event_name {
            READY => {
                self.session.authenticated = true;
                match ReadyPayload::deserialize(data).ok().and_then(|r| r.session_id) {
                    Some(session_id) => {
                        info!(session_id = %session_id, "Session is ready");
                        self.session.session_id = Some(session_id);
                    }
                    None => warn!("READY without a session id"),
                }
            }
            RESUMED => {
                info!(sequence = ?self.session.sequence, "Session resumed");
                self.session.authenticated = true;
            }
            _ => {}
        }

        trace!(event = event_name, sequence = ?self.session.sequence, "Dispatch received");
        *self.dispatches.entry(event_name.to_string()).or_insert(0) += 1;
    }

    async fn on_heartbeat_tick(&mut self) {
        if self.heartbeat.is_zombied(&self.session) {
            warn!(
                sent = self.heartbeat.stats().heartbeats_sent,
                acked = self.heartbeat.stats().acks_received,
                "Connection has zombied, reconnecting"
            );
            let result = self
                .close(
                    CloseCode::Abnormal.as_u16(),
                    "Zombied connection",
                    CloseOptions {
                        reconnect: true,
                        clear_session_id: false,
                        forceful: true,
                    },
                )
                .await;
            log_send_failure("close", result);
            return;
        }

        let result = self.send_heartbeat().await;
        log_send_failure("heartbeat", result);
    }

    async fn on_command(&mut self, command: GatewayCommand) {
        let result = match command {
            GatewayCommand::UpdatePresence(presence) => self.send_presence(&presence).await,
            GatewayCommand::RequestGuildMembers(guild_ids) => {
                self.request_guild_members(&guild_ids).await
            }
        };
        log_send_failure("command", result);
    }

    /// The zlib stream or a payload is unreadable; only a fresh connection recovers
    async fn on_corrupt_stream(&mut self, err: &DecodeError) {
        warn!(error = %err, "Undecodable payload, reconnecting");
        let result = self
            .close(
                CloseCode::ProtocolError.as_u16(),
                "Undecodable payload",
                CloseOptions {
                    reconnect: true,
                    clear_session_id: false,
                    forceful: true,
                },
            )
            .await;
        log_send_failure("close", result);
    }

    async fn send_heartbeat(&mut self) -> GatewayResult<()> {
        let sequence = self.session.sequence;
        debug!(sequence = ?sequence, "Heartbeating");
        self.send(OpCode::Heartbeat, &sequence).await?;
        self.heartbeat.stats_mut().record_heartbeat();
        Ok(())
    }

    async fn send_identify(&mut self) -> GatewayResult<()> {
        info!(
            shard_id = self.session.shard_id,
            shard_count = self.session.shard_count,
            "Sending IDENTIFY"
        );
        let payload = self.session.identify_payload();
        self.send(OpCode::Identify, &payload).await
    }

    async fn send_resume(&mut self) -> GatewayResult<()> {
        match self.session.resume_payload() {
            Some(payload) => {
                info!(sequence = ?payload.seq, "Sending RESUME");
                self.send(OpCode::Resume, &payload).await
            }
            None => {
                debug!("No session to resume");
                self.send_identify().await
            }
        }
    }

    async fn send<T: Serialize + Sync>(&mut self, op: OpCode, data: &T) -> GatewayResult<()> {
        let text = protocol::encode(op, data)?;
        let transport = self.transport.as_mut().ok_or(TransportError::Closed)?;
        transport.send_text(text).await?;
        Ok(())
    }

    fn publish_stats(&self) {
        let current = *self.heartbeat.stats();
        self.stats_tx.send_if_modified(|stats| {
            if *stats == current {
                false
            } else {
                *stats = current;
                true
            }
        });
    }
}

/// Sends racing a close are expected; anything else is worth a warning
fn log_send_failure(what: &'static str, result: GatewayResult<()>) {
    match result {
        Ok(()) => {}
        Err(GatewayError::Transport(TransportError::Closed)) => {
            debug!(what, "Connection closing, send dropped");
        }
        Err(e) => warn!(what, error = %e, "Send failed"),
    }
}
