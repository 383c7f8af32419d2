//! tokio-tungstenite transport backend
//!
//! A driver task owns the socket and multiplexes outbound commands with
//! inbound frames, so sending never waits on receiving.

use super::{Connector, Transport, TransportEvent};
use crate::error::TransportError;
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

/// How long a graceful close waits for the server's close frame
pub const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

/// Close code reported when the socket ends without a close frame
const ABNORMAL: u16 = 1006;

/// Close code reported for a close frame without a status
const NO_STATUS: u16 = 1005;

enum DriverCommand {
    Text(String),
    Close {
        code: u16,
        reason: String,
        force: bool,
    },
}

/// Opens [`WebSocketTransport`]s
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketConnector;

impl Connector for WebSocketConnector {
    type Transport = WebSocketTransport;

    fn open(&self, url: &str) -> WebSocketTransport {
        WebSocketTransport::connect(url)
    }
}

/// A websocket connection driven by a background task
pub struct WebSocketTransport {
    commands: mpsc::UnboundedSender<DriverCommand>,
    events: mpsc::UnboundedReceiver<TransportEvent>,
    closed: bool,
    driver: JoinHandle<()>,
}

impl WebSocketTransport {
    /// Spawn the driver task and start connecting
    #[must_use]
    pub fn connect(url: &str) -> Self {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let driver = tokio::spawn(drive(url.to_string(), event_tx, command_rx));

        Self {
            commands: command_tx,
            events: event_rx,
            closed: false,
            driver,
        }
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn next_event(&mut self) -> Option<TransportEvent> {
        self.events.recv().await
    }

    async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        self.commands
            .send(DriverCommand::Text(text))
            .map_err(|_| TransportError::Closed)
    }

    async fn close(&mut self, code: u16, reason: &str, force: bool) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        self.closed = true;
        self.commands
            .send(DriverCommand::Close {
                code,
                reason: reason.to_string(),
                force,
            })
            .map_err(|_| TransportError::Closed)
    }
}

impl Drop for WebSocketTransport {
    fn drop(&mut self) {
        self.driver.abort();
    }
}

async fn drive(
    url: String,
    events: mpsc::UnboundedSender<TransportEvent>,
    mut commands: mpsc::UnboundedReceiver<DriverCommand>,
) {
    let _ = events.send(TransportEvent::Connecting(url.clone()));

    // A close issued mid-handshake abandons the connect.
    let mut queued = Vec::new();
    let connect = connect_async(url.clone());
    tokio::pin!(connect);
    let ws = loop {
        tokio::select! {
            result = &mut connect => match result {
                Ok((ws, _response)) => break ws,
                Err(e) => {
                    warn!(error = %e, "Failed to connect to gateway");
                    let _ = events.send(TransportEvent::Closing(ABNORMAL, e.to_string()));
                    return;
                }
            },
            command = commands.recv() => match command {
                Some(DriverCommand::Text(text)) => queued.push(text),
                Some(DriverCommand::Close { code, reason, .. }) => {
                    debug!(code, "Closed before the handshake completed");
                    let _ = events.send(TransportEvent::Closing(code, reason));
                    return;
                }
                None => return,
            },
        }
    };
    info!(url = %url, "WebSocket connected");
    let _ = events.send(TransportEvent::Connected(url, None));

    let (mut sink, mut stream) = ws.split();

    for text in queued {
        if let Err(e) = sink.send(Message::Text(text.into())).await {
            debug!(error = %e, "Send failed");
            let _ = events.send(TransportEvent::Closing(ABNORMAL, e.to_string()));
            return;
        }
    }

    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(DriverCommand::Text(text)) => {
                    if let Err(e) = sink.send(Message::Text(text.into())).await {
                        debug!(error = %e, "Send failed");
                        let _ = events.send(TransportEvent::Closing(ABNORMAL, e.to_string()));
                        return;
                    }
                }
                Some(DriverCommand::Close { code, reason, force: true }) => {
                    debug!(code, "Dropping socket without close handshake");
                    let _ = events.send(TransportEvent::Closing(code, reason));
                    return;
                }
                Some(DriverCommand::Close { code, reason, force: false }) => {
                    let frame = CloseFrame {
                        code: code.into(),
                        reason: reason.clone().into(),
                    };
                    if let Err(e) = sink.send(Message::Close(Some(frame))).await {
                        debug!(error = %e, "Close frame send failed");
                    }

                    // Wait briefly for the server to echo the close.
                    let echoed = tokio::time::timeout(CLOSE_TIMEOUT, async {
                        while let Some(message) = stream.next().await {
                            match message {
                                Ok(Message::Close(frame)) => {
                                    return frame.map(|f| (u16::from(f.code), f.reason.to_string()));
                                }
                                Ok(_) => {}
                                Err(_) => break,
                            }
                        }
                        None
                    })
                    .await
                    .ok()
                    .flatten();

                    let (code, reason) = echoed.unwrap_or((code, reason));
                    let _ = events.send(TransportEvent::Closing(code, reason));
                    return;
                }
                // Transport dropped
                None => return,
            },

            message = stream.next() => match message {
                Some(Ok(Message::Text(text))) => {
                    let _ = events.send(TransportEvent::Text(text.to_string()));
                }
                Some(Ok(Message::Binary(data))) => {
                    let _ = events.send(TransportEvent::Binary(data.to_vec()));
                }
                Some(Ok(Message::Close(frame))) => {
                    let (code, reason) = frame
                        .map_or((NO_STATUS, String::new()), |f| (u16::from(f.code), f.reason.to_string()));
                    info!(code, reason = %reason, "Server closed the connection");
                    // Completes the close handshake.
                    let _ = sink.close().await;
                    let _ = events.send(TransportEvent::Closing(code, reason));
                    return;
                }
                Some(Ok(_)) => {
                    // Ping/pong handled by tungstenite.
                }
                Some(Err(e)) => {
                    warn!(error = %e, "WebSocket error");
                    let _ = events.send(TransportEvent::Closing(ABNORMAL, e.to_string()));
                    return;
                }
                None => {
                    let _ = events.send(TransportEvent::Closing(ABNORMAL, "Connection lost".to_string()));
                    return;
                }
            },
        }
    }
}
