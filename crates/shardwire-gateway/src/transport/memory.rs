//! In-memory transport backend
//!
//! Each [`MemoryConnector::open`] creates a transport plus a [`MemoryPeer`]
//! playing the server side. Useful for driving the gateway state machine
//! without sockets.

use super::{Connector, Transport, TransportEvent};
use crate::error::TransportError;
use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;

/// A frame the client pushed into a memory transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientFrame {
    Text(String),
    Close { code: u16, reason: String, force: bool },
}

impl ClientFrame {
    /// Parse a text frame as JSON
    #[must_use]
    pub fn json(&self) -> Option<Value> {
        match self {
            Self::Text(text) => serde_json::from_str(text).ok(),
            Self::Close { .. } => None,
        }
    }

    /// The `op` of a text frame
    #[must_use]
    pub fn op(&self) -> Option<u64> {
        self.json().and_then(|v| v.get("op").and_then(Value::as_u64))
    }
}

/// Opens [`MemoryTransport`]s and hands the server side to a receiver
#[derive(Debug, Clone)]
pub struct MemoryConnector {
    peers: mpsc::UnboundedSender<MemoryPeer>,
}

impl MemoryConnector {
    /// Create a connector and the receiver that gets one peer per opened transport
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<MemoryPeer>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { peers: tx }, rx)
    }
}

impl Connector for MemoryConnector {
    type Transport = MemoryTransport;

    fn open(&self, url: &str) -> MemoryTransport {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (frame_tx, frame_rx) = mpsc::unbounded_channel();

        // The in-memory "socket" connects instantly.
        let _ = event_tx.send(TransportEvent::Connecting(url.to_string()));
        let _ = event_tx.send(TransportEvent::Connected(url.to_string(), None));

        let _ = self.peers.send(MemoryPeer {
            url: url.to_string(),
            events: event_tx,
            frames: frame_rx,
        });

        MemoryTransport {
            events: event_rx,
            frames: frame_tx,
            local_close: None,
            finished: false,
        }
    }
}

/// Client side of an in-memory connection
#[derive(Debug)]
pub struct MemoryTransport {
    events: mpsc::UnboundedReceiver<TransportEvent>,
    frames: mpsc::UnboundedSender<ClientFrame>,
    local_close: Option<(u16, String)>,
    finished: bool,
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn next_event(&mut self) -> Option<TransportEvent> {
        if self.finished {
            return None;
        }
        if let Some((code, reason)) = self.local_close.take() {
            self.finished = true;
            return Some(TransportEvent::Closing(code, reason));
        }

        let event = self.events.recv().await;
        if matches!(event, None | Some(TransportEvent::Closing(..))) {
            self.finished = true;
        }
        event
    }

    async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        if self.finished || self.local_close.is_some() {
            return Err(TransportError::Closed);
        }
        self.frames
            .send(ClientFrame::Text(text))
            .map_err(|_| TransportError::Closed)
    }

    async fn close(&mut self, code: u16, reason: &str, force: bool) -> Result<(), TransportError> {
        if self.finished || self.local_close.is_some() {
            return Err(TransportError::Closed);
        }
        let _ = self.frames.send(ClientFrame::Close {
            code,
            reason: reason.to_string(),
            force,
        });
        self.local_close = Some((code, reason.to_string()));
        Ok(())
    }
}

/// Server side of an in-memory connection
#[derive(Debug)]
pub struct MemoryPeer {
    url: String,
    events: mpsc::UnboundedSender<TransportEvent>,
    frames: mpsc::UnboundedReceiver<ClientFrame>,
}

impl MemoryPeer {
    /// URL the client opened
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Deliver a text frame to the client
    pub fn send_text(&self, text: impl Into<String>) {
        let _ = self.events.send(TransportEvent::Text(text.into()));
    }

    /// Deliver a JSON payload as a text frame
    pub fn send_json(&self, value: &Value) {
        self.send_text(value.to_string());
    }

    /// Deliver a binary frame to the client
    pub fn send_binary(&self, data: impl Into<Vec<u8>>) {
        let _ = self.events.send(TransportEvent::Binary(data.into()));
    }

    /// Close the connection from the server side
    pub fn close(&self, code: u16, reason: impl Into<String>) {
        let _ = self.events.send(TransportEvent::Closing(code, reason.into()));
    }

    /// Next frame the client sent; `None` once the client transport is gone
    pub async fn recv(&mut self) -> Option<ClientFrame> {
        self.frames.recv().await
    }

    /// Next frame the client sent, if one is already queued
    pub fn try_recv(&mut self) -> Option<ClientFrame> {
        self.frames.try_recv().ok()
    }
}
