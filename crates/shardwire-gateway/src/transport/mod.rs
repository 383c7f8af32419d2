//! Frame transport
//!
//! A transport is one connection attempt. It yields a stream of
//! [`TransportEvent`]s (lifecycle plus data frames) and accepts text frames
//! and a close request. Reconnecting always means opening a new transport
//! through a [`Connector`]; nothing is reused between attempts.

mod memory;
mod websocket;

pub use memory::{ClientFrame, MemoryConnector, MemoryPeer, MemoryTransport};
pub use websocket::{WebSocketConnector, WebSocketTransport, CLOSE_TIMEOUT};

use crate::error::TransportError;
use async_trait::async_trait;

/// Events produced by a transport, in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// A connection attempt to this URL has started
    Connecting(String),
    /// The connection is established; the second field describes a proxy, if one is used
    Connected(String, Option<String>),
    Text(String),
    Binary(Vec<u8>),
    /// The connection is closing with this code and reason; nothing follows
    Closing(u16, String),
}

/// One connection attempt
#[async_trait]
pub trait Transport: Send {
    /// Next event, or `None` once the connection has fully ended
    ///
    /// Cancel safe: dropping the future loses no events.
    async fn next_event(&mut self) -> Option<TransportEvent>;

    /// Send one text frame
    async fn send_text(&mut self, text: String) -> Result<(), TransportError>;

    /// Close the connection
    ///
    /// With `force` the socket is dropped without a close handshake. After
    /// either kind of close, [`next_event`](Self::next_event) yields a
    /// `Closing` event and then ends promptly.
    async fn close(&mut self, code: u16, reason: &str, force: bool) -> Result<(), TransportError>;
}

/// Opens transports
pub trait Connector: Clone + Send + Sync + 'static {
    type Transport: Transport + 'static;

    /// Start connecting to `url`; progress is reported through the transport's events
    fn open(&self, url: &str) -> Self::Transport;
}
