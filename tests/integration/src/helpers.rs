//! Test helpers for integration tests
//!
//! Provides a mock gateway: an axum websocket server that hands every
//! accepted connection to the test as a [`ServerConn`].

use std::borrow::Cow;
use std::io::Write;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU16, Ordering};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{RawQuery, State};
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Counter for unique test ports
static PORT_COUNTER: AtomicU16 = AtomicU16::new(19600);

/// How long a test waits for the client before failing
pub const STEP_TIMEOUT: Duration = Duration::from_secs(5);

/// Get a unique port for testing
pub fn get_test_port() -> u16 {
    PORT_COUNTER.fetch_add(1, Ordering::SeqCst)
}

/// Install a debug subscriber once; later calls are no-ops
pub fn init_test_tracing() {
    let _ = shardwire_common::try_init_tracing_with_config(
        shardwire_common::TracingConfig::development(),
    );
}

type ConnTx = mpsc::UnboundedSender<ServerConn>;

/// Mock gateway server instance
pub struct MockGateway {
    pub addr: SocketAddr,
    conns: mpsc::UnboundedReceiver<ServerConn>,
    _handle: JoinHandle<()>,
}

impl MockGateway {
    /// Start a mock gateway on a fresh port
    pub async fn start() -> Result<Self> {
        let port = get_test_port();
        let addr = SocketAddr::from(([127, 0, 0, 1], port));

        let (tx, conns) = mpsc::unbounded_channel();
        let app = Router::new().route("/", get(upgrade)).with_state(tx);

        let listener = TcpListener::bind(addr).await?;
        let actual_addr = listener.local_addr()?;

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });

        Ok(Self {
            addr: actual_addr,
            conns,
            _handle: handle,
        })
    }

    /// Base websocket URL; the client appends its own query
    pub fn url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    /// Wait for the next client connection
    pub async fn accept(&mut self) -> Result<ServerConn> {
        tokio::time::timeout(STEP_TIMEOUT, self.conns.recv())
            .await
            .context("no connection within timeout")?
            .context("mock gateway stopped")
    }
}

async fn upgrade(
    State(tx): State<ConnTx>,
    RawQuery(query): RawQuery,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| async move {
        let _ = tx.send(ServerConn::new(socket, query.unwrap_or_default()));
    })
}

/// Server side of one client connection
///
/// Everything sent is compressed with one zlib context per connection and
/// sync-flushed, so each message ends with the `00 00 FF FF` marker.
pub struct ServerConn {
    socket: WebSocket,
    query: String,
    encoder: ZlibEncoder<Vec<u8>>,
}

impl ServerConn {
    fn new(socket: WebSocket, query: String) -> Self {
        Self {
            socket,
            query,
            encoder: ZlibEncoder::new(Vec::new(), Compression::default()),
        }
    }

    /// Query string the client connected with
    pub fn query(&self) -> &str {
        &self.query
    }

    fn compress(&mut self, value: &Value) -> Result<Vec<u8>> {
        self.encoder.write_all(value.to_string().as_bytes())?;
        self.encoder.flush()?;
        Ok(std::mem::take(self.encoder.get_mut()))
    }

    /// Send one compressed payload in a single binary frame
    pub async fn send(&mut self, value: Value) -> Result<()> {
        let data = self.compress(&value)?;
        self.socket.send(Message::Binary(data)).await?;
        Ok(())
    }

    /// Send one compressed payload split across two binary frames
    pub async fn send_split(&mut self, value: Value) -> Result<()> {
        let mut data = self.compress(&value)?;
        let tail = data.split_off(data.len() / 2);
        self.socket.send(Message::Binary(data)).await?;
        self.socket.send(Message::Binary(tail)).await?;
        Ok(())
    }

    /// Close with a code and reason
    pub async fn close(&mut self, code: u16, reason: &'static str) -> Result<()> {
        self.socket
            .send(Message::Close(Some(CloseFrame {
                code,
                reason: Cow::Borrowed(reason),
            })))
            .await?;
        Ok(())
    }

    /// Next text frame from the client, parsed as JSON
    pub async fn recv_json(&mut self) -> Result<Value> {
        loop {
            match self.next_message().await? {
                Message::Text(text) => return Ok(serde_json::from_str(&text)?),
                Message::Close(frame) => bail!("client closed: {frame:?}"),
                _ => {}
            }
        }
    }

    /// Next text frame, which must carry opcode `op`
    pub async fn expect_op(&mut self, op: u64) -> Result<Value> {
        let frame = self.recv_json().await?;
        if frame["op"] != op {
            bail!("expected op {op}, got {frame}");
        }
        Ok(frame)
    }

    /// Wait for the client's close frame, skipping anything before it
    pub async fn recv_close(&mut self) -> Result<(u16, String)> {
        loop {
            if let Message::Close(frame) = self.next_message().await? {
                return Ok(frame
                    .map(|f| (f.code, f.reason.into_owned()))
                    .unwrap_or((1005, String::new())));
            }
        }
    }

    /// Wait until the connection ends without a close handshake
    pub async fn recv_drop(&mut self) -> Result<()> {
        loop {
            match tokio::time::timeout(STEP_TIMEOUT, self.socket.recv()).await {
                Err(_) => bail!("connection still open"),
                Ok(None | Some(Err(_))) => return Ok(()),
                Ok(Some(Ok(Message::Close(frame)))) => bail!("unexpected close frame: {frame:?}"),
                Ok(Some(Ok(_))) => {}
            }
        }
    }

    async fn next_message(&mut self) -> Result<Message> {
        match tokio::time::timeout(STEP_TIMEOUT, self.socket.recv()).await {
            Err(_) => bail!("no message within timeout"),
            Ok(None) => bail!("connection ended"),
            Ok(Some(message)) => Ok(message?),
        }
    }
}
