//! Gateway Integration Tests
//!
//! These tests drive the real websocket transport against a local mock
//! gateway that sends zlib-stream compressed binary frames.
//!
//! Run with: cargo test -p integration-tests --test gateway_tests

use std::sync::Arc;
use std::time::Duration;

use integration_tests::{init_test_tracing, MockGateway, STEP_TIMEOUT};
use serde_json::json;
use shardwire_gateway::{
    ChannelSink, FleetEvent, GatewayError, GatewayEvent, GatewayHandler, GatewayInfo,
    ShardManager, ShardManagerConfig, StaticGatewayInfo, WebSocketConnector,
};
use tokio::sync::mpsc;

// ============================================================================
// Helpers
// ============================================================================

fn fleet_config() -> ShardManagerConfig {
    ShardManagerConfig {
        backoff_base_ms: 10,
        backoff_max_ms: 10,
        ..ShardManagerConfig::new("test-token")
    }
}

fn start_manager(
    gateway: &MockGateway,
) -> (
    Arc<ShardManager>,
    mpsc::UnboundedReceiver<FleetEvent>,
) {
    let (sink, events) = ChannelSink::new();
    let info = StaticGatewayInfo(GatewayInfo {
        url: gateway.url(),
        shards: 1,
    });
    let manager = ShardManager::with_connector(
        fleet_config(),
        WebSocketConnector,
        Arc::new(info),
        Arc::new(sink),
    );
    (Arc::new(manager), events)
}

/// Wait for a dispatch with the given name
async fn next_dispatch(
    events: &mut mpsc::UnboundedReceiver<FleetEvent>,
    name: &str,
) -> serde_json::Value {
    tokio::time::timeout(STEP_TIMEOUT, async {
        loop {
            match events.recv().await {
                Some(FleetEvent::Gateway {
                    event: GatewayEvent::Dispatch { event_name, payload },
                    ..
                }) if event_name == name => return payload,
                Some(_) => {}
                None => panic!("event channel closed"),
            }
        }
    })
    .await
    .expect("dispatch not received")
}

// ============================================================================
// Fleet Tests
// ============================================================================

#[tokio::test]
async fn test_identify_ready_and_dispatch() {
    init_test_tracing();
    let mut gateway = MockGateway::start().await.unwrap();
    let (manager, mut events) = start_manager(&gateway);
    let fleet = tokio::spawn({
        let manager = manager.clone();
        async move { manager.run().await }
    });

    let mut conn = gateway.accept().await.unwrap();
    assert_eq!(conn.query(), "v=6&encoding=json&compress=zlib-stream");

    conn.send(json!({"op": 10, "d": {"heartbeat_interval": 45000, "_trace": ["gw-1"]}}))
        .await
        .unwrap();
    let heartbeat = conn.expect_op(1).await.unwrap();
    assert_eq!(heartbeat["d"], serde_json::Value::Null);

    let identify = conn.expect_op(2).await.unwrap();
    assert_eq!(identify["d"]["token"], "test-token");
    assert_eq!(identify["d"]["shard"], json!([0, 1]));
    assert_eq!(identify["d"]["large_threshold"], 250);

    // Split across frames: the client must buffer until the flush marker.
    conn.send_split(json!({"op": 0, "s": 1, "t": "READY", "d": {"session_id": "sess-1"}}))
        .await
        .unwrap();
    next_dispatch(&mut events, "READY").await;

    conn.send(json!({"op": 0, "s": 2, "t": "MESSAGE_CREATE", "d": {"content": "hello"}}))
        .await
        .unwrap();
    let message = next_dispatch(&mut events, "MESSAGE_CREATE").await;
    assert_eq!(message["content"], "hello");

    // Server-requested heartbeat carries the last sequence.
    conn.send(json!({"op": 1, "d": null})).await.unwrap();
    let heartbeat = conn.expect_op(1).await.unwrap();
    assert_eq!(heartbeat["d"], 2);

    manager.shutdown();
    let (code, reason) = conn.recv_close().await.unwrap();
    assert_eq!(code, 1000);
    assert_eq!(reason, "Client shutting down");

    let result = tokio::time::timeout(STEP_TIMEOUT, fleet).await.unwrap().unwrap();
    assert!(result.is_ok());
}

#[tokio::test]
async fn test_reconnect_request_resumes_session() {
    init_test_tracing();
    let mut gateway = MockGateway::start().await.unwrap();
    let (manager, mut events) = start_manager(&gateway);
    let fleet = tokio::spawn({
        let manager = manager.clone();
        async move { manager.run().await }
    });

    let mut conn = gateway.accept().await.unwrap();
    conn.send(json!({"op": 10, "d": {"heartbeat_interval": 45000}}))
        .await
        .unwrap();
    conn.expect_op(1).await.unwrap();
    conn.expect_op(2).await.unwrap();
    conn.send(json!({"op": 0, "s": 1, "t": "READY", "d": {"session_id": "sess-1"}}))
        .await
        .unwrap();
    conn.send(json!({"op": 0, "s": 5, "t": "GUILD_CREATE", "d": {"id": "1"}}))
        .await
        .unwrap();
    next_dispatch(&mut events, "GUILD_CREATE").await;

    conn.send(json!({"op": 7, "d": null})).await.unwrap();
    let (code, reason) = conn.recv_close().await.unwrap();
    assert_eq!(code, 1000);
    assert_eq!(reason, "Server requested reconnect");
    drop(conn);

    let mut conn = gateway.accept().await.unwrap();
    conn.send(json!({"op": 10, "d": {"heartbeat_interval": 45000}}))
        .await
        .unwrap();
    let heartbeat = conn.expect_op(1).await.unwrap();
    assert_eq!(heartbeat["d"], 5);

    let resume = conn.expect_op(6).await.unwrap();
    assert_eq!(resume["d"]["token"], "test-token");
    assert_eq!(resume["d"]["session_id"], "sess-1");
    assert_eq!(resume["d"]["seq"], 5);

    conn.send(json!({"op": 0, "s": 6, "t": "RESUMED", "d": null}))
        .await
        .unwrap();
    next_dispatch(&mut events, "RESUMED").await;

    manager.shutdown();
    let result = tokio::time::timeout(STEP_TIMEOUT, fleet).await.unwrap().unwrap();
    assert!(result.is_ok());
}

#[tokio::test]
async fn test_invalid_session_identifies_again() {
    init_test_tracing();
    let mut gateway = MockGateway::start().await.unwrap();
    let (manager, _events) = start_manager(&gateway);
    let fleet = tokio::spawn({
        let manager = manager.clone();
        async move { manager.run().await }
    });

    let mut conn = gateway.accept().await.unwrap();
    conn.send(json!({"op": 10, "d": {"heartbeat_interval": 45000}}))
        .await
        .unwrap();
    conn.expect_op(1).await.unwrap();
    conn.expect_op(2).await.unwrap();

    conn.send(json!({"op": 9, "d": false})).await.unwrap();
    let identify = conn.expect_op(2).await.unwrap();
    assert_eq!(identify["d"]["shard"], json!([0, 1]));

    manager.shutdown();
    let result = tokio::time::timeout(STEP_TIMEOUT, fleet).await.unwrap().unwrap();
    assert!(result.is_ok());
}

#[tokio::test]
async fn test_authentication_failure_is_fatal() {
    init_test_tracing();
    let mut gateway = MockGateway::start().await.unwrap();
    let (manager, _events) = start_manager(&gateway);
    let fleet = tokio::spawn({
        let manager = manager.clone();
        async move { manager.run().await }
    });

    let mut conn = gateway.accept().await.unwrap();
    conn.send(json!({"op": 10, "d": {"heartbeat_interval": 45000}}))
        .await
        .unwrap();
    conn.expect_op(1).await.unwrap();
    conn.expect_op(2).await.unwrap();
    conn.close(4004, "Authentication failed").await.unwrap();

    let result = tokio::time::timeout(STEP_TIMEOUT, fleet).await.unwrap().unwrap();
    assert!(matches!(result, Err(GatewayError::InvalidToken)));

    // No reconnect attempt follows.
    assert!(tokio::time::timeout(Duration::from_millis(200), gateway.accept())
        .await
        .map_or(true, |accepted| accepted.is_err()));
}

// ============================================================================
// Handler Tests
// ============================================================================

#[tokio::test]
async fn test_missing_acks_force_close() {
    init_test_tracing();
    let mut gateway = MockGateway::start().await.unwrap();
    let mut handler = GatewayHandler::new(WebSocketConnector, "test-token", &gateway.url(), 0, 1);
    handler.open();

    let server = tokio::spawn(async move {
        let mut conn = gateway.accept().await?;
        conn.send(json!({"op": 10, "d": {"heartbeat_interval": 50}}))
            .await?;
        conn.expect_op(1).await?;
        conn.expect_op(2).await?;
        conn.send(json!({"op": 0, "s": 1, "t": "READY", "d": {"session_id": "sess-1"}}))
            .await?;
        // Never acknowledge; the client must drop the connection.
        conn.recv_drop().await
    });

    let closed = tokio::time::timeout(STEP_TIMEOUT, async {
        loop {
            match handler.next_event().await {
                Ok(Some(GatewayEvent::WebsocketClosed { code, reason })) => return (code, reason),
                Ok(Some(_)) => {}
                other => panic!("unexpected result: {other:?}"),
            }
        }
    })
    .await
    .unwrap();

    assert_eq!(closed, (1006, "Zombied connection".to_string()));
    assert!(handler.session().can_resume());
    // The handler reconnects on its own after a zombie close.
    assert!(matches!(
        handler.next_event().await,
        Ok(Some(GatewayEvent::WebsocketOpened { .. }))
    ));
    server.await.unwrap().unwrap();
}
