#[path = "utils/mock_websocket_server.rs"]
mod mock_websocket_server;
use mock_websocket_server::MockWebSocketServer;

use report_stream_sdk::config::{Config, WebSocketHighAvailability};
use report_stream_sdk::feed::ID;
use report_stream_sdk::stream::Stream;

use std::str::FromStr;
use tokio::time::{sleep, Duration};

const FEED_F: &str = "0x0003000000000000000000000000000000000000000000000000000000000000";

fn envelope(feed_id: &str, timestamp: u64) -> Vec<u8> {
    format!(
        r#"{{"report":{{"feedID":"{}","validFromTimestamp":{},"observationsTimestamp":{},"fullReport":"0xdead"}}}}"#,
        feed_id, timestamp, timestamp
    )
    .into_bytes()
}

async fn build_stream(
    server_addresses: &[String],
    max_reconnect: u32,
) -> Stream {
    let ws_url = server_addresses
        .iter()
        .map(|addr| format!("ws://{addr}"))
        .collect::<Vec<_>>()
        .join(",");

    let ws_ha = if server_addresses.len() > 1 {
        WebSocketHighAvailability::Enabled
    } else {
        WebSocketHighAvailability::Disabled
    };

    let config = Config::new(
        "mock_key".to_string(),
        "mock_secret".to_string(),
        "http://mock-rest".to_string(),
        ws_url,
    )
    .with_ws_ha(ws_ha)
    .with_ws_max_reconnect(max_reconnect)
    .with_reconnect_base_delay(Duration::from_millis(50))
    .build()
    .expect("valid config");

    let feed_id = ID::from_str(FEED_F).unwrap();
    let stream = Stream::new(config, vec![feed_id]).await.expect("initial dial should succeed");
    stream.listen().await.expect("listen should start monitor tasks");
    stream
}

#[tokio::test]
async fn single_connection_happy_path() {
    let server = MockWebSocketServer::new("127.0.0.1:0").await;
    let mut stream = build_stream(&[server.address().to_string()], 5).await;

    sleep(Duration::from_millis(200)).await;
    server.send_binary(envelope(FEED_F, 1000)).await;
    sleep(Duration::from_millis(200)).await;

    let report = stream.read().await.expect("should receive the envelope");
    assert_eq!(report.report.observations_timestamp, 1000);

    let stats = stream.get_stats().await;
    assert_eq!(stats.accepted, 1);
    assert_eq!(stats.deduplicated, 0);
    assert_eq!(stats.total_received, 1);

    assert!(stream.close().await.is_ok(), "no terminal cause pending");
}

#[tokio::test]
async fn ha_deduplication_across_origins() {
    let addresses = {
        let mut v = Vec::new();
        for _ in 0..3 {
            v.push(MockWebSocketServer::new("127.0.0.1:0").await);
        }
        v
    };
    let urls: Vec<String> = addresses.iter().map(|s| s.address().to_string()).collect();

    let mut stream = build_stream(&urls, 5).await;
    sleep(Duration::from_millis(200)).await;

    let stats = stream.get_stats().await;
    assert_eq!(stats.configured_connections, 3);
    assert_eq!(stats.active_connections, 3);

    for server in &addresses {
        server.send_binary(envelope(FEED_F, 1000)).await;
    }
    sleep(Duration::from_millis(300)).await;

    let report = stream.read().await.expect("should receive exactly one copy");
    assert_eq!(report.report.observations_timestamp, 1000);

    let stats = stream.get_stats().await;
    assert_eq!(stats.accepted, 1);
    assert_eq!(stats.deduplicated, 2);
    assert_eq!(stats.total_received, 3);

    assert!(stream.close().await.is_ok(), "no terminal cause pending");
}

#[tokio::test]
async fn ha_deduplication_survives_reconnect() {
    let addresses = {
        let mut v = Vec::new();
        for _ in 0..2 {
            v.push(MockWebSocketServer::new("127.0.0.1:0").await);
        }
        v
    };
    let urls: Vec<String> = addresses.iter().map(|s| s.address().to_string()).collect();

    let mut stream = build_stream(&urls, 10).await;
    sleep(Duration::from_millis(200)).await;

    for server in &addresses {
        server.send_binary(envelope(FEED_F, 1000)).await;
    }
    sleep(Duration::from_millis(300)).await;
    let _ = stream.read().await.expect("first delivery");

    for server in &addresses {
        server.drop_connections().await;
    }
    sleep(Duration::from_millis(500)).await;

    for server in &addresses {
        server.send_binary(envelope(FEED_F, 1000)).await;
    }
    sleep(Duration::from_millis(300)).await;

    let stats = stream.get_stats().await;
    assert_eq!(stats.accepted, 1, "the repeated timestamp must not be re-delivered");
    assert_eq!(stats.deduplicated, 3);

    assert!(stream.close().await.is_ok(), "no terminal cause pending");
}

#[tokio::test]
async fn partial_failure_keeps_delivering() {
    let addresses = {
        let mut v = Vec::new();
        for _ in 0..4 {
            v.push(MockWebSocketServer::new("127.0.0.1:0").await);
        }
        v
    };
    let urls: Vec<String> = addresses.iter().map(|s| s.address().to_string()).collect();

    let mut stream = build_stream(&urls, 10).await;
    sleep(Duration::from_millis(200)).await;

    addresses[0].drop_connections().await;
    addresses[1].drop_connections().await;
    sleep(Duration::from_millis(300)).await;

    let stats = stream.get_stats().await;
    assert_eq!(stats.active_connections, 2);
    assert_eq!(stats.partial_reconnects, 2);
    assert_eq!(stats.full_reconnects, 0);

    addresses[2].send_binary(envelope(FEED_F, 1001)).await;
    sleep(Duration::from_millis(200)).await;

    let report = stream.read().await.expect("surviving origins still deliver");
    assert_eq!(report.report.observations_timestamp, 1001);

    assert!(stream.close().await.is_ok(), "no terminal cause pending");
}

#[tokio::test]
async fn terminal_failure_then_closed() {
    let server = MockWebSocketServer::new("127.0.0.1:0").await;
    let mut stream = build_stream(&[server.address().to_string()], 2).await;

    server.shutdown().await;

    // Config uses a 50ms reconnect_base_delay; two backoff cycles plus
    // slack is enough to exhaust max_reconnect=2 and observe the terminal
    // cause.
    sleep(Duration::from_millis(600)).await;

    let first = stream.read().await;
    assert!(first.is_err(), "exhausted retries must surface a terminal cause");

    let second = stream.read().await;
    assert!(matches!(second, Err(report_stream_sdk::stream::StreamError::Closed)));

    assert!(stream.close().await.is_ok(), "already-observed cause is not re-surfaced");
}

#[tokio::test]
async fn close_surfaces_an_unobserved_terminal_cause() {
    let server = MockWebSocketServer::new("127.0.0.1:0").await;
    let stream = build_stream(&[server.address().to_string()], 2).await;

    server.shutdown().await;
    sleep(Duration::from_millis(600)).await;

    let cause = stream.close().await;
    assert!(cause.is_err(), "close() must surface a pending terminal cause");
}

#[tokio::test]
async fn cancelled_read_does_not_lose_counters_or_usability() {
    let server = MockWebSocketServer::new("127.0.0.1:0").await;
    let mut stream = build_stream(&[server.address().to_string()], 5).await;
    sleep(Duration::from_millis(200)).await;

    tokio::select! {
        _ = stream.read() => panic!("no envelope should have arrived yet"),
        _ = sleep(Duration::from_millis(50)) => {}
    }

    let stats = stream.get_stats().await;
    assert_eq!(stats.accepted, 0);
    assert_eq!(stats.deduplicated, 0);

    server.send_binary(envelope(FEED_F, 2000)).await;
    sleep(Duration::from_millis(200)).await;

    let report = stream.read().await.expect("a fresh read still works after a cancelled one");
    assert_eq!(report.report.observations_timestamp, 2000);

    assert!(stream.close().await.is_ok(), "no terminal cause pending");
}

#[tokio::test]
async fn graceful_shutdown_is_idempotent() {
    let addresses = {
        let mut v = Vec::new();
        for _ in 0..3 {
            v.push(MockWebSocketServer::new("127.0.0.1:0").await);
        }
        v
    };
    let urls: Vec<String> = addresses.iter().map(|s| s.address().to_string()).collect();
    let stream = build_stream(&urls, 5).await;
    sleep(Duration::from_millis(200)).await;

    assert!(stream.close().await.is_ok(), "no terminal cause pending");
    let stats = stream.get_stats().await;
    assert_eq!(stats.configured_connections, 3);
    assert_eq!(stats.active_connections, 0);

    assert!(stream.close().await.is_ok(), "second close is a no-op, not an error");
    let stats = stream.get_stats().await;
    assert_eq!(stats.active_connections, 0);
}

#[tokio::test]
async fn full_reconnect_counted_when_every_connection_drops() {
    let addresses = {
        let mut v = Vec::new();
        for _ in 0..5 {
            v.push(MockWebSocketServer::new("127.0.0.1:0").await);
        }
        v
    };
    let urls: Vec<String> = addresses.iter().map(|s| s.address().to_string()).collect();

    let stream = build_stream(&urls, 10).await;
    sleep(Duration::from_millis(200)).await;

    for server in &addresses {
        server.drop_connections().await;
    }
    sleep(Duration::from_millis(400)).await;

    let stats = stream.get_stats().await;
    assert_eq!(stats.full_reconnects, 1);
    assert_eq!(stats.partial_reconnects, 4);

    assert!(stream.close().await.is_ok(), "no terminal cause pending");
}
