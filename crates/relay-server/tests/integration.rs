//! End-to-end tests over real WebSocket connections.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use relay_server::{ServerConfig, ServerHandle};
use relay_telemetry::MetricsRecorder;
use serde_json::{json, Value};
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

const TIMEOUT: Duration = Duration::from_secs(5);

type WsStream = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

fn public_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../public")
}

fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".into(),
        port: 0,
        public_dir: public_dir(),
        ..Default::default()
    }
}

async fn boot_server_with(config: ServerConfig) -> ServerHandle {
    relay_server::start(config, Arc::new(MetricsRecorder::new()))
        .await
        .unwrap()
}

async fn boot_server() -> ServerHandle {
    boot_server_with(test_config()).await
}

async fn connect(handle: &ServerHandle) -> WsStream {
    let url = format!("ws://127.0.0.1:{}/ws", handle.port());
    let (ws, _) = timeout(TIMEOUT, connect_async(url)).await.unwrap().unwrap();
    ws
}

async fn send(ws: &mut WsStream, frame: Value) {
    ws.send(Message::Text(frame.to_string().into())).await.unwrap();
}

/// Next text frame, skipping control frames.
async fn next_frame(ws: &mut WsStream) -> Value {
    loop {
        let msg = timeout(TIMEOUT, ws.next())
            .await
            .expect("timed out waiting for frame")
            .expect("stream ended")
            .unwrap();
        if let Message::Text(text) = msg {
            return serde_json::from_str(text.as_str()).unwrap();
        }
    }
}

async fn expect_event(ws: &mut WsStream, event: &str) -> Value {
    let frame = next_frame(ws).await;
    assert_eq!(frame["event"], event, "unexpected frame: {frame}");
    frame["data"].clone()
}

/// Join and wait for the roster that confirms it.
async fn join(ws: &mut WsStream, name: &str) -> Value {
    send(ws, json!({"event": "join", "data": name})).await;
    expect_event(ws, "user list").await
}

#[tokio::test]
async fn presence_flow_for_three_clients() {
    let handle = boot_server().await;

    let mut a = connect(&handle).await;
    assert_eq!(join(&mut a, "A").await, json!(["A"]));

    let mut b = connect(&handle).await;
    assert_eq!(join(&mut b, "B").await, json!(["A", "B"]));
    assert_eq!(expect_event(&mut a, "user joined").await, "B");
    assert_eq!(expect_event(&mut a, "user list").await, json!(["A", "B"]));

    let mut c = connect(&handle).await;
    assert_eq!(join(&mut c, "C").await, json!(["A", "B", "C"]));
    for ws in [&mut a, &mut b] {
        assert_eq!(expect_event(ws, "user joined").await, "C");
        assert_eq!(expect_event(ws, "user list").await, json!(["A", "B", "C"]));
    }

    c.close(None).await.unwrap();

    for ws in [&mut a, &mut b] {
        assert_eq!(expect_event(ws, "user left").await, "C");
        assert_eq!(expect_event(ws, "user list").await, json!(["A", "B"]));
    }

    handle.shutdown().await;
}

#[tokio::test]
async fn silent_client_is_swept_and_announced_as_left() {
    let handle = boot_server_with(ServerConfig {
        heartbeat_interval_secs: 1,
        client_timeout_secs: 2,
        cleanup_interval_secs: 1,
        ..test_config()
    })
    .await;

    let mut alive = connect(&handle).await;
    join(&mut alive, "Alive").await;

    // Never polled after joining, so its pongs are never sent.
    let mut silent = connect(&handle).await;
    join(&mut silent, "Silent").await;
    assert_eq!(expect_event(&mut alive, "user joined").await, "Silent");
    assert_eq!(
        expect_event(&mut alive, "user list").await,
        json!(["Alive", "Silent"])
    );

    // Reading keeps answering pings for the live client until the sweep fires.
    let left = timeout(Duration::from_secs(10), expect_event(&mut alive, "user left"))
        .await
        .expect("silent client was never swept");
    assert_eq!(left, "Silent");
    assert_eq!(expect_event(&mut alive, "user list").await, json!(["Alive"]));

    drop(silent);
    handle.shutdown().await;
}

#[tokio::test]
async fn chat_message_is_echoed_to_everyone() {
    let handle = boot_server().await;

    let mut alice = connect(&handle).await;
    join(&mut alice, "Alice").await;
    let mut bob = connect(&handle).await;
    join(&mut bob, "Bob").await;
    expect_event(&mut alice, "user joined").await;
    expect_event(&mut alice, "user list").await;

    send(&mut alice, json!({"event": "chat message", "data": {"message": "hello"}})).await;

    for ws in [&mut alice, &mut bob] {
        let msg = expect_event(ws, "chat message").await;
        assert_eq!(msg["username"], "Alice");
        assert_eq!(msg["message"], "hello");
        assert!(!msg["timestamp"].as_str().unwrap().is_empty());
    }

    handle.shutdown().await;
}

#[tokio::test]
async fn chat_before_join_has_empty_sender() {
    let handle = boot_server().await;

    let mut anon = connect(&handle).await;
    send(&mut anon, json!({"event": "chat message", "data": {"message": "early"}})).await;

    let msg = expect_event(&mut anon, "chat message").await;
    assert_eq!(msg["username"], "");
    assert_eq!(msg["message"], "early");

    handle.shutdown().await;
}

#[tokio::test]
async fn typing_reaches_peers_only() {
    let handle = boot_server().await;

    let mut carol = connect(&handle).await;
    join(&mut carol, "Carol").await;
    let mut dave = connect(&handle).await;
    join(&mut dave, "Dave").await;
    expect_event(&mut carol, "user joined").await;
    expect_event(&mut carol, "user list").await;

    send(&mut carol, json!({"event": "typing", "data": "Carol"})).await;
    assert_eq!(expect_event(&mut dave, "typing").await, "Carol");

    send(&mut carol, json!({"event": "stop typing"})).await;
    let frame = next_frame(&mut dave).await;
    assert_eq!(frame, json!({"event": "stop typing"}));

    // Carol's next frame is her own chat echo, so no typing frames reached her.
    send(&mut carol, json!({"event": "chat message", "data": {"message": "done"}})).await;
    let msg = expect_event(&mut carol, "chat message").await;
    assert_eq!(msg["message"], "done");

    handle.shutdown().await;
}

#[tokio::test]
async fn malformed_frames_do_not_break_the_connection() {
    let handle = boot_server().await;

    let mut ws = connect(&handle).await;
    ws.send(Message::Text("not json".into())).await.unwrap();
    send(&mut ws, json!({"event": "disconnect"})).await;
    send(&mut ws, json!({"event": "join", "data": 12})).await;

    assert_eq!(join(&mut ws, "Eve").await, json!(["Eve"]));

    handle.shutdown().await;
}

#[tokio::test]
async fn health_reports_roster_and_metrics() {
    let handle = boot_server().await;

    let mut ws = connect(&handle).await;
    join(&mut ws, "Frank").await;

    let url = format!("http://127.0.0.1:{}/health", handle.port());
    let body: Value = reqwest::get(&url).await.unwrap().json().await.unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["connections"], 1);
    assert_eq!(body["users"], json!(["Frank"]));

    let values = body["metrics"]["values"].as_array().unwrap();
    let joins = values
        .iter()
        .find(|v| v["name"] == "events_received" && v["labels"]["event"] == "join")
        .unwrap();
    assert_eq!(joins["value"], 1.0);

    handle.shutdown().await;
}

#[tokio::test]
async fn serves_the_browser_client() {
    let handle = boot_server().await;

    let root = format!("http://127.0.0.1:{}/", handle.port());
    let resp = reqwest::get(&root).await.unwrap();
    assert_eq!(resp.status(), 200);
    assert!(resp.text().await.unwrap().contains("script.js"));

    let script = format!("http://127.0.0.1:{}/script.js", handle.port());
    let resp = reqwest::get(&script).await.unwrap();
    assert_eq!(resp.status(), 200);
    assert!(resp.text().await.unwrap().contains("WebSocket"));

    handle.shutdown().await;
}
