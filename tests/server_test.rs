//! Websocket server tests: HTTP surface plus full conversations over a socket.

use computer_use::config::ConfigError;
use computer_use::provider::mock::*;
use computer_use::provider::ProviderError;
use computer_use::server::{router, AppState, SessionConfig};
use computer_use::tools::ToolCollection;
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

fn session() -> SessionConfig {
    SessionConfig {
        system_prompt: "You are helpful.".into(),
        model: "mock".into(),
        max_tokens: 128,
        image_retention: None,
    }
}

async fn spawn(state: AppState) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router(state)).await.unwrap();
    });
    addr.to_string()
}

async fn spawn_server(client: MockClient) -> String {
    let state = AppState::new(Arc::new(client), session())
        .with_tools(|| Ok(ToolCollection::new(Vec::new())));
    spawn(state).await
}

async fn connect(addr: &str) -> Socket {
    let (socket, _) = connect_async(format!("ws://{}/ws", addr)).await.unwrap();
    socket
}

async fn send(socket: &mut Socket, text: &str) {
    socket.send(WsMessage::Text(text.into())).await.unwrap();
}

/// Next JSON frame from the server, skipping control messages.
async fn next_frame(socket: &mut Socket) -> Value {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(5), socket.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("socket closed")
            .unwrap();
        if let WsMessage::Text(text) = msg {
            return serde_json::from_str(text.as_str()).unwrap();
        }
    }
}

#[tokio::test]
async fn test_health_returns_ok() {
    let addr = spawn_server(MockClient::text("hello")).await;
    let response = reqwest::get(format!("http://{}/health", addr)).await.unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.text().await.unwrap(), "ok");
}

#[tokio::test]
async fn test_cors_allows_any_origin() {
    let addr = spawn_server(MockClient::text("hello")).await;
    let response = reqwest::Client::new()
        .get(format!("http://{}/health", addr))
        .header("origin", "http://example.com")
        .send()
        .await
        .unwrap();
    assert_eq!(
        response
            .headers()
            .get("access-control-allow-origin")
            .and_then(|v| v.to_str().ok()),
        Some("*")
    );
}

#[tokio::test]
async fn test_ws_route_requires_upgrade() {
    let addr = spawn_server(MockClient::text("hello")).await;
    let response = reqwest::get(format!("http://{}/ws", addr)).await.unwrap();
    assert!(response.status().is_client_error());
}

#[tokio::test]
async fn test_conversation_streams_blocks_and_tool_output() {
    let client = MockClient::new(vec![
        MockResponse::ToolCalls(vec![MockToolCall::new("nope", json!({}))]),
        MockResponse::Text("done".into()),
    ]);
    let addr = spawn_server(client).await;
    let mut socket = connect(&addr).await;

    send(&mut socket, r#"{"message": "hi"}"#).await;

    let first = next_frame(&mut socket).await;
    assert_eq!(first["type"], "message");
    assert_eq!(first["content"]["type"], "tool_use");
    assert_eq!(first["content"]["name"], "nope");

    let second = next_frame(&mut socket).await;
    assert_eq!(
        second,
        json!({
            "type": "tool_output",
            "content": {"output": null, "error": "Tool nope is invalid", "base64_image": null}
        })
    );

    let third = next_frame(&mut socket).await;
    assert_eq!(
        third,
        json!({"type": "message", "content": {"type": "text", "text": "done"}})
    );
}

#[tokio::test]
async fn test_connection_survives_bad_frames_and_api_errors() {
    let client = MockClient::new(vec![
        MockResponse::Error(ProviderError::Other("boom".into())),
        MockResponse::Text("again".into()),
    ]);
    let addr = spawn_server(client).await;
    let mut socket = connect(&addr).await;

    send(&mut socket, "garbage").await;
    let frame = next_frame(&mut socket).await;
    assert_eq!(frame["type"], "error");
    assert!(frame["content"]
        .as_str()
        .unwrap()
        .starts_with("Invalid message:"));

    send(&mut socket, r#"{"message": "x"}"#).await;
    assert_eq!(
        next_frame(&mut socket).await,
        json!({"type": "error", "content": "boom"})
    );

    send(&mut socket, r#"{"message": "y"}"#).await;
    assert_eq!(
        next_frame(&mut socket).await,
        json!({"type": "message", "content": {"type": "text", "text": "again"}})
    );
}

#[tokio::test]
async fn test_connections_keep_separate_histories() {
    let client = Arc::new(MockClient::new(vec![
        MockResponse::Text("one".into()),
        MockResponse::Text("two".into()),
    ]));
    let state = AppState::new(client.clone(), session())
        .with_tools(|| Ok(ToolCollection::new(Vec::new())));
    let addr = spawn(state).await;

    let mut a = connect(&addr).await;
    send(&mut a, r#"{"message": "from a"}"#).await;
    next_frame(&mut a).await;

    let mut b = connect(&addr).await;
    send(&mut b, r#"{"message": "from b"}"#).await;
    next_frame(&mut b).await;

    let requests = client.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[1].messages.len(), 1);
    assert_eq!(requests[1].messages[0].text(), "from b");
}

#[tokio::test]
async fn test_tool_setup_failure_is_reported() {
    let state = AppState::new(Arc::new(MockClient::text("unused")), session())
        .with_tools(|| Err(ConfigError::Invalid("WIDTH must be a number".into())));
    let addr = spawn(state).await;
    let mut socket = connect(&addr).await;

    let frame = next_frame(&mut socket).await;
    assert_eq!(frame["type"], "error");
    assert!(frame["content"]
        .as_str()
        .unwrap()
        .contains("WIDTH must be a number"));
}
