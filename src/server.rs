//! Websocket front end. One connection is one conversation: its own
//! [`Agent`], history and tool collection (and so its own bash session).
//!
//! - Client → Server: `{"message": "..."}`
//! - Server → Client: `{"type": "message" | "tool_output" | "error", "content": ...}`

use crate::agent::Agent;
use crate::agent_loop::LoopOutcome;
use crate::config::ConfigError;
use crate::context::ImageRetention;
use crate::provider::ModelClient;
use crate::tools::ToolCollection;
use crate::types::*;
use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

/// Builds a fresh tool collection for each connection.
pub type ToolFactory = Arc<dyn Fn() -> Result<ToolCollection, ConfigError> + Send + Sync>;

/// Per-conversation settings shared by all connections.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub system_prompt: String,
    pub model: String,
    pub max_tokens: u32,
    pub image_retention: Option<ImageRetention>,
}

#[derive(Clone)]
pub struct AppState {
    pub client: Arc<dyn ModelClient>,
    pub session: Arc<SessionConfig>,
    pub tools: ToolFactory,
}

impl AppState {
    /// State serving the desktop tool set from [`ToolCollection::computer_use`].
    pub fn new(client: Arc<dyn ModelClient>, session: SessionConfig) -> Self {
        Self {
            client,
            session: Arc::new(session),
            tools: Arc::new(ToolCollection::computer_use),
        }
    }

    pub fn with_tools(
        mut self,
        factory: impl Fn() -> Result<ToolCollection, ConfigError> + Send + Sync + 'static,
    ) -> Self {
        self.tools = Arc::new(factory);
        self
    }
}

// ── Wire frames ──────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ClientFrame {
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolOutputFrame {
    pub output: Option<String>,
    pub error: Option<String>,
    pub base64_image: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "content", rename_all = "snake_case")]
pub enum ServerFrame {
    Message(ContentBlock),
    ToolOutput(ToolOutputFrame),
    Error(String),
}

impl ServerFrame {
    /// Frame for a loop event. Successful request diagnostics are only logged.
    pub fn from_event(event: LoopEvent) -> Option<Self> {
        match event {
            LoopEvent::Output { block } => Some(Self::Message(block)),
            LoopEvent::ToolOutput { result, .. } => Some(Self::ToolOutput(ToolOutputFrame {
                output: result.output,
                error: result.error,
                base64_image: result.base64_image,
            })),
            LoopEvent::ApiResponse { error: Some(e), .. } => Some(Self::Error(e)),
            LoopEvent::ApiResponse { status, error: None } => {
                debug!(?status, "model request succeeded");
                None
            }
        }
    }

    /// Text frame for the socket, or `None` if the frame cannot be encoded.
    fn to_ws(&self) -> Option<WsMessage> {
        match serde_json::to_string(self) {
            Ok(json) => Some(WsMessage::Text(json.into())),
            Err(e) => {
                error!(error = %e, "cannot encode server frame, skipping");
                None
            }
        }
    }
}

// ── Routes ───────────────────────────────────────────────────────────────

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health_handler))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind `addr` and serve until the process exits.
pub async fn serve(addr: &str, state: AppState) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %addr, "computer use server listening");
    axum::serve(listener, router(state)).await
}

async fn health_handler() -> &'static str {
    "ok"
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws_connection(socket, state))
}

async fn handle_ws_connection(socket: WebSocket, state: AppState) {
    let conn_id = uuid::Uuid::new_v4().simple().to_string();
    info!(conn = %conn_id, "websocket connection established");

    let (mut sink, mut stream) = socket.split();
    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<LoopEvent>();
    let (frame_tx, mut frame_rx) = mpsc::unbounded_channel::<ServerFrame>();
    let cancel = CancellationToken::new();

    // Writer: loop events and adapter frames → socket
    let writer_cancel = cancel.clone();
    let writer = tokio::spawn(async move {
        loop {
            let frame = tokio::select! {
                Some(event) = event_rx.recv() => match ServerFrame::from_event(event) {
                    Some(frame) => frame,
                    None => continue,
                },
                Some(frame) = frame_rx.recv() => frame,
                else => break,
            };
            let Some(message) = frame.to_ws() else {
                continue;
            };
            if sink.send(message).await.is_err() {
                // Client gone: stop the conversation at its next suspension point
                writer_cancel.cancel();
                break;
            }
        }
    });

    let tools = match (state.tools)() {
        Ok(tools) => tools,
        Err(e) => {
            error!(conn = %conn_id, error = %e, "cannot build tool collection");
            frame_tx.send(ServerFrame::Error(e.to_string())).ok();
            drop(frame_tx);
            drop(event_tx);
            writer.await.ok();
            return;
        }
    };

    let mut agent = Agent::new(state.client.clone())
        .with_system_prompt(state.session.system_prompt.clone())
        .with_model(state.session.model.clone())
        .with_max_tokens(state.session.max_tokens)
        .with_tools(tools);
    if let Some(retention) = state.session.image_retention {
        agent = agent.with_image_retention(retention);
    }

    while let Some(msg) = stream.next().await {
        let text = match msg {
            Ok(WsMessage::Text(text)) => text,
            Ok(WsMessage::Close(_)) => break,
            Ok(_) => continue, // ignore binary, ping, pong
            Err(_) => break,
        };

        let frame: ClientFrame = match serde_json::from_str(text.as_str()) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(conn = %conn_id, error = %e, "malformed client frame");
                frame_tx
                    .send(ServerFrame::Error(format!("Invalid message: {}", e)))
                    .ok();
                continue;
            }
        };

        debug!(conn = %conn_id, "user message received");
        match agent.prompt(frame.message, event_tx.clone(), cancel.clone()).await {
            LoopOutcome::Completed => {}
            LoopOutcome::ApiError(e) => {
                warn!(conn = %conn_id, error = %e, "conversation turn ended with an API error");
            }
            LoopOutcome::Cancelled => break,
        }
    }

    cancel.cancel();
    drop(event_tx);
    drop(frame_tx);
    writer.await.ok();
    info!(conn = %conn_id, messages = agent.messages().len(), "websocket connection closed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn message_frame_wraps_block() {
        let frame = ServerFrame::from_event(LoopEvent::Output {
            block: ContentBlock::text("hello"),
        })
        .unwrap();
        assert_eq!(
            serde_json::to_value(&frame).unwrap(),
            json!({"type": "message", "content": {"type": "text", "text": "hello"}})
        );
    }

    #[test]
    fn tool_output_frame_carries_all_fields() {
        let frame = ServerFrame::from_event(LoopEvent::ToolOutput {
            tool_use_id: "tu_1".into(),
            result: ToolResult::output("a.txt").with_image("aW1n"),
        })
        .unwrap();
        assert_eq!(
            serde_json::to_value(&frame).unwrap(),
            json!({
                "type": "tool_output",
                "content": {"output": "a.txt", "error": null, "base64_image": "aW1n"}
            })
        );
    }

    #[test]
    fn api_errors_become_error_frames() {
        let frame = ServerFrame::from_event(LoopEvent::ApiResponse {
            status: Some(500),
            error: Some("overloaded".into()),
        });
        assert_eq!(frame, Some(ServerFrame::Error("overloaded".into())));

        let ok = ServerFrame::from_event(LoopEvent::ApiResponse {
            status: Some(200),
            error: None,
        });
        assert!(ok.is_none());
    }

    #[test]
    fn frames_encode_as_text_messages() {
        let Some(WsMessage::Text(text)) = ServerFrame::Error("boom".into()).to_ws() else {
            panic!("expected a text frame");
        };
        assert_eq!(text.as_str(), r#"{"type":"error","content":"boom"}"#);
    }

    #[test]
    fn client_frame_requires_message() {
        assert!(serde_json::from_str::<ClientFrame>(r#"{"message": "hi"}"#).is_ok());
        assert!(serde_json::from_str::<ClientFrame>(r#"{"text": "hi"}"#).is_err());
    }
}
