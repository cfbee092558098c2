//! Test utilities for cuenta-core
//!
//! This module provides a mock chat-completions server that speaks the subset
//! of the OpenAI API the statement parser uses, for integration tests and
//! local development without an API key.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::{
    extract::{Json, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde_json::{json, Value};
use tokio::sync::oneshot;

/// A request received by the mock server
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    /// `Authorization` header, if sent
    pub authorization: Option<String>,
    /// JSON body as received
    pub body: Value,
}

#[derive(Debug, Clone)]
enum Reply {
    /// 200 with this string as the assistant message
    Content(String),
    /// Bare error status
    Status(u16),
}

struct ServerState {
    reply: Reply,
    requests: Mutex<Vec<RecordedRequest>>,
}

/// Mock chat-completions server for testing and development
pub struct MockChatServer {
    addr: SocketAddr,
    state: Arc<ServerState>,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl MockChatServer {
    /// Start a server whose assistant message is always `content`
    pub async fn start(content: &str) -> Self {
        Self::spawn(Reply::Content(content.to_string())).await
    }

    /// Start a server that answers every completion with an HTTP error
    pub async fn start_failing(status: u16) -> Self {
        Self::spawn(Reply::Status(status)).await
    }

    async fn spawn(reply: Reply) -> Self {
        let state = Arc::new(ServerState {
            reply,
            requests: Mutex::new(Vec::new()),
        });

        let app = Router::new()
            .route("/v1/models", get(handle_models))
            .route("/v1/chat/completions", post(handle_chat))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    shutdown_rx.await.ok();
                })
                .await
                .unwrap();
        });

        Self {
            addr,
            state,
            shutdown_tx: Some(shutdown_tx),
        }
    }

    /// Get the base URL for this mock server
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Completion requests received so far
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.requests.lock().unwrap().clone()
    }

    /// Stop the mock server
    pub fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for MockChatServer {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Models endpoint (health check)
async fn handle_models() -> Json<Value> {
    Json(json!({
        "object": "list",
        "data": [{"id": "mock-model", "object": "model"}]
    }))
}

/// Chat completions endpoint
async fn handle_chat(
    State(state): State<Arc<ServerState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let authorization = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(String::from);

    state.requests.lock().unwrap().push(RecordedRequest {
        authorization,
        body: body.clone(),
    });

    match &state.reply {
        Reply::Content(content) => Json(json!({
            "id": "chatcmpl-mock",
            "object": "chat.completion",
            "model": body["model"],
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": content},
                "finish_reason": "stop"
            }]
        }))
        .into_response(),
        Reply::Status(code) => {
            let status =
                StatusCode::from_u16(*code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            (status, "mock failure").into_response()
        }
    }
}
