//! Test utilities for billwise-core
//!
//! A mock OpenAI-compatible chat-completions server for exercising the HTTP
//! adapter end to end, including slow and failing endpoints.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    extract::{Json, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Router,
};
use serde_json::{json, Value};
use tokio::sync::oneshot;

use crate::ai::keyword_category;

/// A request as received by the mock server
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub authorization: Option<String>,
    pub body: Value,
}

impl RecordedRequest {
    /// Content of the last user message
    pub fn user_message(&self) -> String {
        self.body["messages"]
            .as_array()
            .and_then(|messages| messages.iter().rev().find(|m| m["role"] == "user"))
            .and_then(|m| m["content"].as_str())
            .unwrap_or_default()
            .to_string()
    }
}

#[derive(Default)]
struct ServerState {
    delay: Option<Duration>,
    fail_status: Option<u16>,
    narrative: Option<String>,
    requests: Mutex<Vec<RecordedRequest>>,
}

/// Mock chat-completions server for testing
pub struct MockChatServer {
    addr: SocketAddr,
    shutdown_tx: Option<oneshot::Sender<()>>,
    state: Arc<ServerState>,
}

impl MockChatServer {
    /// Start a well-behaved server on an available port
    pub async fn start() -> Self {
        Self::spawn(ServerState::default()).await
    }

    /// Every response is delayed (timeout tests)
    pub async fn start_slow(delay: Duration) -> Self {
        Self::spawn(ServerState {
            delay: Some(delay),
            ..Default::default()
        })
        .await
    }

    /// Every request fails with `status`
    pub async fn start_failing(status: u16) -> Self {
        Self::spawn(ServerState {
            fail_status: Some(status),
            ..Default::default()
        })
        .await
    }

    /// Reasoning replies carry this narrative after a hidden think block
    pub async fn start_with_narrative(narrative: &str) -> Self {
        Self::spawn(ServerState {
            narrative: Some(narrative.to_string()),
            ..Default::default()
        })
        .await
    }

    async fn spawn(state: ServerState) -> Self {
        let state = Arc::new(state);
        let app = Router::new()
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
            shutdown_tx: Some(shutdown_tx),
            state,
        }
    }

    /// Get the base URL for this mock server
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Requests received so far
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

async fn handle_chat(
    State(state): State<Arc<ServerState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let recorded = RecordedRequest {
        authorization: headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
        body,
    };
    let prompt = recorded.user_message();
    let model = recorded.body["model"].as_str().unwrap_or("mock").to_string();
    state.requests.lock().unwrap().push(recorded);

    if let Some(delay) = state.delay {
        tokio::time::sleep(delay).await;
    }

    if let Some(status) = state.fail_status {
        let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        return (status, "mock failure").into_response();
    }

    // Prompt shapes follow prompts/*.md
    let content = if prompt.contains("Expense Data:") {
        let narrative = state
            .narrative
            .clone()
            .unwrap_or_else(|| "## 支出模式分析\n本期支出集中在少数类别。".to_string());
        format!("<think>\nLet me look at the numbers.\n</think>\n\n{}", narrative)
    } else {
        let item = prompt
            .lines()
            .find_map(|l| l.strip_prefix("Item: "))
            .unwrap_or_default();
        json!({
            "category": keyword_category(item),
            "rationale": "mock server keyword match"
        })
        .to_string()
    };

    Json(json!({
        "id": "chatcmpl-mock",
        "object": "chat.completion",
        "model": model,
        "choices": [{
            "index": 0,
            "message": { "role": "assistant", "content": content },
            "finish_reason": "stop"
        }]
    }))
    .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_server_classifies_by_item_line() {
        let server = MockChatServer::start().await;
        let client = reqwest::Client::new();

        let response: Value = client
            .post(format!("{}/v1/chat/completions", server.url()))
            .json(&json!({
                "model": "m",
                "messages": [{"role": "user", "content": "Item: 東京ガス\nCategories: ..."}]
            }))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();

        let content = response["choices"][0]["message"]["content"].as_str().unwrap();
        assert!(content.contains("Utilities/公用事业"));
        assert_eq!(server.requests().len(), 1);
    }
}
