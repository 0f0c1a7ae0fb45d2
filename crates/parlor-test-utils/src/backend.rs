//! In-process HTTP backend for exercising the real client.

use axum::Router;
use axum::body::Bytes;
use axum::extract::{Multipart, State};
use axum::http::{HeaderMap, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Json;
use parking_lot::Mutex;
use parlor_protocol::SESSION_HEADER;
use serde_json::{Value, json};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Canned response for one endpoint.
#[derive(Debug, Clone)]
pub struct FakeReply {
    pub status: u16,
    pub body: Value,
    pub delay: Option<Duration>,
}

impl FakeReply {
    pub fn ok(body: Value) -> Self {
        Self {
            status: 200,
            body,
            delay: None,
        }
    }

    pub fn status(status: u16, body: Value) -> Self {
        Self {
            status,
            body,
            delay: None,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

/// Request observed by [`FakeBackend`].
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub session_id: Option<String>,
    pub body: Value,
    pub field_name: Option<String>,
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub bytes: usize,
}

impl RecordedRequest {
    fn new(method: Method, path: &str, headers: &HeaderMap) -> Self {
        Self {
            method: method.to_string(),
            path: path.to_string(),
            session_id: headers
                .get(SESSION_HEADER)
                .and_then(|value| value.to_str().ok())
                .map(str::to_string),
            body: Value::Null,
            field_name: None,
            file_name: None,
            content_type: None,
            bytes: 0,
        }
    }
}

struct BackendState {
    health: Mutex<FakeReply>,
    history: Mutex<FakeReply>,
    chat: Mutex<FakeReply>,
    audio: Mutex<FakeReply>,
    clear: Mutex<FakeReply>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl BackendState {
    fn record(&self, request: RecordedRequest) {
        self.requests.lock().push(request);
    }
}

/// Chat backend served by axum on an ephemeral local port.
pub struct FakeBackend {
    addr: SocketAddr,
    state: Arc<BackendState>,
    task: JoinHandle<()>,
}

impl FakeBackend {
    pub async fn start() -> Self {
        let state = Arc::new(BackendState {
            health: Mutex::new(FakeReply::ok(json!({ "status": "healthy" }))),
            history: Mutex::new(FakeReply::ok(json!([]))),
            chat: Mutex::new(FakeReply::ok(
                json!({ "message": "hello", "timestamp": "2024-01-01T00:00:00Z" }),
            )),
            audio: Mutex::new(FakeReply::status(
                500,
                json!({ "detail": "audio not scripted" }),
            )),
            clear: Mutex::new(FakeReply::ok(json!({ "message": "History cleared" }))),
            requests: Mutex::new(Vec::new()),
        });

        let router = Router::new()
            .route("/health", get(health))
            .route("/chat", post(chat))
            .route("/chat/history", get(history).delete(clear))
            .route("/chat/audio", post(audio))
            .with_state(Arc::clone(&state));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind fake backend");
        let addr = listener.local_addr().expect("fake backend addr");
        let task = tokio::spawn(async move {
            let _ = axum::serve(listener, router).await;
        });

        Self { addr, state, task }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn set_health(&self, reply: FakeReply) {
        *self.state.health.lock() = reply;
    }

    pub fn set_history(&self, reply: FakeReply) {
        *self.state.history.lock() = reply;
    }

    pub fn set_chat(&self, reply: FakeReply) {
        *self.state.chat.lock() = reply;
    }

    pub fn set_audio(&self, reply: FakeReply) {
        *self.state.audio.lock() = reply;
    }

    pub fn set_clear(&self, reply: FakeReply) {
        *self.state.clear.lock() = reply;
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.requests.lock().clone()
    }

    pub fn last_request(&self) -> Option<RecordedRequest> {
        self.state.requests.lock().last().cloned()
    }
}

impl Drop for FakeBackend {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn respond(reply: FakeReply) -> Response {
    if let Some(delay) = reply.delay {
        tokio::time::sleep(delay).await;
    }
    let status = StatusCode::from_u16(reply.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(reply.body)).into_response()
}

async fn health(State(state): State<Arc<BackendState>>, headers: HeaderMap) -> Response {
    state.record(RecordedRequest::new(Method::GET, "/health", &headers));
    let reply = state.health.lock().clone();
    respond(reply).await
}

async fn history(State(state): State<Arc<BackendState>>, headers: HeaderMap) -> Response {
    state.record(RecordedRequest::new(Method::GET, "/chat/history", &headers));
    let reply = state.history.lock().clone();
    respond(reply).await
}

async fn clear(State(state): State<Arc<BackendState>>, headers: HeaderMap) -> Response {
    state.record(RecordedRequest::new(
        Method::DELETE,
        "/chat/history",
        &headers,
    ));
    let reply = state.clear.lock().clone();
    respond(reply).await
}

async fn chat(
    State(state): State<Arc<BackendState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let mut request = RecordedRequest::new(Method::POST, "/chat", &headers);
    request.body = serde_json::from_slice(&body).unwrap_or(Value::Null);
    request.bytes = body.len();
    request.content_type = headers
        .get("content-type")
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);
    state.record(request);
    let reply = state.chat.lock().clone();
    respond(reply).await
}

async fn audio(
    State(state): State<Arc<BackendState>>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Response {
    let mut request = RecordedRequest::new(Method::POST, "/chat/audio", &headers);
    while let Ok(Some(field)) = multipart.next_field().await {
        request.field_name = field.name().map(str::to_string);
        request.file_name = field.file_name().map(str::to_string);
        request.content_type = field.content_type().map(str::to_string);
        request.bytes = field.bytes().await.map(|data| data.len()).unwrap_or(0);
    }
    state.record(request);
    let reply = state.audio.lock().clone();
    respond(reply).await
}
