use async_trait::async_trait;
use parking_lot::Mutex;
use parlor_core::{ApiError, AudioBlob, ChatApi};
use parlor_protocol::{AudioReply, ChatReply, Message};
use std::collections::VecDeque;
use std::time::Duration;

/// One scripted answer for a backend call.
#[derive(Debug, Clone)]
pub enum Scripted<T> {
    Reply(T),
    Fail(ApiError),
    /// Never resolve.
    Hang,
    /// Resolve after a delay.
    After(Duration, Result<T, ApiError>),
}

impl<T> Scripted<T> {
    async fn resolve(self) -> Result<T, ApiError> {
        match self {
            Self::Reply(value) => Ok(value),
            Self::Fail(err) => Err(err),
            Self::Hang => std::future::pending().await,
            Self::After(delay, result) => {
                tokio::time::sleep(delay).await;
                result
            }
        }
    }
}

/// Call observed by [`ScriptedApi`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiCall {
    Health,
    History { session_id: String },
    SendMessage { session_id: String, message: String },
    SendAudio { session_id: String, bytes: usize, mime: String },
    ClearHistory { session_id: String },
}

#[derive(Default)]
struct State {
    health: VecDeque<Scripted<()>>,
    history: VecDeque<Scripted<Vec<Message>>>,
    chat: VecDeque<Scripted<ChatReply>>,
    audio: VecDeque<Scripted<AudioReply>>,
    clear: VecDeque<Scripted<()>>,
    calls: Vec<ApiCall>,
}

/// [`ChatApi`] answering from per-endpoint queues.
///
/// Empty queues fall back to success for health, history and clear, and to
/// [`ApiError::NoResponse`] for sends.
#[derive(Default)]
pub struct ScriptedApi {
    state: Mutex<State>,
}

impl ScriptedApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_health(&self, scripted: Scripted<()>) -> &Self {
        self.state.lock().health.push_back(scripted);
        self
    }

    pub fn push_history(&self, scripted: Scripted<Vec<Message>>) -> &Self {
        self.state.lock().history.push_back(scripted);
        self
    }

    pub fn push_chat(&self, scripted: Scripted<ChatReply>) -> &Self {
        self.state.lock().chat.push_back(scripted);
        self
    }

    pub fn push_audio(&self, scripted: Scripted<AudioReply>) -> &Self {
        self.state.lock().audio.push_back(scripted);
        self
    }

    pub fn push_clear(&self, scripted: Scripted<()>) -> &Self {
        self.state.lock().clear.push_back(scripted);
        self
    }

    /// Queue a successful text reply.
    pub fn reply_text(&self, message: &str, timestamp: &str) -> &Self {
        self.push_chat(Scripted::Reply(ChatReply {
            message: serde_json::Value::String(message.to_string()),
            timestamp: timestamp.to_string(),
        }))
    }

    pub fn calls(&self) -> Vec<ApiCall> {
        self.state.lock().calls.clone()
    }

    pub fn send_count(&self) -> usize {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|call| {
                matches!(call, ApiCall::SendMessage { .. } | ApiCall::SendAudio { .. })
            })
            .count()
    }

    fn record(&self, call: ApiCall) {
        self.state.lock().calls.push(call);
    }
}

fn no_script<T>() -> Scripted<T> {
    Scripted::Fail(ApiError::NoResponse("no scripted reply".to_string()))
}

#[async_trait]
impl ChatApi for ScriptedApi {
    async fn health(&self) -> Result<(), ApiError> {
        self.record(ApiCall::Health);
        let next = self.state.lock().health.pop_front();
        next.unwrap_or(Scripted::Reply(())).resolve().await
    }

    async fn history(&self, session_id: &str) -> Result<Vec<Message>, ApiError> {
        self.record(ApiCall::History {
            session_id: session_id.to_string(),
        });
        let next = self.state.lock().history.pop_front();
        next.unwrap_or(Scripted::Reply(Vec::new())).resolve().await
    }

    async fn send_message(&self, session_id: &str, message: &str) -> Result<ChatReply, ApiError> {
        self.record(ApiCall::SendMessage {
            session_id: session_id.to_string(),
            message: message.to_string(),
        });
        let next = self.state.lock().chat.pop_front();
        next.unwrap_or_else(no_script).resolve().await
    }

    async fn send_audio(
        &self,
        session_id: &str,
        audio: AudioBlob,
    ) -> Result<AudioReply, ApiError> {
        self.record(ApiCall::SendAudio {
            session_id: session_id.to_string(),
            bytes: audio.bytes.len(),
            mime: audio.mime.clone(),
        });
        let next = self.state.lock().audio.pop_front();
        next.unwrap_or_else(no_script).resolve().await
    }

    async fn clear_history(&self, session_id: &str) -> Result<(), ApiError> {
        self.record(ApiCall::ClearHistory {
            session_id: session_id.to_string(),
        });
        let next = self.state.lock().clear.pop_front();
        next.unwrap_or(Scripted::Reply(())).resolve().await
    }
}
