//! Backend API abstraction.

mod http;

pub use http::{ApiTimeouts, HttpChatApi};

use crate::capture::AudioBlob;
use crate::error::ApiError;
use async_trait::async_trait;
use parlor_protocol::{AudioReply, ChatReply, Message};

/// Operations the client performs against the chat backend.
///
/// Every call except [`ChatApi::health`] is scoped to a session.
#[async_trait]
pub trait ChatApi: Send + Sync {
    /// Probe `/health`; any success status counts as reachable.
    async fn health(&self) -> Result<(), ApiError>;

    /// Fetch the full conversation for a session.
    async fn history(&self, session_id: &str) -> Result<Vec<Message>, ApiError>;

    /// Send one text message and wait for the persona's reply.
    async fn send_message(&self, session_id: &str, message: &str) -> Result<ChatReply, ApiError>;

    /// Upload a recording and wait for transcription plus reply.
    async fn send_audio(&self, session_id: &str, audio: AudioBlob)
    -> Result<AudioReply, ApiError>;

    /// Delete the conversation on the backend.
    async fn clear_history(&self, session_id: &str) -> Result<(), ApiError>;
}
