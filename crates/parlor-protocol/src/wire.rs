//! Request and response payloads exchanged with the chat backend.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Body of `POST /chat`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatRequest {
    pub message: String,
}

/// Successful reply to `POST /chat`.
///
/// `message` is kept as a raw JSON value because the backend does not
/// guarantee a string; use [`ChatReply::text`] to read it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatReply {
    #[serde(default)]
    pub message: Value,
    pub timestamp: String,
}

impl ChatReply {
    /// Reply text coerced to a string.
    pub fn text(&self) -> String {
        match &self.message {
            Value::Null => String::new(),
            Value::String(text) => text.clone(),
            other => other.to_string(),
        }
    }
}

/// Successful reply to `POST /chat/audio`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AudioReply {
    pub transcribed_text: String,
    pub response_text: String,
    pub timestamp: String,
    pub audio_url: String,
}

/// Structured error body returned with non-2xx responses.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ErrorBody {
    #[serde(default)]
    pub detail: Option<Value>,
}

impl ErrorBody {
    /// Human-readable detail, if the backend sent one.
    pub fn detail_text(&self) -> Option<String> {
        match self.detail.as_ref()? {
            Value::Null => None,
            Value::String(text) if text.trim().is_empty() => None,
            Value::String(text) => Some(text.clone()),
            other => Some(other.to_string()),
        }
    }
}
