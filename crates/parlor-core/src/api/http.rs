//! `reqwest` implementation of [`ChatApi`].

use super::ChatApi;
use crate::capture::AudioBlob;
use crate::error::ApiError;
use async_trait::async_trait;
use log::debug;
use parlor_config::ApiConfig;
use parlor_protocol::{
    AUDIO_FIELD, AudioReply, ChatReply, ChatRequest, ErrorBody, Message, SESSION_HEADER,
};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use std::time::Duration;

/// Per-call request bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApiTimeouts {
    pub health: Duration,
    pub chat: Duration,
    pub audio: Duration,
    pub history: Duration,
}

impl Default for ApiTimeouts {
    fn default() -> Self {
        Self::from_config(&ApiConfig::default())
    }
}

impl ApiTimeouts {
    pub fn from_config(config: &ApiConfig) -> Self {
        Self {
            health: config.health_timeout(),
            chat: config.chat_timeout(),
            audio: config.audio_timeout(),
            history: config.history_timeout(),
        }
    }
}

/// HTTP client for the chat backend.
#[derive(Debug, Clone)]
pub struct HttpChatApi {
    client: Client,
    base_url: String,
    timeouts: ApiTimeouts,
}

impl HttpChatApi {
    pub fn new(base_url: impl Into<String>, timeouts: ApiTimeouts) -> Result<Self, ApiError> {
        let client = Client::builder()
            .build()
            .map_err(|err| ApiError::Request(err.to_string()))?;
        let base_url: String = base_url.into();
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeouts,
        })
    }

    pub fn from_config(config: &ApiConfig) -> Result<Self, ApiError> {
        Self::new(config.base_url.clone(), ApiTimeouts::from_config(config))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Send a request and map transport failures and non-2xx statuses.
    async fn execute(&self, request: RequestBuilder) -> Result<Response, ApiError> {
        let response = request.send().await.map_err(classify)?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let detail = serde_json::from_str::<ErrorBody>(&body)
            .ok()
            .and_then(|body| body.detail_text());
        debug!(
            "backend returned error status (status={}, detail={:?})",
            status.as_u16(),
            detail
        );
        Err(ApiError::Server {
            status: status.as_u16(),
            detail,
        })
    }
}

#[async_trait]
impl ChatApi for HttpChatApi {
    async fn health(&self) -> Result<(), ApiError> {
        let request = self
            .client
            .get(self.url("/health"))
            .timeout(self.timeouts.health);
        self.execute(request).await.map(|_| ())
    }

    async fn history(&self, session_id: &str) -> Result<Vec<Message>, ApiError> {
        let request = self
            .client
            .get(self.url("/chat/history"))
            .header(SESSION_HEADER, session_id)
            .timeout(self.timeouts.history);
        decode(self.execute(request).await?).await
    }

    async fn send_message(&self, session_id: &str, message: &str) -> Result<ChatReply, ApiError> {
        let body = ChatRequest {
            message: message.to_string(),
        };
        let request = self
            .client
            .post(self.url("/chat"))
            .header(SESSION_HEADER, session_id)
            .json(&body)
            .timeout(self.timeouts.chat);
        decode(self.execute(request).await?).await
    }

    async fn send_audio(
        &self,
        session_id: &str,
        audio: AudioBlob,
    ) -> Result<AudioReply, ApiError> {
        let file_name = audio.file_name();
        let part = Part::bytes(audio.bytes)
            .file_name(file_name)
            .mime_str(&audio.mime)
            .map_err(|err| ApiError::Request(err.to_string()))?;
        let form = Form::new().part(AUDIO_FIELD, part);
        let request = self
            .client
            .post(self.url("/chat/audio"))
            .header(SESSION_HEADER, session_id)
            .multipart(form)
            .timeout(self.timeouts.audio);
        decode(self.execute(request).await?).await
    }

    async fn clear_history(&self, session_id: &str) -> Result<(), ApiError> {
        let request = self
            .client
            .delete(self.url("/chat/history"))
            .header(SESSION_HEADER, session_id)
            .timeout(self.timeouts.history);
        self.execute(request).await.map(|_| ())
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, ApiError> {
    let bytes = response.bytes().await.map_err(classify)?;
    serde_json::from_slice(&bytes).map_err(|err| ApiError::Decode(err.to_string()))
}

fn classify(err: reqwest::Error) -> ApiError {
    if err.is_timeout() {
        ApiError::Timeout
    } else if err.is_builder() {
        ApiError::Request(err.to_string())
    } else {
        ApiError::NoResponse(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn trailing_slash_is_trimmed() {
        let api = HttpChatApi::new("http://localhost:8000/", ApiTimeouts::default()).expect("api");
        assert_eq!(api.base_url(), "http://localhost:8000");
        assert_eq!(api.url("/health"), "http://localhost:8000/health");
    }

    #[test]
    fn timeouts_follow_config() {
        let timeouts = ApiTimeouts::default();
        assert_eq!(timeouts.health, Duration::from_secs(5));
        assert_eq!(timeouts.chat, Duration::from_secs(30));
        assert_eq!(timeouts.audio, Duration::from_secs(60));
    }

    #[tokio::test]
    async fn invalid_base_url_is_a_request_error() {
        let api = HttpChatApi::new("not a url", ApiTimeouts::default()).expect("api");
        let err = api.health().await.unwrap_err();
        assert!(matches!(err, ApiError::Request(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn unreachable_backend_is_no_response() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
        let addr = listener.local_addr().expect("addr");
        drop(listener);
        let api = HttpChatApi::new(format!("http://{addr}"), ApiTimeouts::default()).expect("api");
        let err = api.history("s").await.unwrap_err();
        assert!(matches!(err, ApiError::NoResponse(_)), "got {err:?}");
    }
}
