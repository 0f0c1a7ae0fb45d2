//! Error types for the core client crate.

use thiserror::Error;

/// Failures talking to the chat backend.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ApiError {
    /// The client-side request bound elapsed.
    #[error("request timed out")]
    Timeout,
    /// The backend answered with a non-success status.
    #[error("server error {status}: {}", detail.as_deref().unwrap_or("no detail"))]
    Server { status: u16, detail: Option<String> },
    /// The request was sent but no response arrived.
    #[error("no response from server: {0}")]
    NoResponse(String),
    /// A success response carried an unexpected body.
    #[error("failed to decode response: {0}")]
    Decode(String),
    /// The request could not be built.
    #[error("invalid request: {0}")]
    Request(String),
}

impl ApiError {
    /// Structured detail sent by the backend, if any.
    pub fn detail(&self) -> Option<&str> {
        match self {
            Self::Server { detail, .. } => detail.as_deref(),
            _ => None,
        }
    }
}

/// Failures acquiring or reading the microphone.
#[derive(Debug, Error)]
pub enum CaptureError {
    /// No capture device is available on this platform.
    #[error("audio capture is not supported: {0}")]
    Unsupported(String),
    /// A capture is already running.
    #[error("already recording")]
    AlreadyRecording,
    /// The device could not be opened or failed mid-capture.
    #[error("capture device error: {0}")]
    Device(String),
    /// IO error while reading captured data.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures persisting the session identifier.
#[derive(Debug, Error)]
pub enum SessionError {
    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// Serialization error.
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    /// No storage location could be resolved.
    #[error("no session storage location")]
    NoStorage,
}
