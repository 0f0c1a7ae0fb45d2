//! Core client primitives for Parlor.
//!
//! This crate owns the session identity, the message store, the backend API
//! client, connectivity monitoring, the conversation orchestrator, audio
//! capture and scroll tracking used by the terminal UI.

pub mod api;
pub mod capture;
pub mod connectivity;
pub mod context;
pub mod conversation;
pub mod error;
pub mod scroll;
pub mod session;
pub mod store;

pub use api::{ApiTimeouts, ChatApi, HttpChatApi};
pub use capture::{
    AudioBlob, AudioCaptureController, CaptureBackend, CaptureConstraints, CaptureStream,
    CommandCaptureBackend, PendingRecording,
};
pub use connectivity::{ConnectivityMonitor, MonitorHandle, StatusCell};
pub use context::ClientContext;
pub use conversation::{Conversation, ConversationTimings, SendOutcome};
pub use error::{ApiError, CaptureError, SessionError};
pub use scroll::{ScrollDecision, ScrollMetrics, ScrollTracker};
pub use session::SessionIdentity;
pub use store::{MessageStore, SharedMessageStore, StoreChange};
/// Protocol types re-exported for convenience.
pub use parlor_protocol::{ChatEvent, ConnectivityStatus, EventSink, Message, MessageKind, Role};
