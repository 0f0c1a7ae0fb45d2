//! Wire protocol types for the Parlor chat backend and client events.

mod event;
mod message;
mod wire;

pub use event::{ChatEvent, ConnectivityStatus, EventSink, NoopEventSink};
pub use message::{Message, MessageKind, Role, now_timestamp};
pub use wire::{AudioReply, ChatReply, ChatRequest, ErrorBody};

/// Opaque identifier scoping all backend requests to one conversation.
pub type SessionId = String;

/// Header carrying the session identifier on every scoped request.
pub const SESSION_HEADER: &str = "X-Session-ID";
/// Multipart field name used for audio uploads.
pub const AUDIO_FIELD: &str = "audio_file";
