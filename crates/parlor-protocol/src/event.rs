//! Client-side events emitted by the conversation engine.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Backend reachability as shown in the status strip.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConnectivityStatus {
    /// First probe still in flight.
    #[default]
    Checking,
    /// Last probe succeeded.
    Connected,
    /// Last probe failed.
    Disconnected,
    /// A chat request exceeded the client-side guard.
    TimeoutError,
    /// A chat request received no response at all.
    Unavailable,
}

impl ConnectivityStatus {
    /// True only after a successful probe.
    pub fn is_connected(self) -> bool {
        matches!(self, Self::Connected)
    }
}

impl fmt::Display for ConnectivityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Checking => "checking connection...",
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
            Self::TimeoutError => "error - request timed out",
            Self::Unavailable => "error - API unavailable",
        };
        f.write_str(label)
    }
}

/// Notification that shared client state changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatEvent {
    /// The message store was replaced by a new snapshot.
    MessagesChanged { revision: u64, count: usize },
    /// A send started or finished.
    PendingChanged(bool),
    /// Connectivity status was updated.
    StatusChanged(ConnectivityStatus),
    /// One more second of audio was captured.
    RecordingTick { elapsed_secs: u64 },
    /// Capture stopped; the blob may still be finalizing.
    RecordingStopped,
    /// The capture device failed before a stop was requested.
    RecordingFailed(String),
}

/// Sink interface for client events.
pub trait EventSink: Send + Sync {
    /// Emit an event to downstream listeners.
    fn emit(&self, event: ChatEvent);
}

/// Sink that drops every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopEventSink;

impl EventSink for NoopEventSink {
    fn emit(&self, _event: ChatEvent) {}
}
