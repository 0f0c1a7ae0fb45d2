//! Conversation orchestration: text and audio sends, history load and clear.
//!
//! At most one send is pending at a time. Each send appends exactly one
//! assistant message, whether it comes from the backend reply, an error, or
//! the client-side send guard.

use crate::api::ChatApi;
use crate::capture::AudioBlob;
use crate::connectivity::ConnectivityMonitor;
use crate::context::ClientContext;
use crate::error::ApiError;
use crate::store::SharedMessageStore;
use log::{debug, info, warn};
use parking_lot::Mutex;
use parlor_config::ApiConfig;
use parlor_protocol::{
    ChatEvent, ConnectivityStatus, EventSink, Message, MessageKind, now_timestamp,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::task::JoinHandle;

pub const TIMEOUT_TEXT: &str =
    "Timed out waiting for a response from the server. Check your connection.";
pub const NO_RESPONSE_TEXT: &str = "The server is not responding. Check that the API is running.";
pub const GENERIC_ERROR_TEXT: &str = "Sorry, something went wrong while processing your message.";
pub const SEND_GUARD_TEXT: &str =
    "The request took too long to respond. Check that the server is running correctly.";
pub const AUDIO_ERROR_TEXT: &str = "Failed to process audio.";
const UNKNOWN_SERVER_DETAIL: &str = "Unknown error";

/// Client-side timers applied around backend calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConversationTimings {
    /// Force-resolves a text send that has not settled.
    pub send_guard: Duration,
    /// Delay before re-probing health after a send got no response.
    pub recheck_delay: Duration,
}

impl Default for ConversationTimings {
    fn default() -> Self {
        Self::from_config(&ApiConfig::default())
    }
}

impl ConversationTimings {
    pub fn from_config(config: &ApiConfig) -> Self {
        Self {
            send_guard: config.send_guard(),
            recheck_delay: config.recheck_delay(),
        }
    }
}

/// Result of a send request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// Rejected before any request: empty input or a send already pending.
    Ignored,
    /// The backend replied and the reply was appended.
    Completed,
    /// The request failed and an error message was appended.
    Failed,
    /// The send guard fired first; any later reply was discarded.
    TimedOut,
}

/// Drives sends and history operations against the backend.
#[derive(Clone)]
pub struct Conversation {
    inner: Arc<Inner>,
}

struct Inner {
    api: Arc<dyn ChatApi>,
    store: SharedMessageStore,
    monitor: ConnectivityMonitor,
    events: Arc<dyn EventSink>,
    context: ClientContext,
    timings: ConversationTimings,
    /// Attempt id of the pending send, or 0 when idle.
    pending: AtomicU64,
    next_attempt: AtomicU64,
    recheck: Mutex<Option<JoinHandle<()>>>,
}

impl Inner {
    fn append(&self, message: Message) {
        let change = self.store.append(message);
        self.events.emit(change.into());
    }

    fn append_all(&self, messages: impl IntoIterator<Item = Message>) {
        let change = self.store.append_all(messages);
        self.events.emit(change.into());
    }

    /// Clear the pending slot if it still belongs to `attempt`.
    fn release(&self, attempt: u64) -> bool {
        let released = self
            .pending
            .compare_exchange(attempt, 0, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok();
        if released {
            self.events.emit(ChatEvent::PendingChanged(false));
        }
        released
    }

    fn schedule_recheck(&self) {
        let handle = self.monitor.schedule_recheck(self.timings.recheck_delay);
        if let Some(previous) = self.recheck.lock().replace(handle) {
            previous.abort();
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(handle) = self.recheck.lock().take() {
            handle.abort();
        }
    }
}

/// Holds the pending slot for one send; released on every exit path.
struct PendingClaim {
    inner: Arc<Inner>,
    attempt: u64,
}

impl Drop for PendingClaim {
    fn drop(&mut self) {
        self.inner.release(self.attempt);
    }
}

struct GuardTask(JoinHandle<()>);

impl Drop for GuardTask {
    fn drop(&mut self) {
        self.0.abort();
    }
}

impl Conversation {
    pub fn new(
        api: Arc<dyn ChatApi>,
        store: SharedMessageStore,
        monitor: ConnectivityMonitor,
        events: Arc<dyn EventSink>,
        context: ClientContext,
        timings: ConversationTimings,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                api,
                store,
                monitor,
                events,
                context,
                timings,
                pending: AtomicU64::new(0),
                next_attempt: AtomicU64::new(0),
                recheck: Mutex::new(None),
            }),
        }
    }

    pub fn context(&self) -> &ClientContext {
        &self.inner.context
    }

    pub fn store(&self) -> &SharedMessageStore {
        &self.inner.store
    }

    pub fn is_pending(&self) -> bool {
        self.inner.pending.load(Ordering::SeqCst) != 0
    }

    /// Send one text message and wait until it settles.
    pub async fn send_text(&self, text: &str) -> SendOutcome {
        match self.begin_text(text) {
            Some(claim) => self.finish_text(claim, text.to_string()).await,
            None => SendOutcome::Ignored,
        }
    }

    /// Validate, claim and append the user message now; run the request in
    /// a background task.
    ///
    /// Returns `None` when the send was rejected.
    pub fn spawn_send_text(&self, text: impl Into<String>) -> Option<JoinHandle<SendOutcome>> {
        let text = text.into();
        let claim = self.begin_text(&text)?;
        let conversation = self.clone();
        Some(tokio::spawn(async move {
            conversation.finish_text(claim, text).await
        }))
    }

    /// Upload one recording and wait until it settles.
    pub async fn send_audio(&self, blob: AudioBlob) -> SendOutcome {
        match self.begin_audio(&blob) {
            Some(claim) => self.finish_audio(claim, blob).await,
            None => SendOutcome::Ignored,
        }
    }

    /// Claim the pending slot now and upload in a background task.
    pub fn spawn_send_audio(&self, blob: AudioBlob) -> Option<JoinHandle<SendOutcome>> {
        let claim = self.begin_audio(&blob)?;
        let conversation = self.clone();
        Some(tokio::spawn(async move {
            conversation.finish_audio(claim, blob).await
        }))
    }

    /// Delete the conversation on the backend and empty the store.
    ///
    /// Failures leave the store untouched and are only logged.
    pub async fn clear_history(&self) -> bool {
        let session_id = &self.inner.context.session_id;
        match self.inner.api.clear_history(session_id).await {
            Ok(()) => {
                let change = self.inner.store.clear();
                self.inner.events.emit(change.into());
                info!("history cleared (session_id={session_id})");
                true
            }
            Err(err) => {
                warn!("failed to clear history (session_id={session_id}, error={err})");
                false
            }
        }
    }

    /// Replace the store with the backend's history for `session_id`.
    ///
    /// Failures leave the store untouched and are only logged.
    pub async fn load_history(&self, session_id: &str) -> bool {
        match self.inner.api.history(session_id).await {
            Ok(messages) => {
                debug!(
                    "history loaded (session_id={session_id}, count={})",
                    messages.len()
                );
                let change = self.inner.store.replace_all(messages);
                self.inner.events.emit(change.into());
                true
            }
            Err(err) => {
                warn!("failed to load history (session_id={session_id}, error={err})");
                false
            }
        }
    }

    fn claim(&self) -> Option<PendingClaim> {
        let attempt = self.inner.next_attempt.fetch_add(1, Ordering::SeqCst) + 1;
        if self
            .inner
            .pending
            .compare_exchange(0, attempt, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("send rejected while another send is pending");
            return None;
        }
        self.inner.events.emit(ChatEvent::PendingChanged(true));
        Some(PendingClaim {
            inner: Arc::clone(&self.inner),
            attempt,
        })
    }

    fn begin_text(&self, text: &str) -> Option<PendingClaim> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            debug!("ignoring empty text send");
            return None;
        }
        let claim = self.claim()?;
        self.inner.append(Message::user(trimmed));
        Some(claim)
    }

    async fn finish_text(&self, claim: PendingClaim, text: String) -> SendOutcome {
        let settled = Arc::new(AtomicBool::new(false));
        let _guard = self.arm_send_guard(claim.attempt, Arc::clone(&settled));
        let session_id = &self.inner.context.session_id;
        debug!(
            "sending text (session_id={session_id}, attempt={}, len={})",
            claim.attempt,
            text.len()
        );

        let result = self.inner.api.send_message(session_id, &text).await;
        if settled.swap(true, Ordering::SeqCst) {
            warn!(
                "discarding reply that arrived after the send guard (attempt={}, ok={})",
                claim.attempt,
                result.is_ok()
            );
            return SendOutcome::TimedOut;
        }

        match result {
            Ok(reply) => {
                self.inner
                    .append(Message::assistant(reply.text(), reply.timestamp.clone()));
                SendOutcome::Completed
            }
            Err(err) => {
                warn!("text send failed (attempt={}, error={err})", claim.attempt);
                let content = self.describe_text_failure(&err);
                self.inner.append(Message::assistant(content, now_timestamp()));
                SendOutcome::Failed
            }
        }
    }

    /// Spawn the timer that settles a text send the backend never answered.
    fn arm_send_guard(&self, attempt: u64, settled: Arc<AtomicBool>) -> GuardTask {
        let inner = Arc::clone(&self.inner);
        let delay = inner.timings.send_guard;
        GuardTask(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if settled.swap(true, Ordering::SeqCst) {
                return;
            }
            warn!(
                "send guard fired (attempt={attempt}, guard_ms={})",
                delay.as_millis()
            );
            inner.monitor.set_status(ConnectivityStatus::TimeoutError);
            inner.append(Message::assistant(SEND_GUARD_TEXT, now_timestamp()));
            inner.release(attempt);
        }))
    }

    fn describe_text_failure(&self, err: &ApiError) -> String {
        match err {
            ApiError::Timeout => {
                self.inner
                    .monitor
                    .set_status(ConnectivityStatus::TimeoutError);
                TIMEOUT_TEXT.to_string()
            }
            ApiError::Server { status, detail } => format!(
                "Server error: {status} - {}",
                detail.as_deref().unwrap_or(UNKNOWN_SERVER_DETAIL)
            ),
            ApiError::NoResponse(_) => {
                self.inner
                    .monitor
                    .set_status(ConnectivityStatus::Unavailable);
                self.inner.schedule_recheck();
                NO_RESPONSE_TEXT.to_string()
            }
            ApiError::Decode(_) | ApiError::Request(_) => GENERIC_ERROR_TEXT.to_string(),
        }
    }

    fn begin_audio(&self, blob: &AudioBlob) -> Option<PendingClaim> {
        if blob.is_empty() {
            debug!("ignoring empty audio send");
            return None;
        }
        self.claim()
    }

    async fn finish_audio(&self, claim: PendingClaim, blob: AudioBlob) -> SendOutcome {
        let session_id = &self.inner.context.session_id;
        debug!(
            "sending audio (session_id={session_id}, attempt={}, bytes={}, mime={})",
            claim.attempt,
            blob.bytes.len(),
            blob.mime
        );

        match self.inner.api.send_audio(session_id, blob).await {
            Ok(reply) => {
                let user =
                    Message::user(reply.transcribed_text).with_kind(MessageKind::Audio);
                let mut assistant = Message::assistant(reply.response_text, reply.timestamp)
                    .with_kind(MessageKind::Audio);
                if !reply.audio_url.is_empty() {
                    assistant =
                        assistant.with_audio_url(self.inner.context.resolve_url(&reply.audio_url));
                }
                self.inner.append_all([user, assistant]);
                SendOutcome::Completed
            }
            Err(err) => {
                warn!("audio send failed (attempt={}, error={err})", claim.attempt);
                let content = err.detail().unwrap_or(AUDIO_ERROR_TEXT).to_string();
                self.inner.append(Message::assistant(content, now_timestamp()));
                SendOutcome::Failed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn timings_follow_config() {
        let timings = ConversationTimings::default();
        assert_eq!(timings.send_guard, Duration::from_secs(45));
        assert_eq!(timings.recheck_delay, Duration::from_secs(5));
    }
}
