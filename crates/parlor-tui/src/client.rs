//! Conversation client driven by the TUI event loop.

use crate::app::MICROPHONE_ALERT;
use crate::event::AppEvent;
use crate::playback::Player;
use log::{debug, info, warn};
use parlor_core::{
    AudioCaptureController, CaptureError, ConnectivityMonitor, Conversation, MonitorHandle,
};
use parlor_protocol::ConnectivityStatus;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Shown when a finished recording cannot be sent.
pub const RECORDING_DISCARDED: &str =
    "A message is still being sent. The recording was discarded.";

/// Wraps the conversation, connectivity monitor, recorder and player.
pub struct ChatClient {
    conversation: Conversation,
    monitor: ConnectivityMonitor,
    recorder: AudioCaptureController,
    player: Player,
}

impl ChatClient {
    /// Create a new client.
    pub fn new(
        conversation: Conversation,
        monitor: ConnectivityMonitor,
        recorder: AudioCaptureController,
        player: Player,
    ) -> Self {
        Self {
            conversation,
            monitor,
            recorder,
            player,
        }
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn status(&self) -> ConnectivityStatus {
        self.monitor.status()
    }

    pub fn is_pending(&self) -> bool {
        self.conversation.is_pending()
    }

    pub fn is_recording(&self) -> bool {
        self.recorder.is_recording()
    }

    /// Start periodic health probes.
    pub fn start_monitor(&self, interval: Duration) -> MonitorHandle {
        debug!("starting connectivity monitor (interval_ms={})", interval.as_millis());
        self.monitor.spawn(interval)
    }

    /// Load the transcript for the current session in the background.
    pub fn load_history(&self) -> JoinHandle<bool> {
        let conversation = self.conversation.clone();
        tokio::spawn(async move {
            let session_id = conversation.context().session_id.clone();
            conversation.load_history(&session_id).await
        })
    }

    /// Delete the transcript in the background.
    pub fn clear_history(&self) -> JoinHandle<bool> {
        let conversation = self.conversation.clone();
        info!("clearing history");
        tokio::spawn(async move { conversation.clear_history().await })
    }

    /// Send a text message; returns false when the send was rejected.
    pub fn send_text(&self, text: String) -> bool {
        self.conversation.spawn_send_text(text).is_some()
    }

    pub async fn start_recording(&mut self) -> Result<(), CaptureError> {
        self.recorder.start().await
    }

    /// Release a capture whose device failed.
    pub fn clear_failed_recording(&mut self) -> bool {
        self.recorder.clear_failed()
    }

    /// Stop capture and dispatch the finalized blob as a voice turn.
    ///
    /// Returns `None` when nothing was recording.
    pub fn stop_recording(&mut self, sender: mpsc::Sender<AppEvent>) -> Option<JoinHandle<()>> {
        let pending = self.recorder.request_stop()?;
        let conversation = self.conversation.clone();
        Some(tokio::spawn(async move {
            let blob = match pending.finish().await {
                Ok(Some(blob)) => blob,
                Ok(None) => {
                    debug!("empty recording discarded");
                    return;
                }
                Err(err) => {
                    warn!("recording failed (error={err})");
                    let _ = sender
                        .send(AppEvent::ActionError(MICROPHONE_ALERT.to_string()))
                        .await;
                    return;
                }
            };
            if conversation.spawn_send_audio(blob).is_none() {
                warn!("recording discarded while another send is pending");
                let _ = sender
                    .send(AppEvent::ActionError(RECORDING_DISCARDED.to_string()))
                    .await;
            }
        }))
    }

    /// Play a reply through the configured player.
    pub fn play(&self, url: &str) -> anyhow::Result<()> {
        self.player.play(url)
    }
}
