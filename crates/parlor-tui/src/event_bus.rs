//! Broadcast event bus bridging the conversation engine and the UI loop.

use crate::event::AppEvent;
use log::{debug, warn};
use parlor_protocol::{ChatEvent, EventSink};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

/// Broadcast-backed sink shared by the orchestrator, monitor and recorder.
#[derive(Clone, Debug)]
pub struct EventBus {
    sender: broadcast::Sender<ChatEvent>,
}

impl EventBus {
    /// Create a new event bus with the given channel buffer size.
    pub fn new(buffer: usize) -> Self {
        let (sender, _) = broadcast::channel(buffer);
        debug!("tui event bus initialized (buffer={})", buffer);
        Self { sender }
    }

    /// Subscribe to the event stream.
    pub fn subscribe(&self) -> broadcast::Receiver<ChatEvent> {
        self.sender.subscribe()
    }

    /// Forward every bus event into the UI loop until either side closes.
    pub fn forward(&self, sender: mpsc::Sender<AppEvent>) -> JoinHandle<()> {
        let mut receiver = self.subscribe();
        tokio::spawn(async move {
            loop {
                let event = match receiver.recv().await {
                    Ok(event) => AppEvent::Chat(event),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("ui lagged behind event bus (skipped={skipped})");
                        AppEvent::Resync
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                };
                if sender.send(event).await.is_err() {
                    break;
                }
            }
            debug!("event bus forwarder stopped");
        })
    }
}

impl EventSink for EventBus {
    /// Emit an event into the broadcast channel.
    fn emit(&self, event: ChatEvent) {
        let _ = self.sender.send(event);
    }
}
