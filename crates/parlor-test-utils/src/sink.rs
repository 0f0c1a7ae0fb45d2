use parking_lot::Mutex;
use parlor_protocol::{ChatEvent, EventSink};
use std::sync::Arc;

/// Event sink that keeps every emitted event.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    events: Arc<Mutex<Vec<ChatEvent>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ChatEvent> {
        self.events.lock().clone()
    }

    pub fn take(&self) -> Vec<ChatEvent> {
        std::mem::take(&mut *self.events.lock())
    }

    pub fn count(&self, predicate: impl Fn(&ChatEvent) -> bool) -> usize {
        self.events.lock().iter().filter(|event| predicate(event)).count()
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, event: ChatEvent) {
        self.events.lock().push(event);
    }
}
