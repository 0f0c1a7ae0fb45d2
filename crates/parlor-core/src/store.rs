//! Ordered, snapshot-based message store.

use parking_lot::RwLock;
use parlor_protocol::{ChatEvent, Message, Role};
use std::sync::Arc;

/// Revision and length after a store mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreChange {
    pub revision: u64,
    pub count: usize,
}

impl From<StoreChange> for ChatEvent {
    fn from(change: StoreChange) -> Self {
        ChatEvent::MessagesChanged {
            revision: change.revision,
            count: change.count,
        }
    }
}

/// Append-ordered message list.
///
/// Every mutation installs a new snapshot, so a snapshot handed out earlier
/// never changes underneath its holder.
#[derive(Debug, Clone)]
pub struct MessageStore {
    messages: Arc<[Message]>,
    revision: u64,
}

impl Default for MessageStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageStore {
    pub fn new() -> Self {
        Self {
            messages: Arc::from(Vec::new()),
            revision: 0,
        }
    }

    pub fn snapshot(&self) -> Arc<[Message]> {
        Arc::clone(&self.messages)
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last_role(&self) -> Option<Role> {
        self.messages.last().map(|message| message.role)
    }

    pub fn append(&mut self, message: Message) -> StoreChange {
        self.append_all(std::iter::once(message))
    }

    /// Append several messages as one revision.
    pub fn append_all(&mut self, messages: impl IntoIterator<Item = Message>) -> StoreChange {
        let mut next = self.messages.to_vec();
        next.extend(messages);
        self.install(next)
    }

    pub fn replace_all(&mut self, messages: Vec<Message>) -> StoreChange {
        self.install(messages)
    }

    pub fn clear(&mut self) -> StoreChange {
        self.install(Vec::new())
    }

    fn install(&mut self, messages: Vec<Message>) -> StoreChange {
        self.messages = Arc::from(messages);
        self.revision += 1;
        StoreChange {
            revision: self.revision,
            count: self.messages.len(),
        }
    }
}

/// Store handle shared between the orchestrator tasks and the UI.
#[derive(Debug, Clone, Default)]
pub struct SharedMessageStore {
    inner: Arc<RwLock<MessageStore>>,
}

impl SharedMessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Arc<[Message]> {
        self.inner.read().snapshot()
    }

    pub fn revision(&self) -> u64 {
        self.inner.read().revision()
    }

    /// Snapshot and its revision read under one lock.
    pub fn versioned_snapshot(&self) -> (u64, Arc<[Message]>) {
        let store = self.inner.read();
        (store.revision(), store.snapshot())
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    pub fn last_role(&self) -> Option<Role> {
        self.inner.read().last_role()
    }

    pub fn append(&self, message: Message) -> StoreChange {
        self.inner.write().append(message)
    }

    pub fn append_all(&self, messages: impl IntoIterator<Item = Message>) -> StoreChange {
        self.inner.write().append_all(messages)
    }

    pub fn replace_all(&self, messages: Vec<Message>) -> StoreChange {
        self.inner.write().replace_all(messages)
    }

    pub fn clear(&self) -> StoreChange {
        self.inner.write().clear()
    }
}
