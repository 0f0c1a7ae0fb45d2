//! TUI event types for input, timers and conversation updates.

use crossterm::event::KeyEvent;
use parlor_protocol::ChatEvent;

/// Application event emitted by input handlers, timers or the event bus.
#[derive(Debug)]
pub enum AppEvent {
    /// Keyboard input event.
    Input(KeyEvent),
    /// Periodic tick event.
    Tick,
    /// Client event published by the conversation engine.
    Chat(ChatEvent),
    /// The event bus dropped events; state must be re-read.
    Resync,
    /// A scheduled scroll-to-bottom is due.
    ScrollSettled,
    /// Error from a background action.
    ActionError(String),
    /// Scroll event in the chat view.
    Scroll(i16),
}
