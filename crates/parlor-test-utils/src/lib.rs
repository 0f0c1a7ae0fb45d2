//! Test helpers shared across Parlor crates.

pub mod api;
pub mod backend;
pub mod capture;
pub mod sink;

pub use api::{ApiCall, Scripted, ScriptedApi};
pub use backend::{FakeBackend, FakeReply, RecordedRequest};
pub use capture::ScriptedCapture;
pub use sink::RecordingSink;
