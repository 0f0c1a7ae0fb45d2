use async_trait::async_trait;
use parking_lot::Mutex;
use parlor_core::{CaptureBackend, CaptureConstraints, CaptureError, CaptureStream};
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Capture backend that replays fixed fragments.
///
/// Fragments are delivered as soon as the stream opens; `trailing`
/// fragments only after a stop is requested. The stream ends once stopped
/// and drained.
#[derive(Debug, Clone)]
pub struct ScriptedCapture {
    supported: bool,
    open_error: Option<String>,
    stream_error: Option<String>,
    chunks: Vec<Vec<u8>>,
    trailing: Vec<Vec<u8>>,
    mime: String,
    opened: Arc<AtomicUsize>,
    released: Arc<AtomicBool>,
    constraints: Arc<Mutex<Option<CaptureConstraints>>>,
}

impl Default for ScriptedCapture {
    fn default() -> Self {
        Self {
            supported: true,
            open_error: None,
            stream_error: None,
            chunks: Vec::new(),
            trailing: Vec::new(),
            mime: "audio/webm".to_string(),
            opened: Arc::new(AtomicUsize::new(0)),
            released: Arc::new(AtomicBool::new(false)),
            constraints: Arc::new(Mutex::new(None)),
        }
    }
}

impl ScriptedCapture {
    pub fn new(chunks: Vec<Vec<u8>>) -> Self {
        Self {
            chunks,
            ..Self::default()
        }
    }

    pub fn unsupported() -> Self {
        Self {
            supported: false,
            ..Self::default()
        }
    }

    /// Opening fails as if permission were denied.
    pub fn denied(reason: &str) -> Self {
        Self {
            open_error: Some(reason.to_string()),
            ..Self::default()
        }
    }

    /// Opening succeeds but the stream fails before any stop, once the
    /// initial fragments are delivered.
    pub fn failing(reason: &str) -> Self {
        Self {
            stream_error: Some(reason.to_string()),
            ..Self::default()
        }
    }

    pub fn with_trailing(mut self, trailing: Vec<Vec<u8>>) -> Self {
        self.trailing = trailing;
        self
    }

    pub fn with_mime(mut self, mime: &str) -> Self {
        self.mime = mime.to_string();
        self
    }

    pub fn open_count(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    /// Whether the last opened stream has been dropped.
    pub fn released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }

    pub fn last_constraints(&self) -> Option<CaptureConstraints> {
        *self.constraints.lock()
    }
}

#[async_trait]
impl CaptureBackend for ScriptedCapture {
    fn is_supported(&self) -> bool {
        self.supported
    }

    async fn open(
        &self,
        constraints: &CaptureConstraints,
    ) -> Result<Box<dyn CaptureStream>, CaptureError> {
        *self.constraints.lock() = Some(*constraints);
        if let Some(reason) = &self.open_error {
            return Err(CaptureError::Device(reason.clone()));
        }
        self.opened.fetch_add(1, Ordering::SeqCst);
        self.released.store(false, Ordering::SeqCst);
        Ok(Box::new(ScriptedStream {
            chunks: self.chunks.iter().cloned().collect(),
            trailing: self.trailing.iter().cloned().collect(),
            error: self.stream_error.clone(),
            stopped: false,
            mime: self.mime.clone(),
            released: Arc::clone(&self.released),
        }))
    }
}

struct ScriptedStream {
    chunks: VecDeque<Vec<u8>>,
    trailing: VecDeque<Vec<u8>>,
    error: Option<String>,
    stopped: bool,
    mime: String,
    released: Arc<AtomicBool>,
}

#[async_trait]
impl CaptureStream for ScriptedStream {
    async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>, CaptureError> {
        if let Some(chunk) = self.chunks.pop_front() {
            return Ok(Some(chunk));
        }
        if let Some(reason) = self.error.take() {
            return Err(CaptureError::Device(reason));
        }
        if !self.stopped {
            std::future::pending::<()>().await;
        }
        Ok(self.trailing.pop_front())
    }

    fn request_stop(&mut self) {
        self.stopped = true;
    }

    fn mime(&self) -> &str {
        &self.mime
    }
}

impl Drop for ScriptedStream {
    fn drop(&mut self) {
        self.released.store(true, Ordering::SeqCst);
    }
}
