//! Microphone capture.
//!
//! A [`CaptureBackend`] opens a [`CaptureStream`] that yields encoded audio
//! fragments. [`AudioCaptureController`] drives one capture at a time,
//! publishes elapsed seconds while recording, and assembles the fragments
//! into an [`AudioBlob`] once the stream finalizes.

mod command;

pub use command::CommandCaptureBackend;

use crate::error::CaptureError;
use async_trait::async_trait;
use log::{debug, info, warn};
use parlor_config::AudioConfig;
use parlor_protocol::{ChatEvent, EventSink};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::{AbortHandle, JoinHandle};

/// Device parameters requested when opening a capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureConstraints {
    pub echo_cancellation: bool,
    pub noise_suppression: bool,
    pub sample_rate: u32,
}

impl Default for CaptureConstraints {
    fn default() -> Self {
        Self {
            echo_cancellation: true,
            noise_suppression: true,
            sample_rate: 44_100,
        }
    }
}

impl CaptureConstraints {
    pub fn from_config(config: &AudioConfig) -> Self {
        Self {
            echo_cancellation: config.echo_cancellation,
            noise_suppression: config.noise_suppression,
            sample_rate: config.sample_rate,
        }
    }
}

/// A finished recording ready for upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioBlob {
    pub bytes: Vec<u8>,
    pub mime: String,
}

impl AudioBlob {
    pub fn new(bytes: Vec<u8>, mime: impl Into<String>) -> Self {
        Self {
            bytes,
            mime: mime.into(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Upload file name with an extension matching the MIME type.
    pub fn file_name(&self) -> String {
        let essence = self.mime.split(';').next().unwrap_or_default().trim();
        let ext = match essence {
            "audio/webm" => "webm",
            "audio/wav" | "audio/x-wav" | "audio/wave" => "wav",
            "audio/ogg" => "ogg",
            "audio/mpeg" => "mp3",
            "audio/mp4" => "m4a",
            "audio/flac" => "flac",
            _ => "bin",
        };
        format!("audio.{ext}")
    }
}

/// Source of capture streams.
#[async_trait]
pub trait CaptureBackend: Send + Sync {
    /// Whether a capture device can be opened at all.
    fn is_supported(&self) -> bool;

    /// Acquire the device and begin capturing.
    async fn open(
        &self,
        constraints: &CaptureConstraints,
    ) -> Result<Box<dyn CaptureStream>, CaptureError>;
}

/// An open capture.
///
/// Dropping the stream must release the device.
#[async_trait]
pub trait CaptureStream: Send {
    /// Next encoded fragment, or `None` once the capture has finalized.
    async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>, CaptureError>;

    /// Ask the device to stop. Fragments still buffered keep arriving
    /// through [`CaptureStream::next_chunk`] until it returns `None`.
    fn request_stop(&mut self);

    /// MIME type of the produced fragments.
    fn mime(&self) -> &str;
}

type CaptureResult = Result<Option<AudioBlob>, CaptureError>;

/// Recording that has been asked to stop and is still finalizing.
#[derive(Debug)]
pub struct PendingRecording {
    rx: oneshot::Receiver<CaptureResult>,
}

impl PendingRecording {
    /// Wait for the final blob.
    ///
    /// `Ok(None)` if nothing was captured; an error if the device failed
    /// before the stop.
    pub async fn finish(self) -> Result<Option<AudioBlob>, CaptureError> {
        self.rx.await.unwrap_or(Ok(None))
    }
}

struct ActiveCapture {
    stop_tx: oneshot::Sender<()>,
    done_rx: oneshot::Receiver<CaptureResult>,
    ticker: JoinHandle<()>,
    reader: JoinHandle<()>,
    failed: Arc<AtomicBool>,
}

impl ActiveCapture {
    fn has_failed(&self) -> bool {
        self.failed.load(Ordering::SeqCst)
    }

    fn abort(self) {
        self.ticker.abort();
        self.reader.abort();
    }
}

/// Drives a single microphone capture at a time.
pub struct AudioCaptureController {
    backend: Arc<dyn CaptureBackend>,
    constraints: CaptureConstraints,
    events: Arc<dyn EventSink>,
    supported: bool,
    elapsed: Arc<AtomicU64>,
    active: Option<ActiveCapture>,
}

impl AudioCaptureController {
    /// Capability is probed once here and cached.
    pub fn new(
        backend: Arc<dyn CaptureBackend>,
        constraints: CaptureConstraints,
        events: Arc<dyn EventSink>,
    ) -> Self {
        let supported = backend.is_supported();
        debug!("audio capture capability (supported={supported})");
        Self {
            backend,
            constraints,
            events,
            supported,
            elapsed: Arc::new(AtomicU64::new(0)),
            active: None,
        }
    }

    pub fn is_supported(&self) -> bool {
        self.supported
    }

    /// True while a capture runs; a capture whose device failed does not count.
    pub fn is_recording(&self) -> bool {
        self.active
            .as_ref()
            .is_some_and(|active| !active.has_failed())
    }

    pub fn elapsed_seconds(&self) -> u64 {
        self.elapsed.load(Ordering::SeqCst)
    }

    /// Acquire the device and start recording.
    pub async fn start(&mut self) -> Result<(), CaptureError> {
        if !self.supported {
            return Err(CaptureError::Unsupported(
                "no capture device available".to_string(),
            ));
        }
        self.clear_failed();
        if self.active.is_some() {
            return Err(CaptureError::AlreadyRecording);
        }

        let stream = self.backend.open(&self.constraints).await?;
        self.elapsed.store(0, Ordering::SeqCst);

        let (stop_tx, stop_rx) = oneshot::channel();
        let (done_tx, done_rx) = oneshot::channel();
        let failed = Arc::new(AtomicBool::new(false));
        let ticker = spawn_ticker(Arc::clone(&self.elapsed), Arc::clone(&self.events));
        let reader = tokio::spawn(drain_stream(
            stream,
            stop_rx,
            done_tx,
            DrainReport {
                ticker: ticker.abort_handle(),
                failed: Arc::clone(&failed),
                events: Arc::clone(&self.events),
            },
        ));

        info!("recording started (sample_rate={})", self.constraints.sample_rate);
        self.active = Some(ActiveCapture {
            stop_tx,
            done_rx,
            ticker,
            reader,
            failed,
        });
        Ok(())
    }

    /// Drop a capture whose device failed; returns whether one was cleared.
    pub fn clear_failed(&mut self) -> bool {
        if !self.active.as_ref().is_some_and(ActiveCapture::has_failed) {
            return false;
        }
        if let Some(active) = self.active.take() {
            debug!("clearing failed capture");
            active.abort();
        }
        true
    }

    /// Stop recording; the returned handle resolves once the blob is final.
    ///
    /// Returns `None` when no capture is running, including one whose device
    /// already failed.
    pub fn request_stop(&mut self) -> Option<PendingRecording> {
        if self.clear_failed() {
            return None;
        }
        let active = self.active.take()?;
        active.ticker.abort();
        let _ = active.stop_tx.send(());
        info!(
            "recording stopped (elapsed_secs={})",
            self.elapsed.load(Ordering::SeqCst)
        );
        self.events.emit(ChatEvent::RecordingStopped);
        Some(PendingRecording {
            rx: active.done_rx,
        })
    }
}

impl Drop for AudioCaptureController {
    fn drop(&mut self) {
        if let Some(active) = self.active.take() {
            active.abort();
        }
    }
}

fn spawn_ticker(elapsed: Arc<AtomicU64>, events: Arc<dyn EventSink>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let period = Duration::from_secs(1);
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        loop {
            ticker.tick().await;
            let elapsed_secs = elapsed.fetch_add(1, Ordering::SeqCst) + 1;
            events.emit(ChatEvent::RecordingTick { elapsed_secs });
        }
    })
}

/// Where the reader reports the end of a capture.
struct DrainReport {
    ticker: AbortHandle,
    failed: Arc<AtomicBool>,
    events: Arc<dyn EventSink>,
}

/// Collect fragments until the stream ends, then publish the blob.
///
/// A stream that errors, or ends without any audio, before a stop was
/// requested counts as a device failure.
async fn drain_stream(
    mut stream: Box<dyn CaptureStream>,
    mut stop_rx: oneshot::Receiver<()>,
    done_tx: oneshot::Sender<CaptureResult>,
    report: DrainReport,
) {
    let mime = stream.mime().to_string();
    let mut chunks: Vec<Vec<u8>> = Vec::new();
    let mut stopping = false;
    let mut failure = None;

    loop {
        tokio::select! {
            _ = &mut stop_rx, if !stopping => {
                stopping = true;
                stream.request_stop();
            }
            chunk = stream.next_chunk() => match chunk {
                Ok(Some(chunk)) => {
                    if !chunk.is_empty() {
                        chunks.push(chunk);
                    }
                }
                Ok(None) => {
                    if !stopping && chunks.is_empty() {
                        failure = Some(CaptureError::Device(
                            "recorder ended without producing audio".to_string(),
                        ));
                    }
                    break;
                }
                Err(err) if stopping => {
                    warn!("capture stream failed while stopping (error={err})");
                    break;
                }
                Err(err) => {
                    failure = Some(err);
                    break;
                }
            },
        }
    }
    drop(stream);
    report.ticker.abort();

    if let Some(err) = failure {
        warn!("capture device failed (error={err})");
        report.failed.store(true, Ordering::SeqCst);
        report.events.emit(ChatEvent::RecordingFailed(err.to_string()));
        let _ = done_tx.send(Err(err));
        return;
    }

    let blob = assemble(chunks, mime);
    debug!(
        "capture finalized (bytes={})",
        blob.as_ref().map_or(0, |blob| blob.bytes.len())
    );
    let _ = done_tx.send(Ok(blob));
}

fn assemble(chunks: Vec<Vec<u8>>, mime: String) -> Option<AudioBlob> {
    if chunks.is_empty() {
        return None;
    }
    Some(AudioBlob::new(chunks.concat(), mime))
}
