//! Transcription collaborator abstraction.
//!
//! The `Transcriber` trait decouples the engine from any concrete
//! recognition backend (stub echo, Whisper, a network service, …). The
//! engine never calls it inline: segments travel over a channel to a worker
//! thread (`worker`), so ingestion is never blocked by inference latency.
//!
//! `&mut self` on `transcribe` expresses that decoders are stateful; all
//! mutation is serialised through `TranscriberHandle`'s
//! `parking_lot::Mutex`.

pub mod stub;
pub mod worker;

pub use stub::StubTranscriber;

use std::sync::Arc;

use parking_lot::Mutex;

use crate::buffering::frame::AudioFrame;
use crate::error::Result;
use crate::ipc::events::SegmentTiming;

/// Contract for speech recognition backends.
pub trait Transcriber: Send + 'static {
    /// One-time warm-up: load weights, run a dummy inference. Called once
    /// at engine startup, before any segment is dispatched.
    ///
    /// # Errors
    /// Returns an error if model assets are missing or corrupt.
    fn warm_up(&mut self) -> Result<()>;

    /// Transcribe one dispatched segment.
    ///
    /// `timing` is informational (some backends condition on duration);
    /// failures are reported to the caller and never affect the
    /// segmenter's buffers.
    fn transcribe(&mut self, audio: &AudioFrame, timing: &SegmentTiming) -> Result<String>;

    /// Reset any internal decoder state between sessions.
    fn reset(&mut self);
}

/// Thread-safe reference-counted handle to any `Transcriber` implementor.
///
/// `parking_lot::Mutex` rather than `std::sync::Mutex`: non-poisoning on
/// panic, and the worker thread is the only regular lock holder.
#[derive(Clone)]
pub struct TranscriberHandle(pub Arc<Mutex<dyn Transcriber>>);

impl TranscriberHandle {
    pub fn new<T: Transcriber>(transcriber: T) -> Self {
        Self(Arc::new(Mutex::new(transcriber)))
    }
}

impl std::fmt::Debug for TranscriberHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TranscriberHandle").finish_non_exhaustive()
    }
}
