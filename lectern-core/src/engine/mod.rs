//! `LecternEngine` — top-level lifecycle controller.
//!
//! ## Lifecycle
//!
//! ```text
//! LecternEngine::new()
//!     └─► warm_up()          → backend loaded, status = Loading → Ready
//!         └─► start()        → capture open, pipeline spawned, status = Listening
//!             └─► stop()     → running=false, stream dropped, status = Stopped
//! ```
//!
//! `start()`/`stop()` return an error rather than panicking when called in
//! the wrong state.
//!
//! ## Threading
//!
//! `cpal::Stream` is `!Send` on Windows/macOS, so `AudioCapture` is created
//! *inside* the `spawn_blocking` closure and never crosses a thread
//! boundary. A sync oneshot channel propagates open-device errors back to
//! the `start()` caller.

pub mod pipeline;

use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc,
};

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::info;

use crate::{
    audio::AudioCapture,
    buffering::{create_audio_ring, AudioConsumer, AudioProducer},
    error::{LecternError, Result},
    ipc::events::{EngineStatus, EngineStatusEvent, SegmentEvent, UtteranceEvent},
    segment::SegmenterConfig,
    transcribe::TranscriberHandle,
    vad::{EnergyScorer, SpeechScorer},
};

#[cfg(feature = "onnx")]
use crate::vad::SileroScorer;

/// Broadcast channel capacity: events buffered for slow subscribers.
const BROADCAST_CAP: usize = 256;

/// Configuration for `LecternEngine`.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Segmentation tunables (rate, window, thresholds, durations).
    pub segmenter: SegmenterConfig,
    /// RMS level the fallback energy scorer maps to probability 1.0.
    /// Only used when no neural scorer is available. Default: 0.05.
    pub energy_reference_rms: f32,
    /// Override path for the Silero VAD ONNX model.
    /// `None` falls back to `SileroScorer::default_model_path()`.
    #[cfg(feature = "onnx")]
    pub silero_model_path: Option<std::path::PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            segmenter: SegmenterConfig::default(),
            energy_reference_rms: 0.05,
            #[cfg(feature = "onnx")]
            silero_model_path: None,
        }
    }
}

/// The top-level engine handle.
///
/// `LecternEngine` is `Send + Sync` — all fields use interior mutability.
/// Wrap in `Arc<LecternEngine>` to share between app state and
/// event-forwarding tasks. Each instance owns its buffers and scorer state
/// exclusively; concurrent sessions need separate instances.
pub struct LecternEngine {
    config: EngineConfig,
    transcriber: TranscriberHandle,
    /// `true` while capture + pipeline are active.
    running: Arc<AtomicBool>,
    /// Canonical status (written via Mutex, read from callers).
    status: Arc<Mutex<EngineStatus>>,
    segment_tx: broadcast::Sender<SegmentEvent>,
    utterance_tx: broadcast::Sender<UtteranceEvent>,
    status_tx: broadcast::Sender<EngineStatusEvent>,
    /// Monotonically increasing dispatch sequence counter.
    seq: Arc<AtomicU64>,
    diagnostics: Arc<pipeline::PipelineDiagnostics>,
}

impl LecternEngine {
    /// Create a new engine. Does not start capturing — call `warm_up()`
    /// then `start()`.
    pub fn new(config: EngineConfig, transcriber: TranscriberHandle) -> Self {
        let (segment_tx, _) = broadcast::channel(BROADCAST_CAP);
        let (utterance_tx, _) = broadcast::channel(BROADCAST_CAP);
        let (status_tx, _) = broadcast::channel(BROADCAST_CAP);

        Self {
            config,
            transcriber,
            running: Arc::new(AtomicBool::new(false)),
            status: Arc::new(Mutex::new(EngineStatus::Loading)),
            segment_tx,
            utterance_tx,
            status_tx,
            seq: Arc::new(AtomicU64::new(0)),
            diagnostics: Arc::new(pipeline::PipelineDiagnostics::default()),
        }
    }

    /// Warm up the transcription backend (load weights, dummy inference).
    ///
    /// Call once at application startup, before `start()`.
    pub fn warm_up(&self) -> Result<()> {
        self.set_status(EngineStatus::Loading, None);
        info!("warming up transcription backend");
        if let Err(e) = self.transcriber.0.lock().warm_up() {
            self.set_status(EngineStatus::Error, Some(e.to_string()));
            return Err(e);
        }
        self.set_status(EngineStatus::Ready, None);
        info!("transcription backend ready");
        Ok(())
    }

    /// Start audio capture and the pipeline with the default input device.
    ///
    /// Blocks until the audio device is confirmed open (or fails), then
    /// returns; the pipeline keeps running on a background blocking thread.
    pub fn start(&self) -> Result<()> {
        self.start_with_device(None)
    }

    /// Start the engine using a preferred input device name.
    ///
    /// # Errors
    /// - `LecternError::AlreadyRunning` if already started.
    /// - `LecternError::NoDefaultInputDevice` / `LecternError::AudioStream`
    ///   on device errors.
    pub fn start_with_device(&self, preferred_input_device: Option<String>) -> Result<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(LecternError::AlreadyRunning);
        }

        self.diagnostics.reset();
        self.transcriber.0.lock().reset();
        self.set_status(EngineStatus::Listening, None);

        let (producer, consumer) = create_audio_ring();
        // Sync oneshot: the session thread confirms device open (with the
        // actual capture rate) or reports the failure back to start().
        let (open_tx, open_rx) = std::sync::mpsc::channel::<Result<u32>>();

        let session = CaptureSession {
            config: self.config.clone(),
            transcriber: self.transcriber.clone(),
            running: Arc::clone(&self.running),
            segment_tx: self.segment_tx.clone(),
            utterance_tx: self.utterance_tx.clone(),
            status_tx: self.status_tx.clone(),
            seq: Arc::clone(&self.seq),
            diagnostics: Arc::clone(&self.diagnostics),
        };

        tokio::task::spawn_blocking(move || {
            session.run(producer, consumer, preferred_input_device, open_tx)
        });

        match open_rx.recv() {
            Ok(Ok(_rate)) => {
                info!("engine started — listening");
                Ok(())
            }
            Ok(Err(e)) => Err(self.fail_start(e)),
            Err(_) => Err(self.fail_start(LecternError::Other(anyhow::anyhow!(
                "capture session exited before confirming device open"
            )))),
        }
    }

    /// Stop capture and the pipeline. Buffered speech that qualifies is
    /// flushed as a final segment before the pipeline exits.
    ///
    /// # Errors
    /// - `LecternError::NotRunning` if not currently running.
    pub fn stop(&self) -> Result<()> {
        if !self.running.load(Ordering::SeqCst) {
            return Err(LecternError::NotRunning);
        }

        self.running.store(false, Ordering::SeqCst);
        self.set_status(EngineStatus::Stopped, None);
        info!("engine stop requested");
        Ok(())
    }

    /// Current engine status (snapshot).
    pub fn status(&self) -> EngineStatus {
        *self.status.lock()
    }

    /// Subscribe to dispatched-segment outcomes (`segment_ready` / errors).
    pub fn subscribe_segments(&self) -> broadcast::Receiver<SegmentEvent> {
        self.segment_tx.subscribe()
    }

    /// Subscribe to recording started/ended notifications.
    pub fn subscribe_utterances(&self) -> broadcast::Receiver<UtteranceEvent> {
        self.utterance_tx.subscribe()
    }

    /// Subscribe to lifecycle status events.
    pub fn subscribe_status(&self) -> broadcast::Receiver<EngineStatusEvent> {
        self.status_tx.subscribe()
    }

    /// Snapshot of pipeline counters for observability.
    pub fn diagnostics_snapshot(&self) -> pipeline::DiagnosticsSnapshot {
        self.diagnostics.snapshot()
    }

    // ── Internal helpers ────────────────────────────────────────────────

    fn set_status(&self, new_status: EngineStatus, detail: Option<String>) {
        *self.status.lock() = new_status;
        let _ = self.status_tx.send(EngineStatusEvent {
            status: new_status,
            detail,
        });
    }

    fn fail_start(&self, e: LecternError) -> LecternError {
        self.running.store(false, Ordering::SeqCst);
        self.set_status(EngineStatus::Error, Some(e.to_string()));
        e
    }
}

/// Everything a capture session thread takes from the engine handle.
struct CaptureSession {
    config: EngineConfig,
    transcriber: TranscriberHandle,
    running: Arc<AtomicBool>,
    segment_tx: broadcast::Sender<SegmentEvent>,
    utterance_tx: broadcast::Sender<UtteranceEvent>,
    status_tx: broadcast::Sender<EngineStatusEvent>,
    seq: Arc<AtomicU64>,
    diagnostics: Arc<pipeline::PipelineDiagnostics>,
}

impl CaptureSession {
    /// Body of the `spawn_blocking` task. The capture stream is opened and
    /// dropped on this thread — `cpal::Stream` is `!Send`.
    fn run(
        self,
        producer: AudioProducer,
        consumer: AudioConsumer,
        preferred_device: Option<String>,
        open_tx: std::sync::mpsc::Sender<Result<u32>>,
    ) {
        let capture = match AudioCapture::open_with_preference(
            producer,
            Arc::clone(&self.running),
            preferred_device.as_deref(),
        ) {
            Ok(capture) => capture,
            Err(e) => {
                self.running.store(false, Ordering::SeqCst);
                let _ = open_tx.send(Err(e));
                return;
            }
        };

        let capture_sample_rate = capture.sample_rate;
        let _ = open_tx.send(Ok(capture_sample_rate));

        let scorer = build_scorer(&self.config);
        pipeline::run(pipeline::PipelineContext {
            config: self.config,
            scorer,
            transcriber: self.transcriber,
            consumer,
            running: self.running,
            segment_tx: self.segment_tx,
            utterance_tx: self.utterance_tx,
            status_tx: self.status_tx,
            seq: self.seq,
            capture_sample_rate,
            diagnostics: self.diagnostics,
        });

        // The stream drops here, releasing the audio device on this thread.
        drop(capture);
    }
}

/// Pick the best available scoring collaborator for this build/config.
fn build_scorer(config: &EngineConfig) -> Box<dyn SpeechScorer> {
    #[cfg(feature = "onnx")]
    {
        let path = config
            .silero_model_path
            .clone()
            .unwrap_or_else(SileroScorer::default_model_path);
        match SileroScorer::new(&path) {
            Ok(s) => {
                info!(path = %path.display(), "using Silero VAD scorer");
                return Box::new(s);
            }
            Err(e) => {
                tracing::warn!("Silero VAD load failed ({e}), falling back to energy scorer");
            }
        }
    }
    Box::new(EnergyScorer::new(config.energy_reference_rms))
}
