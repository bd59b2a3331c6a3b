//! # lectern-core
//!
//! Streaming speech segmentation engine for live, speech-driven
//! presentation: continuously ingests microphone audio, detects utterances
//! with a VAD scorer + hysteresis gate, buffers them with lookback and
//! trailing padding under a fixed memory ceiling, and dispatches finished
//! segments to a transcription collaborator without ever blocking
//! ingestion.
//!
//! ## Architecture
//!
//! ```text
//! Microphone → AudioCapture → SPSC RingBuffer → Pipeline(spawn_blocking)
//!                                                    │
//!                                   FrameSplitter → ActivityGate
//!                                                    │
//!                                  LookbackRing / UtteranceBuffer
//!                                                    │
//!                                 SegmentDispatcher → crossbeam channel
//!                                                    │
//!                              transcription worker → broadcast events
//! ```
//!
//! The audio callback is lock-free. Scoring is strictly sequential on the
//! pipeline thread; transcription runs on its own worker so a slow model
//! never stalls capture.

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod audio;
pub mod buffering;
pub mod engine;
pub mod error;
pub mod ipc;
pub mod segment;
pub mod transcribe;
pub mod vad;

// Convenience re-exports for downstream crates
pub use engine::{EngineConfig, LecternEngine};
pub use error::LecternError;
pub use ipc::events::{
    EngineStatus, EngineStatusEvent, SegmentEvent, SegmentResult, SegmentTiming, UtteranceEvent,
    UtterancePhase,
};
pub use segment::{Segmenter, SegmenterConfig, SegmentTrigger, SpeechSegment};
pub use transcribe::{StubTranscriber, Transcriber, TranscriberHandle};
pub use vad::{EnergyScorer, SpeechScorer};

#[cfg(feature = "onnx")]
pub use vad::SileroScorer;
