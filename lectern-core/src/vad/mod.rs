//! Voice-activity scoring abstraction.
//!
//! `SpeechScorer` is the seam between the segmenter and any concrete VAD
//! model: one fixed-size analysis window in, one speech probability out.
//! Recurrent model state (e.g. Silero's LSTM/GRU tensors) lives inside the
//! implementor and is zeroed by `reset`, so a fresh session never inherits
//! context from a previous one. Swap in `EnergyScorer` (default),
//! `SileroScorer` (`onnx` feature), or a scripted scorer in tests without
//! touching the segmenter.

pub mod energy;

#[cfg(feature = "onnx")]
pub mod silero;

#[cfg(feature = "onnx")]
pub use silero::SileroScorer;

pub use energy::EnergyScorer;

use crate::error::Result;

/// Contract for VAD scoring backends.
///
/// Calls must be strictly sequential: the state after window *n* is an input
/// to window *n+1*. The pipeline guarantees this by scoring on a single
/// thread.
pub trait SpeechScorer: Send + 'static {
    /// Score one analysis window, returning a speech probability in [0, 1]
    /// and advancing any internal recurrent state.
    ///
    /// # Errors
    /// Implementations backed by inference runtimes may fail per-window;
    /// the segmenter treats this as fatal to the current utterance only.
    fn score(&mut self, window: &[f32]) -> Result<f32>;

    /// Zero all recurrent state (fresh-session equivalent).
    fn reset(&mut self);
}
