//! Streaming speech segmentation.
//!
//! ## Stages (per incoming frame)
//!
//! ```text
//! 1. FrameSplitter: arbitrary-length frame → fixed analysis windows
//! 2. ActivityGate:  window → speech probability → hysteresis decision
//! 3. Idle path:     window → LookbackRing (bounded pre-roll)
//!    Recording path: window → UtteranceBuffer (fixed arena)
//! 4. Segmenter:     silence-run / capacity bookkeeping → SpeechSegment
//! ```
//!
//! Everything here is synchronous and allocation-bounded; the engine drives
//! it from a single pipeline thread and hands finished segments to the
//! transcription worker.

pub mod buffer;
pub mod gate;
pub mod lookback;
pub mod segmenter;
pub mod splitter;

pub use buffer::UtteranceBuffer;
pub use gate::{ActivityGate, GateReport};
pub use lookback::LookbackRing;
pub use segmenter::{Segmenter, SegmenterEvent, SegmentTrigger, SpeechSegment};
pub use splitter::FrameSplitter;

/// Tunables for the segmenter. Defaults carry the reference values used in
/// production; every field is observable audio-domain math, no hidden
/// constants elsewhere.
#[derive(Debug, Clone)]
pub struct SegmenterConfig {
    /// Engine sample rate in Hz. Frames must already be at this rate.
    /// Default: 16000.
    pub sample_rate: u32,
    /// Analysis window length in samples (512 at 16 kHz ≈ 32 ms).
    pub window_size: usize,
    /// Probability above which speech *starts* (entry threshold).
    /// Default: 0.3.
    pub speech_threshold: f32,
    /// Probability above which speech *continues* once engaged (exit
    /// threshold). Lower than `speech_threshold` so brief dips do not
    /// flicker the gate. Default: 0.1.
    pub exit_threshold: f32,
    /// Trailing non-speech run that ends an utterance. Default: 400 ms.
    pub min_silence_ms: u32,
    /// Utterances with less speech than this are discarded, not
    /// dispatched. Default: 250 ms.
    pub min_speech_ms: u32,
    /// Context kept before detected onset and after detected end.
    /// Default: 80 ms.
    pub speech_pad_ms: u32,
    /// Hard ceiling on one utterance; reaching it forces a dispatch and
    /// carries the overflow into the next cycle. Default: 30 s.
    pub max_buffer_secs: u32,
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16_000,
            window_size: 512,
            speech_threshold: 0.3,
            exit_threshold: 0.1,
            min_silence_ms: 400,
            min_speech_ms: 250,
            speech_pad_ms: 80,
            max_buffer_secs: 30,
        }
    }
}

impl SegmenterConfig {
    fn samples_for_ms(&self, ms: u32) -> usize {
        (self.sample_rate as usize * ms as usize) / 1000
    }

    /// Silence run (samples) that completes an utterance.
    pub fn min_silence_samples(&self) -> usize {
        self.samples_for_ms(self.min_silence_ms)
    }

    /// Minimum speech content (samples) for an utterance to be dispatched.
    pub fn min_speech_samples(&self) -> usize {
        self.samples_for_ms(self.min_speech_ms)
    }

    /// Onset/trailing context padding in samples.
    pub fn pad_samples(&self) -> usize {
        self.samples_for_ms(self.speech_pad_ms)
    }

    /// Fixed utterance arena capacity in samples.
    pub fn buffer_capacity(&self) -> usize {
        self.sample_rate as usize * self.max_buffer_secs as usize
    }

    /// Lookback ring capacity: enough whole windows to cover `pad_samples`.
    pub fn lookback_windows(&self) -> usize {
        let pad = self.pad_samples();
        if pad == 0 {
            0
        } else {
            (pad + self.window_size - 1) / self.window_size
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_derives_reference_sample_counts() {
        let cfg = SegmenterConfig::default();
        assert_eq!(cfg.min_silence_samples(), 6_400);
        assert_eq!(cfg.min_speech_samples(), 4_000);
        assert_eq!(cfg.pad_samples(), 1_280);
        assert_eq!(cfg.buffer_capacity(), 480_000);
        // 1280 / 512 rounds up to 3 windows of pre-roll.
        assert_eq!(cfg.lookback_windows(), 3);
    }
}
