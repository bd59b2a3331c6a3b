//! `StubTranscriber` — placeholder backend that echoes segment metadata.
//!
//! Lets the full capture → segment → dispatch → event path run end-to-end
//! before a real recognition model is wired in, and serves as the default
//! backend in tests and the offline CLI.

use tracing::debug;

use super::Transcriber;
use crate::buffering::frame::AudioFrame;
use crate::error::Result;
use crate::ipc::events::SegmentTiming;

pub struct StubTranscriber {
    segment_count: u64,
}

impl StubTranscriber {
    pub fn new() -> Self {
        Self { segment_count: 0 }
    }
}

impl Default for StubTranscriber {
    fn default() -> Self {
        Self::new()
    }
}

impl Transcriber for StubTranscriber {
    fn warm_up(&mut self) -> Result<()> {
        debug!("StubTranscriber::warm_up — no-op");
        Ok(())
    }

    fn transcribe(&mut self, audio: &AudioFrame, timing: &SegmentTiming) -> Result<String> {
        self.segment_count += 1;
        Ok(format!(
            "[segment {}: {} samples, {:.2} s]",
            self.segment_count,
            audio.samples.len(),
            timing.duration_secs
        ))
    }

    fn reset(&mut self) {
        debug!("StubTranscriber::reset");
    }
}
