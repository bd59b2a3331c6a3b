//! Utterance state machine: Idle → Recording → Dispatching → Idle.
//!
//! ## Per-window flow
//!
//! ```text
//! window ── ActivityGate ──► speech? ──┬─ idle + no  ──► LookbackRing
//!                                      ├─ idle + yes ──► onset: copy lookback,
//!                                      │                 append, RecordingStarted
//!                                      └─ recording  ──► append (speech or not),
//!                                                        track silence run
//! silence run ≥ min_silence  ──► dispatch (or discard if too little speech)
//! arena full                 ──► forced dispatch, overflow carried forward
//! ```
//!
//! Positions are tracked on a session sample clock (`stream_pos`); the
//! engine converts them to wall-clock timestamps at dispatch.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{
    ActivityGate, FrameSplitter, LookbackRing, SegmenterConfig, UtteranceBuffer,
};
use crate::error::Result;
use crate::vad::SpeechScorer;

/// Why a segment left the buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SegmentTrigger {
    /// A qualifying silence run ended the utterance.
    Silence,
    /// The arena hit capacity; dispatch was forced mid-speech.
    Overflow,
    /// The session stopped with speech still buffered.
    Flush,
}

/// One dispatched utterance: lookback context + speech + trailing padding,
/// contiguous, positioned on the session sample clock.
#[derive(Debug, Clone)]
pub struct SpeechSegment {
    pub samples: Vec<f32>,
    /// Stream position of `samples[0]`.
    pub start_sample: u64,
    /// Stream position one past the last sample.
    pub end_sample: u64,
    pub trigger: SegmentTrigger,
}

impl SpeechSegment {
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Observable outcomes of feeding audio, in occurrence order.
#[derive(Debug)]
pub enum SegmenterEvent {
    RecordingStarted { at_sample: u64 },
    RecordingEnded { at_sample: u64 },
    /// An utterance ended by silence but carried too little speech to be
    /// worth transcribing; nothing was dispatched.
    UtteranceDiscarded { speech_samples: usize },
    Segment(SpeechSegment),
}

pub struct Segmenter {
    config: SegmenterConfig,
    splitter: FrameSplitter,
    gate: ActivityGate,
    lookback: LookbackRing,
    buffer: UtteranceBuffer,
    recording: bool,
    /// Trailing non-speech samples while recording.
    silence_run: usize,
    /// Lookback samples copied to the arena front at onset.
    lookback_prefix: usize,
    /// Stream position of arena index 0.
    buffer_start_sample: u64,
    /// Samples consumed from the splitter so far this session.
    stream_pos: u64,
}

impl Segmenter {
    pub fn new(config: SegmenterConfig, scorer: Box<dyn SpeechScorer>) -> Self {
        let splitter = FrameSplitter::new(config.window_size);
        let gate = ActivityGate::new(scorer, config.speech_threshold, config.exit_threshold);
        let lookback = LookbackRing::new(config.lookback_windows());
        let buffer = UtteranceBuffer::new(config.buffer_capacity());
        Self {
            config,
            splitter,
            gate,
            lookback,
            buffer,
            recording: false,
            silence_run: 0,
            lookback_prefix: 0,
            buffer_start_sample: 0,
            stream_pos: 0,
        }
    }

    pub fn config(&self) -> &SegmenterConfig {
        &self.config
    }

    pub fn is_recording(&self) -> bool {
        self.recording
    }

    /// Samples consumed (window-granular) since construction or `reset`.
    pub fn stream_pos(&self) -> u64 {
        self.stream_pos
    }

    /// Feed one capture frame of any length. Outcomes are appended to
    /// `events` in the order they occurred.
    ///
    /// # Errors
    /// A scorer failure discards the in-flight utterance (a
    /// `RecordingEnded` is still appended so started/ended stay paired),
    /// zeroes the scorer state, and propagates. Events gathered before the
    /// failure remain in `events`; ingestion may resume with the next call.
    pub fn push_frame(&mut self, frame: &[f32], events: &mut Vec<SegmenterEvent>) -> Result<()> {
        self.splitter.absorb(frame);
        while let Some(window) = self.splitter.pop_window() {
            if let Err(e) = self.process_window(&window, events) {
                warn!(error = %e, "scoring failed — discarding in-flight utterance");
                self.abort_utterance(events);
                return Err(e);
            }
        }
        Ok(())
    }

    /// End the session: dispatch buffered speech that qualifies, otherwise
    /// drop it. Returns the flushed segment, if any. Leaves the segmenter
    /// idle either way; the caller emits its own `recording_ended`
    /// notification (check `is_recording` first).
    pub fn flush(&mut self) -> Option<SpeechSegment> {
        if !self.recording {
            self.reset_cycle();
            return None;
        }

        let write_pos = self.buffer.write_pos();
        let silence = self.silence_run.min(write_pos);
        let speech_end = write_pos - silence;
        let speech_len = speech_end.saturating_sub(self.lookback_prefix);

        let segment = if speech_len >= self.config.min_speech_samples() {
            let end = (speech_end + self.config.pad_samples()).min(write_pos);
            Some(SpeechSegment {
                samples: self.buffer.slice_to(end).to_vec(),
                start_sample: self.buffer_start_sample,
                end_sample: self.buffer_start_sample + end as u64,
                trigger: SegmentTrigger::Flush,
            })
        } else {
            debug!(speech_len, "flush dropped under-length utterance");
            None
        };

        self.reset_cycle();
        segment
    }

    /// Return to a state indistinguishable from a freshly constructed
    /// segmenter: buffers empty, scorer state zeroed, sample clock at 0.
    /// Idempotent — calling it while idle changes nothing observable.
    pub fn reset(&mut self) {
        self.splitter.clear();
        self.gate.reset();
        self.reset_cycle();
        self.stream_pos = 0;
        self.buffer_start_sample = 0;
    }

    // ── Internal ────────────────────────────────────────────────────────

    fn process_window(&mut self, window: &[f32], events: &mut Vec<SegmenterEvent>) -> Result<()> {
        let pos = self.stream_pos;
        self.stream_pos += window.len() as u64;

        let report = self.gate.assess(window, self.recording)?;

        if !self.recording {
            if report.active {
                self.begin_utterance(window, pos, events);
            } else {
                self.lookback.push(window.to_vec());
            }
            return Ok(());
        }

        if report.active {
            self.silence_run = 0;
        } else {
            self.silence_run += window.len();
        }
        self.append_recording(window, pos, events);

        if self.recording && self.silence_run >= self.config.min_silence_samples() {
            self.finish_by_silence(events);
        }
        Ok(())
    }

    fn begin_utterance(&mut self, window: &[f32], pos: u64, events: &mut Vec<SegmenterEvent>) {
        debug_assert!(self.buffer.is_empty());

        self.lookback_prefix = self.lookback.len_samples();
        self.buffer_start_sample = pos - self.lookback_prefix as u64;
        self.lookback.copy_into(&mut self.buffer);
        self.lookback.clear();

        self.recording = true;
        self.silence_run = 0;
        events.push(SegmenterEvent::RecordingStarted { at_sample: pos });
        debug!(at_sample = pos, lookback = self.lookback_prefix, "utterance onset");

        self.append_recording(window, pos, events);
    }

    /// Append a window to the arena; a partial fit forces an overflow
    /// dispatch, with the excess carried into the next cycle.
    fn append_recording(&mut self, window: &[f32], pos: u64, events: &mut Vec<SegmenterEvent>) {
        let written = self.buffer.append(window);
        if written == window.len() {
            return;
        }

        let end_sample = pos + written as u64;
        debug!(
            capacity = self.buffer.capacity(),
            carry = window.len() - written,
            "arena full — forcing dispatch"
        );
        events.push(SegmenterEvent::Segment(SpeechSegment {
            samples: self.buffer.filled().to_vec(),
            start_sample: self.buffer_start_sample,
            end_sample,
            trigger: SegmentTrigger::Overflow,
        }));

        // Seed the next cycle with the carry. Recording stays engaged:
        // speech is continuous across the split, so no started/ended events
        // fire and the gate keeps using the exit threshold.
        self.buffer.reset();
        self.buffer.append(&window[written..]);
        self.buffer_start_sample = end_sample;
        self.lookback_prefix = 0;
    }

    fn finish_by_silence(&mut self, events: &mut Vec<SegmenterEvent>) {
        let write_pos = self.buffer.write_pos();
        let silence = self.silence_run.min(write_pos);
        let speech_end = write_pos - silence;
        let speech_len = speech_end.saturating_sub(self.lookback_prefix);

        events.push(SegmenterEvent::RecordingEnded {
            at_sample: self.stream_pos,
        });

        if speech_len < self.config.min_speech_samples() {
            debug!(speech_len, "utterance under minimum speech — discarded");
            events.push(SegmenterEvent::UtteranceDiscarded {
                speech_samples: speech_len,
            });
        } else {
            let end = (speech_end + self.config.pad_samples()).min(write_pos);
            events.push(SegmenterEvent::Segment(SpeechSegment {
                samples: self.buffer.slice_to(end).to_vec(),
                start_sample: self.buffer_start_sample,
                end_sample: self.buffer_start_sample + end as u64,
                trigger: SegmentTrigger::Silence,
            }));
        }

        self.reset_cycle();
    }

    /// Discard the in-flight utterance after a scoring failure. Un-analyzed
    /// samples held by the splitter are kept — they are future audio, not
    /// part of the lost utterance — so ingestion resumes seamlessly.
    fn abort_utterance(&mut self, events: &mut Vec<SegmenterEvent>) {
        if self.recording {
            events.push(SegmenterEvent::RecordingEnded {
                at_sample: self.stream_pos,
            });
        }
        self.gate.reset();
        self.reset_cycle();
    }

    fn reset_cycle(&mut self) {
        self.buffer.reset();
        self.lookback.clear();
        self.recording = false;
        self.silence_run = 0;
        self.lookback_prefix = 0;
    }
}
