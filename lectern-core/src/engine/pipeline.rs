//! Blocking pipeline loop.
//!
//! ## Pipeline stages (per iteration)
//!
//! ```text
//! 1. Drain ring buffer → &[f32] (one chunk per iteration)
//! 2. Resample to the engine rate (passthrough when rates match)
//! 3. Segmenter: window → gate → lookback/arena → SpeechSegment
//! 4. SegmentDispatcher: stamp wall-clock timing, hand the job to the
//!    transcription worker over an unbounded channel (fire-and-forget)
//! 5. Broadcast utterance / status events as they occur
//! ```
//!
//! The loop runs in `spawn_blocking`, keeping the async executor free for
//! I/O. Scoring happens only here, so `SpeechScorer` state advances
//! strictly sequentially. Transcription latency never stalls ingestion:
//! the worker owns the collaborator, this thread only queues jobs.

use std::sync::{
    atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
    Arc,
};

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tracing::{debug, error, info};

use crate::{
    audio::resample::RateConverter,
    buffering::{frame::AudioFrame, AudioConsumer, Consumer},
    engine::EngineConfig,
    ipc::events::{
        EngineStatus, EngineStatusEvent, SegmentEvent, SegmentTiming, UtteranceEvent,
        UtterancePhase,
    },
    segment::{Segmenter, SegmenterEvent, SpeechSegment},
    transcribe::{
        worker::{self, DispatchJob},
        TranscriberHandle,
    },
    vad::SpeechScorer,
};

#[derive(Default)]
pub struct PipelineDiagnostics {
    pub frames_in: AtomicUsize,
    pub frames_resampled: AtomicUsize,
    pub utterances_started: AtomicUsize,
    pub segments_dispatched: AtomicUsize,
    pub segments_discarded: AtomicUsize,
    pub scorer_errors: AtomicUsize,
    /// Shared with the transcription worker thread.
    pub transcription_errors: Arc<AtomicUsize>,
}

impl PipelineDiagnostics {
    pub fn reset(&self) {
        self.frames_in.store(0, Ordering::Relaxed);
        self.frames_resampled.store(0, Ordering::Relaxed);
        self.utterances_started.store(0, Ordering::Relaxed);
        self.segments_dispatched.store(0, Ordering::Relaxed);
        self.segments_discarded.store(0, Ordering::Relaxed);
        self.scorer_errors.store(0, Ordering::Relaxed);
        self.transcription_errors.store(0, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> DiagnosticsSnapshot {
        DiagnosticsSnapshot {
            frames_in: self.frames_in.load(Ordering::Relaxed),
            frames_resampled: self.frames_resampled.load(Ordering::Relaxed),
            utterances_started: self.utterances_started.load(Ordering::Relaxed),
            segments_dispatched: self.segments_dispatched.load(Ordering::Relaxed),
            segments_discarded: self.segments_discarded.load(Ordering::Relaxed),
            scorer_errors: self.scorer_errors.load(Ordering::Relaxed),
            transcription_errors: self.transcription_errors.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DiagnosticsSnapshot {
    pub frames_in: usize,
    pub frames_resampled: usize,
    pub utterances_started: usize,
    pub segments_dispatched: usize,
    pub segments_discarded: usize,
    pub scorer_errors: usize,
    pub transcription_errors: usize,
}

/// All context the pipeline needs, passed as one struct so the closure
/// stays tidy.
pub struct PipelineContext {
    pub config: EngineConfig,
    pub scorer: Box<dyn SpeechScorer>,
    pub transcriber: TranscriberHandle,
    pub consumer: AudioConsumer,
    pub running: Arc<AtomicBool>,
    pub segment_tx: broadcast::Sender<SegmentEvent>,
    pub utterance_tx: broadcast::Sender<UtteranceEvent>,
    pub status_tx: broadcast::Sender<EngineStatusEvent>,
    pub seq: Arc<AtomicU64>,
    pub capture_sample_rate: u32,
    pub diagnostics: Arc<PipelineDiagnostics>,
}

/// Chunk size drained from the ring buffer per iteration.
/// 20 ms at 48 kHz; a reasonable stride for any capture rate.
const DRAIN_CHUNK: usize = 960;

/// Sleep when the ring is empty (avoids busy-waiting a core).
const SLEEP_EMPTY_MS: u64 = 5;

/// Assembles dispatch jobs from segmenter outcomes: stamps wall-clock
/// timing off the session epoch + sample clock, assigns sequence numbers,
/// and hands jobs to the worker without blocking.
struct SegmentDispatcher {
    engine_rate: u32,
    epoch: DateTime<Utc>,
    seq: Arc<AtomicU64>,
    utterance_seq: u64,
    job_tx: crossbeam_channel::Sender<DispatchJob>,
    utterance_tx: broadcast::Sender<UtteranceEvent>,
    status_tx: broadcast::Sender<EngineStatusEvent>,
    diagnostics: Arc<PipelineDiagnostics>,
}

impl SegmentDispatcher {
    fn handle(&mut self, events: &mut Vec<SegmenterEvent>) {
        for event in events.drain(..) {
            match event {
                SegmenterEvent::RecordingStarted { at_sample } => {
                    self.diagnostics
                        .utterances_started
                        .fetch_add(1, Ordering::Relaxed);
                    debug!(at_sample, "recording started");
                    self.send_utterance(UtterancePhase::RecordingStarted);
                }
                SegmenterEvent::RecordingEnded { at_sample } => {
                    debug!(at_sample, "recording ended");
                    self.send_utterance(UtterancePhase::RecordingEnded);
                }
                SegmenterEvent::UtteranceDiscarded { speech_samples } => {
                    self.diagnostics
                        .segments_discarded
                        .fetch_add(1, Ordering::Relaxed);
                    debug!(speech_samples, "utterance below minimum speech — discarded");
                }
                SegmenterEvent::Segment(segment) => self.dispatch(segment),
            }
        }
    }

    fn send_utterance(&mut self, phase: UtterancePhase) {
        let _ = self.utterance_tx.send(UtteranceEvent {
            seq: self.utterance_seq,
            phase,
        });
        self.utterance_seq = self.utterance_seq.saturating_add(1);
    }

    fn dispatch(&mut self, segment: SpeechSegment) {
        let timing = self.timing_for(&segment);
        let job = DispatchJob {
            seq: self.seq.fetch_add(1, Ordering::Relaxed),
            audio: AudioFrame::new(segment.samples, self.engine_rate),
            timing,
            trigger: segment.trigger,
        };

        self.diagnostics
            .segments_dispatched
            .fetch_add(1, Ordering::Relaxed);
        debug!(
            seq = job.seq,
            samples = job.audio.samples.len(),
            trigger = ?job.trigger,
            duration_secs = timing.duration_secs,
            "segment dispatched"
        );

        // Unbounded channel: a send only fails if the worker is gone, and
        // a segment must never vanish without the caller hearing about it.
        if self.job_tx.send(job).is_err() {
            error!("transcription worker unavailable — segment not delivered");
            let _ = self.status_tx.send(EngineStatusEvent {
                status: EngineStatus::Error,
                detail: Some("transcription worker unavailable".into()),
            });
        }
    }

    fn timing_for(&self, segment: &SpeechSegment) -> SegmentTiming {
        let micros = |samples: u64| {
            chrono::Duration::microseconds((samples as i64 * 1_000_000) / self.engine_rate as i64)
        };
        SegmentTiming {
            start: self.epoch + micros(segment.start_sample),
            end: self.epoch + micros(segment.end_sample),
            duration_secs: (segment.end_sample - segment.start_sample) as f64
                / self.engine_rate as f64,
        }
    }
}

/// Run the blocking pipeline until `ctx.running` becomes false.
pub fn run(ctx: PipelineContext) {
    info!("pipeline started");

    let PipelineContext {
        config,
        scorer,
        transcriber,
        mut consumer,
        running,
        segment_tx,
        utterance_tx,
        status_tx,
        seq,
        capture_sample_rate,
        diagnostics,
    } = ctx;

    let engine_rate = config.segmenter.sample_rate;
    let mut resampler = match RateConverter::new(capture_sample_rate, engine_rate, DRAIN_CHUNK) {
        Ok(r) => r,
        Err(e) => {
            error!("failed to create resampler: {e}");
            return;
        }
    };
    if !resampler.is_passthrough() {
        info!(
            from = capture_sample_rate,
            to = engine_rate,
            "resampling enabled"
        );
    }

    let mut segmenter = Segmenter::new(config.segmenter.clone(), scorer);

    let (job_tx, job_rx) = crossbeam_channel::unbounded::<DispatchJob>();
    let worker_handle = worker::spawn(
        job_rx,
        transcriber,
        segment_tx.clone(),
        Arc::clone(&diagnostics.transcription_errors),
    );

    let mut dispatcher = SegmentDispatcher {
        engine_rate,
        epoch: Utc::now(),
        seq,
        utterance_seq: 0,
        job_tx,
        utterance_tx,
        status_tx: status_tx.clone(),
        diagnostics: Arc::clone(&diagnostics),
    };

    // Scratch buffers reused every iteration.
    let mut raw = vec![0f32; DRAIN_CHUNK];
    let mut events: Vec<SegmenterEvent> = Vec::new();

    loop {
        if !running.load(Ordering::Relaxed) {
            break;
        }

        let n = consumer.pop_slice(&mut raw);
        if n == 0 {
            std::thread::sleep(std::time::Duration::from_millis(SLEEP_EMPTY_MS));
            continue;
        }
        diagnostics.frames_in.fetch_add(n, Ordering::Relaxed);

        let resampled = resampler.process(&raw[..n]);
        if resampled.is_empty() {
            // Partial chunk — the resampler is waiting for a full block.
            continue;
        }
        diagnostics
            .frames_resampled
            .fetch_add(resampled.len(), Ordering::Relaxed);

        events.clear();
        if let Err(e) = segmenter.push_frame(&resampled, &mut events) {
            // The segmenter already discarded the utterance and zeroed the
            // scorer; report and keep ingesting.
            diagnostics.scorer_errors.fetch_add(1, Ordering::Relaxed);
            error!(error = %e, "VAD scoring failed — utterance discarded, ingestion resumes");
            let _ = status_tx.send(EngineStatusEvent {
                status: EngineStatus::Error,
                detail: Some(format!("voice activity scoring failed: {e}")),
            });
        }
        dispatcher.handle(&mut events);
    }

    // Stop requested: flush buffered speech rather than losing the tail of
    // the last utterance.
    events.clear();
    if segmenter.is_recording() {
        events.push(SegmenterEvent::RecordingEnded {
            at_sample: segmenter.stream_pos(),
        });
    }
    if let Some(segment) = segmenter.flush() {
        info!(
            samples = segment.len(),
            "stop requested with buffered speech — flushing final segment"
        );
        events.push(SegmenterEvent::Segment(segment));
    }
    dispatcher.handle(&mut events);

    // Dropping the dispatcher closes the job channel; the worker drains
    // whatever is still queued, then exits.
    drop(dispatcher);
    if worker_handle.join().is_err() {
        error!("transcription worker panicked");
    }

    let snap = diagnostics.snapshot();
    info!(
        frames_in = snap.frames_in,
        frames_resampled = snap.frames_resampled,
        utterances_started = snap.utterances_started,
        segments_dispatched = snap.segments_dispatched,
        segments_discarded = snap.segments_discarded,
        scorer_errors = snap.scorer_errors,
        transcription_errors = snap.transcription_errors,
        "pipeline stopped — diagnostics"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::thread;
    use std::time::{Duration, Instant};

    use tokio::sync::broadcast::error::TryRecvError;

    use crate::buffering::{create_audio_ring, Producer};
    use crate::error::{LecternError, Result};
    use crate::ipc::events::SegmentResult;
    use crate::segment::{SegmentTrigger, SegmenterConfig};
    use crate::transcribe::Transcriber;

    /// One probability per window; `f32::NAN` entries produce a scoring
    /// error at that window.
    struct ScriptedScorer {
        probs: Vec<f32>,
        idx: usize,
        fallback: f32,
    }

    impl ScriptedScorer {
        fn new(probs: Vec<f32>, fallback: f32) -> Self {
            Self {
                probs,
                idx: 0,
                fallback,
            }
        }
    }

    impl SpeechScorer for ScriptedScorer {
        fn score(&mut self, _window: &[f32]) -> Result<f32> {
            let p = self.probs.get(self.idx).copied().unwrap_or(self.fallback);
            self.idx += 1;
            if p.is_nan() {
                Err(LecternError::VadScoring("scripted failure".into()))
            } else {
                Ok(p)
            }
        }

        fn reset(&mut self) {}
    }

    struct TestTranscriber {
        fail: bool,
        delay: Option<Duration>,
    }

    impl Transcriber for TestTranscriber {
        fn warm_up(&mut self) -> Result<()> {
            Ok(())
        }

        fn transcribe(&mut self, audio: &AudioFrame, _timing: &SegmentTiming) -> Result<String> {
            if let Some(d) = self.delay {
                thread::sleep(d);
            }
            if self.fail {
                return Err(LecternError::Transcription("intentional test failure".into()));
            }
            Ok(format!("heard {} samples", audio.samples.len()))
        }

        fn reset(&mut self) {}
    }

    fn recv_with_timeout<T: Clone>(
        rx: &mut broadcast::Receiver<T>,
        timeout: Duration,
    ) -> T {
        let start = Instant::now();
        loop {
            match rx.try_recv() {
                Ok(ev) => return ev,
                Err(TryRecvError::Empty) => {
                    if start.elapsed() >= timeout {
                        panic!("timed out waiting for event");
                    }
                    thread::sleep(Duration::from_millis(5));
                }
                Err(TryRecvError::Lagged(_)) => continue,
                Err(TryRecvError::Closed) => panic!("channel closed unexpectedly"),
            }
        }
    }

    /// window 512, min_silence/min_speech 2 windows, pad 1 window,
    /// capacity 16 000 samples.
    fn test_config() -> EngineConfig {
        EngineConfig {
            segmenter: SegmenterConfig {
                sample_rate: 16_000,
                window_size: 512,
                speech_threshold: 0.3,
                exit_threshold: 0.1,
                min_silence_ms: 64,
                min_speech_ms: 64,
                speech_pad_ms: 32,
                max_buffer_secs: 1,
            },
            ..Default::default()
        }
    }

    struct TestHarness {
        running: Arc<AtomicBool>,
        segment_rx: broadcast::Receiver<SegmentEvent>,
        utterance_rx: broadcast::Receiver<UtteranceEvent>,
        status_rx: broadcast::Receiver<EngineStatusEvent>,
        diagnostics: Arc<PipelineDiagnostics>,
        handle: thread::JoinHandle<()>,
    }

    fn spawn_pipeline(
        scorer: ScriptedScorer,
        transcriber: TestTranscriber,
        audio: &[f32],
    ) -> TestHarness {
        let (mut producer, consumer) = create_audio_ring();
        producer.push_slice(audio);

        let (segment_tx, segment_rx) = broadcast::channel(32);
        let (utterance_tx, utterance_rx) = broadcast::channel(32);
        let (status_tx, status_rx) = broadcast::channel(32);
        let running = Arc::new(AtomicBool::new(true));
        let diagnostics = Arc::new(PipelineDiagnostics::default());

        let ctx = PipelineContext {
            config: test_config(),
            scorer: Box::new(scorer),
            transcriber: TranscriberHandle::new(transcriber),
            consumer,
            running: Arc::clone(&running),
            segment_tx,
            utterance_tx,
            status_tx,
            seq: Arc::new(AtomicU64::new(0)),
            capture_sample_rate: 16_000,
            diagnostics: Arc::clone(&diagnostics),
        };

        let handle = thread::spawn(move || run(ctx));
        TestHarness {
            running,
            segment_rx,
            utterance_rx,
            status_rx,
            diagnostics,
            handle,
        }
    }

    #[test]
    fn speech_then_silence_produces_transcribed_segment() {
        let scorer = ScriptedScorer::new(vec![0.9, 0.9, 0.9, 0.9], 0.0);
        let transcriber = TestTranscriber {
            fail: false,
            delay: None,
        };
        // 4 speech windows then 4 silence windows.
        let mut h = spawn_pipeline(scorer, transcriber, &vec![0.2f32; 8 * 512]);

        let event = recv_with_timeout(&mut h.segment_rx, Duration::from_secs(2));
        h.running.store(false, Ordering::SeqCst);
        h.handle.join().expect("pipeline thread panicked");

        assert_eq!(event.seq, 0);
        assert_eq!(event.trigger, SegmentTrigger::Silence);
        // speech (4 windows) + trailing pad (1 window) = 2560 samples
        assert!((event.timing.duration_secs - 0.16).abs() < 1e-9);
        match event.result {
            SegmentResult::Transcribed { ref text } => assert_eq!(text, "heard 2560 samples"),
            SegmentResult::Failed { ref message } => panic!("unexpected failure: {message}"),
        }

        let started = recv_with_timeout(&mut h.utterance_rx, Duration::from_millis(200));
        let ended = recv_with_timeout(&mut h.utterance_rx, Duration::from_millis(200));
        assert_eq!(started.phase, UtterancePhase::RecordingStarted);
        assert_eq!(ended.phase, UtterancePhase::RecordingEnded);

        let snap = h.diagnostics.snapshot();
        assert_eq!(snap.utterances_started, 1);
        assert_eq!(snap.segments_dispatched, 1);
        assert_eq!(snap.transcription_errors, 0);
    }

    #[test]
    fn transcription_failure_reports_failed_event_with_timing() {
        let scorer = ScriptedScorer::new(vec![0.9, 0.9, 0.9, 0.9], 0.0);
        let transcriber = TestTranscriber {
            fail: true,
            delay: None,
        };
        let mut h = spawn_pipeline(scorer, transcriber, &vec![0.2f32; 8 * 512]);

        let event = recv_with_timeout(&mut h.segment_rx, Duration::from_secs(2));
        h.running.store(false, Ordering::SeqCst);
        h.handle.join().expect("pipeline thread panicked");

        match event.result {
            SegmentResult::Failed { ref message } => {
                assert!(message.contains("intentional test failure"));
            }
            SegmentResult::Transcribed { .. } => panic!("expected failure"),
        }
        // Timing still present so the caller can correlate the failure.
        assert!(event.timing.end > event.timing.start);
        assert_eq!(h.diagnostics.snapshot().transcription_errors, 1);
    }

    #[test]
    fn segment_starts_increase_in_production_order() {
        let scorer = ScriptedScorer::new(
            vec![
                0.9, 0.9, 0.9, 0.9, 0.0, 0.0, // first utterance + closing silence
                0.9, 0.9, 0.9, 0.9, 0.0, 0.0, // second utterance + closing silence
            ],
            0.0,
        );
        let transcriber = TestTranscriber {
            fail: false,
            delay: None,
        };
        let mut h = spawn_pipeline(scorer, transcriber, &vec![0.2f32; 12 * 512]);

        let first = recv_with_timeout(&mut h.segment_rx, Duration::from_secs(2));
        let second = recv_with_timeout(&mut h.segment_rx, Duration::from_secs(2));
        h.running.store(false, Ordering::SeqCst);
        h.handle.join().expect("pipeline thread panicked");

        assert_eq!(first.seq, 0);
        assert_eq!(second.seq, 1);
        assert!(second.timing.start > first.timing.start);
        assert!(second.timing.end > first.timing.end);
    }

    #[test]
    fn stop_flushes_buffered_speech_as_final_segment() {
        let scorer = ScriptedScorer::new(vec![], 0.9);
        let transcriber = TestTranscriber {
            fail: false,
            delay: None,
        };
        let mut h = spawn_pipeline(scorer, transcriber, &vec![0.2f32; 4 * 512]);

        // Let the pipeline ingest the speech, then stop mid-utterance.
        thread::sleep(Duration::from_millis(50));
        h.running.store(false, Ordering::SeqCst);
        h.handle.join().expect("pipeline thread panicked");

        let event = recv_with_timeout(&mut h.segment_rx, Duration::from_secs(2));
        assert_eq!(event.trigger, SegmentTrigger::Flush);
        assert!(matches!(event.result, SegmentResult::Transcribed { .. }));

        let started = recv_with_timeout(&mut h.utterance_rx, Duration::from_millis(200));
        let ended = recv_with_timeout(&mut h.utterance_rx, Duration::from_millis(200));
        assert_eq!(started.phase, UtterancePhase::RecordingStarted);
        assert_eq!(ended.phase, UtterancePhase::RecordingEnded);
    }

    #[test]
    fn scorer_failure_reports_error_and_pipeline_keeps_segmenting() {
        let scorer = ScriptedScorer::new(
            vec![0.9, f32::NAN, 0.9, 0.9, 0.9, 0.9, 0.0, 0.0],
            0.0,
        );
        let transcriber = TestTranscriber {
            fail: false,
            delay: None,
        };
        let mut h = spawn_pipeline(scorer, transcriber, &vec![0.2f32; 8 * 512]);

        // The error surfaces as a status event …
        let status = recv_with_timeout(&mut h.status_rx, Duration::from_secs(2));
        assert_eq!(status.status, EngineStatus::Error);
        assert!(status
            .detail
            .as_deref()
            .unwrap_or_default()
            .contains("scoring failed"));

        // … and the utterance after the failure still gets dispatched.
        let event = recv_with_timeout(&mut h.segment_rx, Duration::from_secs(2));
        h.running.store(false, Ordering::SeqCst);
        h.handle.join().expect("pipeline thread panicked");

        assert!(matches!(event.result, SegmentResult::Transcribed { .. }));
        let snap = h.diagnostics.snapshot();
        assert_eq!(snap.scorer_errors, 1);
        assert_eq!(snap.utterances_started, 2);
        assert_eq!(snap.segments_dispatched, 1);
    }
}
