//! Fire-and-forget dispatch worker.
//!
//! The pipeline hands finished segments over an unbounded crossbeam channel
//! and immediately goes back to ingesting audio; this worker drains the
//! channel, runs the transcription collaborator, and broadcasts the outcome.
//! Unbounded on purpose: a slow collaborator queues work, it never causes a
//! segment to be dropped. The worker exits when the pipeline drops its
//! sender, after draining whatever is still queued.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::Receiver;
use tokio::sync::broadcast;
use tracing::{debug, error, info};

use super::TranscriberHandle;
use crate::buffering::frame::AudioFrame;
use crate::ipc::events::{SegmentEvent, SegmentResult, SegmentTiming};
use crate::segment::SegmentTrigger;

/// One dispatched segment on its way to the recognition collaborator.
#[derive(Debug)]
pub struct DispatchJob {
    pub seq: u64,
    pub audio: AudioFrame,
    pub timing: SegmentTiming,
    pub trigger: SegmentTrigger,
}

/// Spawn the worker thread. `failures` counts collaborator errors for the
/// pipeline diagnostics snapshot.
pub fn spawn(
    jobs: Receiver<DispatchJob>,
    transcriber: TranscriberHandle,
    segment_tx: broadcast::Sender<SegmentEvent>,
    failures: Arc<AtomicUsize>,
) -> JoinHandle<()> {
    std::thread::spawn(move || {
        for job in jobs.iter() {
            let DispatchJob {
                seq,
                audio,
                timing,
                trigger,
            } = job;

            let outcome = {
                let mut backend = transcriber.0.lock();
                backend.transcribe(&audio, &timing)
            };

            let result = match outcome {
                Ok(text) => {
                    info!(
                        seq,
                        samples = audio.samples.len(),
                        duration_secs = timing.duration_secs,
                        text_preview = %text.chars().take(50).collect::<String>(),
                        "segment transcribed"
                    );
                    SegmentResult::Transcribed { text }
                }
                Err(e) => {
                    failures.fetch_add(1, Ordering::Relaxed);
                    error!(seq, error = %e, "transcription failed");
                    SegmentResult::Failed {
                        message: e.to_string(),
                    }
                }
            };

            let _ = segment_tx.send(SegmentEvent {
                seq,
                trigger,
                timing,
                result,
            });
        }
        debug!("transcription worker drained — exiting");
    })
}
