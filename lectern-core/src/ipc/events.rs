//! Events broadcast by the engine to its caller (UI, logging, tests).
//!
//! Three channels, mirroring the engine's internals:
//!
//! | Event | Channel | Cadence |
//! |-------|---------|---------|
//! | `EngineStatusEvent` | status | lifecycle transitions + errors |
//! | `UtteranceEvent` | utterance | speech onset / end |
//! | `SegmentEvent` | segment | one per dispatched utterance |
//!
//! All types serialize with camelCase fields and lowercase/snake_case tags
//! so frontend consumers get stable JSON.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::segment::SegmentTrigger;

// ---------------------------------------------------------------------------
// Segment events
// ---------------------------------------------------------------------------

/// Wall-clock placement of a dispatched segment.
///
/// Derived from the session epoch plus the ingestion sample clock, so values
/// are monotone in production order regardless of transcription latency.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SegmentTiming {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub duration_secs: f64,
}

/// Emitted once per dispatched segment, when its transcription completes
/// or fails. Failures keep the timing so callers can correlate.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SegmentEvent {
    /// Monotonically increasing dispatch sequence number.
    pub seq: u64,
    /// Why the segmenter closed this utterance.
    pub trigger: SegmentTrigger,
    pub timing: SegmentTiming,
    #[serde(flatten)]
    pub result: SegmentResult,
}

/// Transcription outcome for one segment.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "lowercase")]
pub enum SegmentResult {
    /// The recognition collaborator produced text.
    Transcribed { text: String },
    /// The recognition collaborator failed; engine state is unaffected.
    Failed { message: String },
}

// ---------------------------------------------------------------------------
// Utterance events
// ---------------------------------------------------------------------------

/// Speech onset / end notifications for live UI feedback.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UtteranceEvent {
    /// Monotonically increasing utterance event sequence number.
    pub seq: u64,
    pub phase: UtterancePhase,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UtterancePhase {
    RecordingStarted,
    RecordingEnded,
}

// ---------------------------------------------------------------------------
// Engine status events
// ---------------------------------------------------------------------------

/// Emitted when the engine's lifecycle state changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineStatusEvent {
    pub status: EngineStatus,
    /// Optional human-readable detail (e.g. error message).
    pub detail: Option<String>,
}

/// Current state of the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineStatus {
    /// Warming up the transcription collaborator.
    Loading,
    /// Collaborators ready; capture not started.
    Ready,
    /// Actively capturing and segmenting.
    Listening,
    /// Capture stopped; engine may be restarted.
    Stopped,
    /// A fault the caller should surface. Buffering faults are recovered
    /// internally; this status follows them so the UI can show a notice.
    Error,
}
