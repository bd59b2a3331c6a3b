//! Activity gate: per-window speech decision with hysteresis.
//!
//! Two thresholds, not one: entering speech requires the probability to
//! clear `speech_threshold`; staying in speech only requires it to clear the
//! lower `exit_threshold`. The asymmetry stops the gate from flickering
//! on/off at the edge of an utterance when the probability hovers near the
//! boundary.

use crate::error::Result;
use crate::vad::SpeechScorer;

/// Outcome of gating one analysis window.
#[derive(Debug, Clone, Copy)]
pub struct GateReport {
    /// Raw scorer probability in [0, 1].
    pub probability: f32,
    /// Hysteresis decision for this window.
    pub active: bool,
}

pub struct ActivityGate {
    scorer: Box<dyn SpeechScorer>,
    speech_threshold: f32,
    exit_threshold: f32,
}

impl ActivityGate {
    pub fn new(scorer: Box<dyn SpeechScorer>, speech_threshold: f32, exit_threshold: f32) -> Self {
        Self {
            scorer,
            speech_threshold,
            exit_threshold,
        }
    }

    /// Score `window` and apply hysteresis. `engaged` is whether an
    /// utterance is currently being recorded (selects the exit threshold).
    ///
    /// # Errors
    /// Propagates scorer failures; the caller must treat the current
    /// utterance as lost and the scorer state as suspect.
    pub fn assess(&mut self, window: &[f32], engaged: bool) -> Result<GateReport> {
        let probability = self.scorer.score(window)?;
        let threshold = if engaged {
            self.exit_threshold
        } else {
            self.speech_threshold
        };
        Ok(GateReport {
            probability,
            active: probability > threshold,
        })
    }

    /// Zero the scorer's recurrent state.
    pub fn reset(&mut self) {
        self.scorer.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LecternError;

    /// Replays a fixed probability sequence, one value per call.
    struct ScriptedScorer {
        probs: Vec<f32>,
        idx: usize,
    }

    impl ScriptedScorer {
        fn new(probs: Vec<f32>) -> Self {
            Self { probs, idx: 0 }
        }
    }

    impl SpeechScorer for ScriptedScorer {
        fn score(&mut self, _window: &[f32]) -> Result<f32> {
            let p = self.probs.get(self.idx).copied().unwrap_or(0.0);
            self.idx += 1;
            Ok(p)
        }

        fn reset(&mut self) {}
    }

    struct FailingScorer;

    impl SpeechScorer for FailingScorer {
        fn score(&mut self, _window: &[f32]) -> Result<f32> {
            Err(LecternError::VadScoring("scripted failure".into()))
        }

        fn reset(&mut self) {}
    }

    #[test]
    fn hysteresis_keeps_engaged_windows_active_below_entry_threshold() {
        let scorer = ScriptedScorer::new(vec![0.05, 0.35, 0.32, 0.15, 0.08]);
        let mut gate = ActivityGate::new(Box::new(scorer), 0.3, 0.1);

        let window = vec![0.0f32; 512];
        let mut engaged = false;
        let mut decisions = Vec::new();
        for _ in 0..5 {
            let report = gate.assess(&window, engaged).unwrap();
            engaged = report.active;
            decisions.push(report.active);
        }

        // 0.32 and 0.15 would not *start* speech, but they do *continue* it.
        assert_eq!(decisions, vec![false, true, true, true, false]);
    }

    #[test]
    fn entry_requires_clearing_the_higher_threshold() {
        let scorer = ScriptedScorer::new(vec![0.2, 0.25, 0.29]);
        let mut gate = ActivityGate::new(Box::new(scorer), 0.3, 0.1);
        let window = vec![0.0f32; 512];
        for _ in 0..3 {
            assert!(!gate.assess(&window, false).unwrap().active);
        }
    }

    #[test]
    fn scorer_failure_propagates() {
        let mut gate = ActivityGate::new(Box::new(FailingScorer), 0.3, 0.1);
        let err = gate.assess(&[0.0; 512], false).unwrap_err();
        assert!(matches!(err, LecternError::VadScoring(_)));
    }
}
