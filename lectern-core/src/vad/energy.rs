//! Energy-based scorer: RMS level mapped to a pseudo-probability.
//!
//! Not a real speech model — it exists so the engine runs end-to-end
//! without ONNX assets (tests, CI, first launch before models download).
//! The mapping is linear: `rms / reference_rms`, clamped to [0, 1], so a
//! window at the reference level scores 1.0 and silence scores ~0.

use super::SpeechScorer;
use crate::error::Result;

/// RMS level that maps to probability 1.0. Conversational speech on a
/// typical laptop microphone lands around 0.02–0.08 RMS.
const DEFAULT_REFERENCE_RMS: f32 = 0.05;

#[derive(Debug, Clone)]
pub struct EnergyScorer {
    reference_rms: f32,
}

impl EnergyScorer {
    pub fn new(reference_rms: f32) -> Self {
        Self {
            reference_rms: reference_rms.max(f32::EPSILON),
        }
    }

    /// Root-mean-square of a sample slice.
    fn rms(samples: &[f32]) -> f32 {
        if samples.is_empty() {
            return 0.0;
        }
        let sum_sq: f32 = samples.iter().map(|s| s * s).sum();
        (sum_sq / samples.len() as f32).sqrt()
    }
}

impl Default for EnergyScorer {
    fn default() -> Self {
        Self::new(DEFAULT_REFERENCE_RMS)
    }
}

impl SpeechScorer for EnergyScorer {
    fn score(&mut self, window: &[f32]) -> Result<f32> {
        Ok((Self::rms(window) / self.reference_rms).clamp(0.0, 1.0))
    }

    fn reset(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn silence_scores_zero() {
        let mut scorer = EnergyScorer::default();
        let prob = scorer.score(&vec![0.0f32; 512]).unwrap();
        assert_relative_eq!(prob, 0.0);
    }

    #[test]
    fn loud_window_saturates_at_one() {
        let mut scorer = EnergyScorer::default();
        let prob = scorer.score(&vec![0.5f32; 512]).unwrap();
        assert_relative_eq!(prob, 1.0);
    }

    #[test]
    fn mid_level_scores_proportionally() {
        let mut scorer = EnergyScorer::new(0.05);
        // ±0.025 square wave has RMS 0.025 → probability 0.5.
        let window: Vec<f32> = (0..512)
            .map(|i| if i % 2 == 0 { 0.025 } else { -0.025 })
            .collect();
        let prob = scorer.score(&window).unwrap();
        assert_relative_eq!(prob, 0.5, epsilon = 1e-5);
    }

    #[test]
    fn empty_window_scores_zero() {
        let mut scorer = EnergyScorer::default();
        assert_relative_eq!(scorer.score(&[]).unwrap(), 0.0);
    }
}
