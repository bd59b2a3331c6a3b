//! Sample-rate conversion between the capture device and the engine rate.
//!
//! Devices commonly deliver 44.1/48 kHz; the segmenter wants 16 kHz mono.
//! `RateConverter` bridges the gap on the pipeline thread with a rubato
//! `FastFixedIn` session, accumulating input until rubato's fixed block is
//! full and carrying the remainder. When the rates already match it is a
//! plain copy and no rubato session exists.

use rubato::{FastFixedIn, PolynomialDegree, Resampler};
use tracing::{error, info};

use crate::error::{LecternError, Result};

pub struct RateConverter {
    /// `None` when capture rate == engine rate (passthrough).
    session: Option<FastFixedIn<f32>>,
    /// Input samples rubato expects per process call.
    block: usize,
    /// Partial input carried between calls.
    hold: Vec<f32>,
    /// Pre-allocated rubato output: `[1][output_frames_max]`.
    out: Vec<Vec<f32>>,
}

impl RateConverter {
    /// # Errors
    /// `LecternError::AudioStream` if rubato rejects the ratio.
    pub fn new(capture_rate: u32, engine_rate: u32, block: usize) -> Result<Self> {
        if capture_rate == engine_rate {
            return Ok(Self {
                session: None,
                block,
                hold: Vec::new(),
                out: Vec::new(),
            });
        }

        let ratio = engine_rate as f64 / capture_rate as f64;
        let session = FastFixedIn::<f32>::new(ratio, 1.0, PolynomialDegree::Cubic, block, 1)
            .map_err(|e| LecternError::AudioStream(format!("resampler init: {e}")))?;

        let max_out = session.output_frames_max();
        info!(capture_rate, engine_rate, block, max_out, "resampling enabled");

        Ok(Self {
            session: Some(session),
            block,
            hold: Vec::with_capacity(block * 2),
            out: vec![vec![0f32; max_out]],
        })
    }

    /// Convert `samples`, returning whatever full blocks produced (possibly
    /// empty while input accumulates). Passthrough mode copies directly.
    pub fn process(&mut self, samples: &[f32]) -> Vec<f32> {
        let Some(ref mut session) = self.session else {
            return samples.to_vec();
        };

        self.hold.extend_from_slice(samples);

        let mut converted = Vec::new();
        while self.hold.len() >= self.block {
            match session.process_into_buffer(&[&self.hold[..self.block]], &mut self.out, None) {
                Ok((_consumed, produced)) => {
                    converted.extend_from_slice(&self.out[0][..produced]);
                }
                Err(e) => {
                    error!("resampler process error: {e}");
                }
            }
            self.hold.drain(..self.block);
        }
        converted
    }

    pub fn is_passthrough(&self) -> bool {
        self.session.is_none()
    }
}
