//! Silero VAD scorer backed by the official ONNX model
//! (<https://github.com/snakers4/silero-vad>).
//!
//! Accepts both published interfaces:
//! v3/v4 LSTM — inputs `input [1,512]`, `sr [1]`, `h [2,1,64]`, `c [2,1,64]`;
//! outputs `output [1,1]`, `hn`, `cn`.
//! v5 GRU — inputs `input [1,512]`, `sr [1]`, `state [2,1,128]`;
//! outputs `output [1,1]`, `stateN`.
//!
//! The recurrent tensors are carried between `score` calls and zeroed by
//! `reset`. Window length is a hard contract: exactly 512 samples at 16 kHz.

use std::path::{Path, PathBuf};

use ndarray::{Array1, Array2, Array3};
use ort::session::builder::SessionBuilder;
use ort::session::SessionInputValue;
use ort::value::Value;
use tracing::info;

use super::SpeechScorer;
use crate::error::{LecternError, Result};

/// Window size the model was trained on (samples at 16 kHz ≈ 32 ms).
pub const SILERO_WINDOW: usize = 512;

/// v3/v4: each of h and c is 2 layers × 1 batch × 64 units.
const LSTM_STATE_LEN: usize = 128;
/// v5: single state tensor, 2 × 1 × 128.
const GRU_STATE_LEN: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StateLayout {
    /// Separate `h`/`c` tensors (v3/v4).
    LstmV4,
    /// Combined `state` tensor (v5).
    GruV5,
}

pub struct SileroScorer {
    session: ort::session::Session,
    layout: StateLayout,
    has_sr_input: bool,
    h: Vec<f32>,
    c: Vec<f32>,
    state: Vec<f32>,
}

impl SileroScorer {
    /// Load the Silero VAD model from `path`.
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(LecternError::ModelNotFound {
                path: path.to_path_buf(),
            });
        }

        let session = SessionBuilder::new()
            .map_err(|e| LecternError::OnnxSession(e.to_string()))?
            .commit_from_file(path)
            .map_err(|e| LecternError::OnnxSession(e.to_string()))?;

        let input_names: Vec<String> = session
            .inputs()
            .iter()
            .map(|outlet| outlet.name().to_string())
            .collect();

        let has = |name: &str| input_names.iter().any(|n| n.eq_ignore_ascii_case(name));

        let layout = if has("state") {
            StateLayout::GruV5
        } else if has("h") && has("c") {
            StateLayout::LstmV4
        } else {
            return Err(LecternError::OnnxSession(format!(
                "unrecognised Silero model interface, inputs: {input_names:?}"
            )));
        };
        let has_sr_input = has("sr");

        info!(path = %path.display(), ?layout, "Silero VAD model loaded");

        Ok(Self {
            session,
            layout,
            has_sr_input,
            h: vec![0.0; LSTM_STATE_LEN],
            c: vec![0.0; LSTM_STATE_LEN],
            state: vec![0.0; GRU_STATE_LEN],
        })
    }

    /// Default model location; `LECTERN_MODELS_DIR` overrides the directory.
    pub fn default_model_path() -> PathBuf {
        let dir = std::env::var("LECTERN_MODELS_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("models"));
        dir.join("silero_vad.onnx")
    }

    fn run_window(&mut self, window: &[f32]) -> Result<f32> {
        let onnx_err = |e: ort::Error| LecternError::OnnxSession(e.to_string());
        let shape_err = |e: ndarray::ShapeError| LecternError::OnnxSession(e.to_string());

        let input_arr =
            Array2::<f32>::from_shape_vec((1, SILERO_WINDOW), window.to_vec()).map_err(shape_err)?;
        let mut input_values: Vec<(String, SessionInputValue<'_>)> = vec![(
            "input".to_string(),
            Value::from_array(input_arr).map_err(onnx_err)?.into(),
        )];

        if self.has_sr_input {
            let sr_arr = Array1::<i64>::from_elem(1, 16_000i64);
            input_values.push((
                "sr".to_string(),
                Value::from_array(sr_arr).map_err(onnx_err)?.into(),
            ));
        }

        match self.layout {
            StateLayout::LstmV4 => {
                let h_arr =
                    Array3::<f32>::from_shape_vec((2, 1, 64), self.h.clone()).map_err(shape_err)?;
                let c_arr =
                    Array3::<f32>::from_shape_vec((2, 1, 64), self.c.clone()).map_err(shape_err)?;
                input_values.push((
                    "h".to_string(),
                    Value::from_array(h_arr).map_err(onnx_err)?.into(),
                ));
                input_values.push((
                    "c".to_string(),
                    Value::from_array(c_arr).map_err(onnx_err)?.into(),
                ));
            }
            StateLayout::GruV5 => {
                let state_arr = Array3::<f32>::from_shape_vec((2, 1, 128), self.state.clone())
                    .map_err(shape_err)?;
                input_values.push((
                    "state".to_string(),
                    Value::from_array(state_arr).map_err(onnx_err)?.into(),
                ));
            }
        }

        let outputs = self.session.run(input_values).map_err(onnx_err)?;

        let prob_output = outputs.get("output").unwrap_or(&outputs[0]);
        let (_, prob_data) = prob_output
            .try_extract_tensor::<f32>()
            .map_err(onnx_err)?;
        let prob = prob_data
            .first()
            .copied()
            .ok_or_else(|| LecternError::VadScoring("model returned empty output".into()))?;

        // Carry the recurrent state into the next call. A missing state
        // output means the model no longer matches the detected layout.
        match self.layout {
            StateLayout::LstmV4 => {
                let hn = outputs
                    .get("hn")
                    .ok_or_else(|| LecternError::VadScoring("model output `hn` missing".into()))?;
                let cn = outputs
                    .get("cn")
                    .ok_or_else(|| LecternError::VadScoring("model output `cn` missing".into()))?;
                let (_, hn_data) = hn.try_extract_tensor::<f32>().map_err(onnx_err)?;
                let (_, cn_data) = cn.try_extract_tensor::<f32>().map_err(onnx_err)?;
                self.h = hn_data.to_vec();
                self.c = cn_data.to_vec();
            }
            StateLayout::GruV5 => {
                let state_out = outputs.get("stateN").ok_or_else(|| {
                    LecternError::VadScoring("model output `stateN` missing".into())
                })?;
                let (_, state_data) = state_out.try_extract_tensor::<f32>().map_err(onnx_err)?;
                self.state = state_data.to_vec();
            }
        }

        Ok(prob.clamp(0.0, 1.0))
    }
}

impl SpeechScorer for SileroScorer {
    fn score(&mut self, window: &[f32]) -> Result<f32> {
        debug_assert_eq!(window.len(), SILERO_WINDOW);
        if window.len() != SILERO_WINDOW {
            return Err(LecternError::WindowLength {
                expected: SILERO_WINDOW,
                actual: window.len(),
            });
        }
        self.run_window(window)
    }

    fn reset(&mut self) {
        self.h.iter_mut().for_each(|v| *v = 0.0);
        self.c.iter_mut().for_each(|v| *v = 0.0);
        self.state.iter_mut().for_each(|v| *v = 0.0);
    }
}
