use thiserror::Error;

/// All errors produced by lectern-core.
#[derive(Debug, Error)]
pub enum LecternError {
    #[error("audio device error: {0}")]
    AudioDevice(String),

    #[error("audio stream error: {0}")]
    AudioStream(String),

    #[error("no default input device found")]
    NoDefaultInputDevice,

    #[error("analysis window has {actual} samples, scorer expects {expected}")]
    WindowLength { expected: usize, actual: usize },

    #[error("VAD scoring error: {0}")]
    VadScoring(String),

    #[error("transcription error: {0}")]
    Transcription(String),

    #[error("engine is already running")]
    AlreadyRunning,

    #[error("engine is not running")]
    NotRunning,

    #[error("ONNX session error: {0}")]
    OnnxSession(String),

    #[error("model file not found: {path}")]
    ModelNotFound { path: std::path::PathBuf },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, LecternError>;
