use thiserror::Error;

/// All errors produced by pawsense-core.
#[derive(Debug, Error)]
pub enum PawsenseError {
    #[error("audio device error: {0}")]
    AudioDevice(String),

    #[error("audio stream error: {0}")]
    AudioStream(String),

    #[error("no default input device found")]
    NoDefaultInputDevice,

    #[error("malformed audio chunk: expected {expected} samples, got {actual}")]
    MalformedChunk { expected: usize, actual: usize },

    #[error("inference error: {0}")]
    Inference(String),

    #[error("model returned non-finite scores")]
    NonFiniteScores,

    #[error("model is not ready, call warm_up() first")]
    ModelNotReady,

    #[error("model file not found: {path}")]
    ModelNotFound { path: std::path::PathBuf },

    #[error("model download failed: {0}")]
    ModelDownload(String),

    #[error("ONNX session error: {0}")]
    OnnxSession(String),

    #[error("WAV input error: {0}")]
    Wav(String),

    #[error("engine is already running")]
    AlreadyRunning,

    #[error("engine is not running")]
    NotRunning,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, PawsenseError>;
