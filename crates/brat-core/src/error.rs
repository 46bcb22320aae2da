/// Core error types for the brat renderer.
use std::path::PathBuf;

/// A specialized Result type for brat operations.
pub type BratResult<T> = Result<T, BratError>;

/// Top-level error type encompassing all brat subsystems.
#[derive(Debug, thiserror::Error)]
pub enum BratError {
    #[error("render engine unavailable: {0}")]
    EngineUnavailable(String),

    #[error("render error: {0}")]
    Render(String),

    #[error("invalid overlay state: expected {expected}, found {found}")]
    InvalidState {
        expected: &'static str,
        found: &'static str,
    },

    #[error("encode error: {0}")]
    Encode(String),

    #[error("busy: {0}")]
    Busy(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("config error: {message} ({path:?})")]
    Config { message: String, path: PathBuf },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl BratError {
    /// Create a config error tied to the file it came from.
    pub fn config(message: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        BratError::Config {
            message: message.into(),
            path: path.into(),
        }
    }

    /// Short machine-friendly name of the error category, used in log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            BratError::EngineUnavailable(_) => "engine_unavailable",
            BratError::Render(_) => "render_failure",
            BratError::InvalidState { .. } => "invalid_state",
            BratError::Encode(_) => "encoding_failure",
            BratError::Busy(_) => "busy",
            BratError::InvalidArgument(_) => "invalid_argument",
            BratError::Config { .. } => "config",
            BratError::Io(_) => "io",
            BratError::Serialization(_) => "serialization",
        }
    }
}
