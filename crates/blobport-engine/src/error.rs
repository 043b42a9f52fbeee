use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("layer '{layer}' references unknown blob '{blob}'")]
    UnknownBlob { layer: String, blob: String },

    #[error("blob '{0}' is declared more than once")]
    DuplicateBlob(String),

    #[error("invalid layer '{layer}': {reason}")]
    InvalidLayer { layer: String, reason: String },

    #[error("shape mismatch for {what}: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        what: String,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    #[error("layer '{layer}' expects {expected} parameter blobs, got {actual}")]
    ParamCountMismatch {
        layer: String,
        expected: usize,
        actual: usize,
    },

    #[error("failed to decode net parameters: {0}")]
    Decode(#[from] prost::DecodeError),

    #[error("failed to access {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, EngineError>;
