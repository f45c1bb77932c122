//! Error types for the Keel cluster model.

use thiserror::Error;

/// Result type alias for model operations.
pub type ModelResult<T> = Result<T, ModelError>;

/// Errors that can occur while interpreting model input.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("malformed operation key: {0}")]
    MalformedOpKey(String),

    #[error("unknown action task: {0}")]
    UnknownTask(String),

    #[error("invalid value for meta attribute {key}: {value}")]
    InvalidMeta { key: String, value: String },
}
