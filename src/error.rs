//! Error types for the inference core.
//!
//! Every failure is deterministic: the same weights and the same token ids
//! always produce the same error, so nothing here is retryable.

use thiserror::Error;

/// Result type alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ModelError>;

/// Errors raised while building or running a model.
#[derive(Error, Debug)]
pub enum ModelError {
    /// Token id outside `[0, vocab_size)`.
    #[error("token id {token_id} out of range (vocab_size = {vocab_size})")]
    OutOfRange { token_id: usize, vocab_size: usize },

    /// Sequence is empty or longer than the context window.
    #[error("sequence length {len} outside [1, {max}]")]
    SequenceTooLong { len: usize, max: usize },

    /// Internal vector length inconsistency.
    #[error("shape mismatch in {context}: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        context: &'static str,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    /// Invalid model dimensions.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// I/O error while reading a config file.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed JSON config.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ModelError {
    pub(crate) fn shape(context: &'static str, expected: &[usize], actual: &[usize]) -> Self {
        ModelError::ShapeMismatch {
            context,
            expected: expected.to_vec(),
            actual: actual.to_vec(),
        }
    }
}
