use qadmm_core::problem::ProblemError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AdmmError {
    #[error("invalid model: {0}")]
    Problem(#[from] ProblemError),
    #[error("dimension mismatch: {0}")]
    DimensionMismatch(String),
    #[error("invalid parameters: {0}")]
    InvalidParameters(String),
    #[error("{oracle} oracle failed: {message}")]
    OracleFailure {
        oracle: &'static str,
        message: String,
    },
}

impl AdmmError {
    pub fn oracle(oracle: &'static str, message: impl Into<String>) -> Self {
        AdmmError::OracleFailure {
            oracle,
            message: message.into(),
        }
    }
}
