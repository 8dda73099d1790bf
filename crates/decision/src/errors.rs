//! Error types for the inference core

use thiserror::Error;

pub type Result<T> = std::result::Result<T, DecisionError>;

#[derive(Error, Debug)]
pub enum DecisionError {
    /// Malformed statistical input: bad sizes, out-of-range proportions,
    /// count exceeding total, empty samples.
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// A denominator that must be non-zero (pooled variance, baseline
    /// variance) came out zero.
    #[error("Numerical degeneracy: {0}")]
    NumericalDegeneracy(String),

    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error(transparent)]
    Config(#[from] abtest_config::ConfigError),
}

impl DecisionError {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        DecisionError::InvalidParameter(msg.into())
    }

    pub(crate) fn degenerate(msg: impl Into<String>) -> Self {
        DecisionError::NumericalDegeneracy(msg.into())
    }
}
