//! Error types for the observation model

use thiserror::Error;

/// Result type alias for data model operations
pub type Result<T> = std::result::Result<T, DataError>;

/// Errors raised while validating observations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DataError {
    #[error("Negative revenue {revenue} for user {user_id}")]
    NegativeRevenue { user_id: String, revenue: f64 },

    #[error("Non-finite revenue for user {user_id}")]
    NonFiniteRevenue { user_id: String },

    #[error("User {user_id} did not convert but has revenue {revenue}")]
    RevenueWithoutConversion { user_id: String, revenue: f64 },

    #[error("Unknown group label: {0}")]
    UnknownGroup(String),

    #[error("Empty dataset")]
    Empty,
}
