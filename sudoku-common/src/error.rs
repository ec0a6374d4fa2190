//! Common error types for the sudoku webhook

use thiserror::Error;

/// Common result type for sudoku-common operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types shared by the webhook service
#[derive(Error, Debug)]
pub enum Error {
    /// A value failed parse-and-validate
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// TOML parse error
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Validation failures raised while turning raw strings into typed fields
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Difficulty is not one of easy/medium/hard
    #[error("unknown difficulty level: {0:?}")]
    UnknownDifficulty(String),

    /// Solve time is not two integers separated by a colon
    #[error("invalid solve time {0:?}, expected MM:SS")]
    InvalidSolveTime(String),

    /// Timestamp does not match `YYYY:MM:DD HH:MM:SS`
    #[error("invalid timestamp {value:?}: {reason}")]
    InvalidTimestamp { value: String, reason: String },

    /// A required field is absent or has the wrong type
    #[error("missing or invalid field: {0}")]
    MissingField(String),

    /// Body is not valid JSON
    #[error("malformed JSON: {0}")]
    MalformedJson(String),
}
