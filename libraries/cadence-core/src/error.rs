/// Core error types for Cadence
use thiserror::Error;

/// Result type alias using `CoreError`
pub type Result<T> = std::result::Result<T, CoreError>;

/// Core error type for Cadence
#[derive(Error, Debug)]
pub enum CoreError {
    /// No signed-in session
    #[error("Not signed in")]
    Unauthenticated,

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Unknown table name
    #[error("Unknown table: {0}")]
    UnknownTable(String),

    /// Serialization errors
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
}

impl CoreError {
    /// Create an invalid input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }
}
