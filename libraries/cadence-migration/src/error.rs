//! Error types for the migration

use cadence_remote::RemoteError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("Not signed in")]
    Unauthenticated,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed legacy data: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid legacy record: {0}")]
    InvalidRecord(String),

    #[error("Remote error: {0}")]
    Remote(#[from] RemoteError),
}

pub type Result<T> = std::result::Result<T, MigrationError>;
