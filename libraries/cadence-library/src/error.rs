use cadence_storage::StorageError;
use thiserror::Error;

/// Errors raised while projecting or recording library data
#[derive(Error, Debug)]
pub enum LibraryError {
    #[error("Local store error: {0}")]
    Storage(#[from] StorageError),
}

pub type Result<T> = std::result::Result<T, LibraryError>;
