use cadence_remote::RemoteError;
use cadence_storage::StorageError;
use thiserror::Error;

/// Errors that can occur during sync operations
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Remote error: {0}")]
    Remote(#[from] RemoteError),

    #[error("Local store error: {0}")]
    Storage(#[from] StorageError),

    #[error("Sync engine stopped")]
    Stopped,
}

impl SyncError {
    /// The backend refused the session; sync must suspend
    pub fn is_unauthenticated(&self) -> bool {
        matches!(self, Self::Remote(RemoteError::Unauthenticated))
    }

    /// Label stored in the sync error log
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Remote(e) => e.kind(),
            Self::Storage(_) => "local_write",
            Self::Stopped => "stopped",
        }
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
