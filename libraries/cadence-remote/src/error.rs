//! Error types for the remote backend client.

use thiserror::Error;

/// Errors that can occur when talking to the sync backend.
#[derive(Error, Debug)]
pub enum RemoteError {
    /// No active session, or the backend refused the access token.
    /// Sync must suspend until the user signs in again.
    #[error("Not authenticated")]
    Unauthenticated,

    /// Connection failure, timeout or server-side (5xx) error; retried next cycle
    #[error("Network unavailable: {0}")]
    NetworkUnavailable(String),

    /// The backend rejected the request (schema or constraint violation)
    #[error("Remote rejected request ({status}): {message}")]
    RemoteRejected { status: u16, message: String },

    /// Failed to parse a response or a row
    #[error("Failed to decode response: {0}")]
    Decode(String),

    /// Invalid backend URL
    #[error("Invalid backend URL: {0}")]
    InvalidUrl(String),
}

impl RemoteError {
    /// Whether the failure is expected to go away on a later attempt
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::NetworkUnavailable(_))
    }

    /// Short machine-readable label, used in logs and the sync error table
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Unauthenticated => "unauthenticated",
            Self::NetworkUnavailable(_) => "network",
            Self::RemoteRejected { .. } => "rejected",
            Self::Decode(_) => "decode",
            Self::InvalidUrl(_) => "invalid_url",
        }
    }

    /// Map an HTTP error status to the taxonomy
    ///
    /// Only 401 ends the session; a 403 refuses a single request.
    pub fn from_status(status: u16, message: String) -> Self {
        match status {
            401 => Self::Unauthenticated,
            408 | 429 | 500..=599 => Self::NetworkUnavailable(format!("HTTP {status}: {message}")),
            _ => Self::RemoteRejected { status, message },
        }
    }
}

impl From<reqwest::Error> for RemoteError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Self::Decode(e.to_string())
        } else if let Some(status) = e.status() {
            Self::from_status(status.as_u16(), e.to_string())
        } else {
            // connect, timeout, body and request errors all mean the
            // backend could not be reached
            Self::NetworkUnavailable(e.to_string())
        }
    }
}

impl From<serde_json::Error> for RemoteError {
    fn from(e: serde_json::Error) -> Self {
        Self::Decode(e.to_string())
    }
}

/// Result type for remote client operations.
pub type Result<T> = std::result::Result<T, RemoteError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        assert!(matches!(
            RemoteError::from_status(401, String::new()),
            RemoteError::Unauthenticated
        ));
        assert!(RemoteError::from_status(503, "down".into()).is_transient());
        assert!(RemoteError::from_status(429, String::new()).is_transient());
        assert!(matches!(
            RemoteError::from_status(409, "duplicate key".into()),
            RemoteError::RemoteRejected { status: 409, .. }
        ));
    }

    #[test]
    fn forbidden_row_does_not_end_the_session() {
        // Row-level security refusals arrive as 403; the token is still good
        let err = RemoteError::from_status(403, "new row violates row-level security policy".into());
        assert!(matches!(err, RemoteError::RemoteRejected { status: 403, .. }));
        assert!(!err.is_transient());
    }

    #[test]
    fn kinds_are_stable() {
        assert_eq!(RemoteError::Unauthenticated.kind(), "unauthenticated");
        assert_eq!(RemoteError::Decode("x".into()).kind(), "decode");
    }
}
