//! Remote backend error types.
//!
//! Typed so callers can classify failures for retry decisions without
//! string matching; the collaborator traits carry these inside `anyhow`.

use thiserror::Error;

/// Errors from the remote HTTP backend.
#[derive(Debug, Error)]
pub enum BackendError {
    /// Authentication failed (invalid API token).
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// The API returned an error response.
    #[error("API error (HTTP {status}): {message}")]
    ApiError { status: u16, message: String },

    /// The request timed out.
    #[error("request timed out after {0}s")]
    Timeout(u64),

    /// A network error occurred.
    #[error("network error: {0}")]
    NetworkError(String),
}

impl BackendError {
    /// Returns `true` if this error is permanent and should not be retried.
    pub fn is_permanent(&self) -> bool {
        matches!(self, BackendError::AuthenticationFailed(_))
            || matches!(self, BackendError::ApiError { status, .. } if (400..500).contains(status) && *status != 429)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_errors_are_permanent_except_rate_limits() {
        assert!(BackendError::AuthenticationFailed("bad token".into()).is_permanent());
        assert!(BackendError::ApiError {
            status: 404,
            message: "missing".into()
        }
        .is_permanent());
        assert!(!BackendError::ApiError {
            status: 429,
            message: "slow down".into()
        }
        .is_permanent());
        assert!(!BackendError::NetworkError("reset".into()).is_permanent());
        assert!(!BackendError::Timeout(30).is_permanent());
    }
}
