//! Error types for git host access

use armportal_core::PortalError;
use thiserror::Error;

/// Errors returned by a [`crate::GitHost`].
#[derive(Error, Debug, Clone)]
pub enum GitHostError {
    /// Ref, file or pull request does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// Branch already exists, stale blob SHA, or duplicate pull request
    #[error("conflict: {0}")]
    Conflict(String),

    /// Any other non-success status
    #[error("git host returned {status}: {message}")]
    Api { status: u16, message: String },

    /// Transport failure
    #[error("HTTP error: {0}")]
    Http(String),

    /// Response body could not be decoded
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Required configuration is missing
    #[error("git host not configured: {0}")]
    NotConfigured(String),
}

impl GitHostError {
    /// Classify an HTTP status the way the REST API uses it.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            404 => GitHostError::NotFound(message),
            409 | 422 => GitHostError::Conflict(message),
            _ => GitHostError::Api { status, message },
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, GitHostError::NotFound(_))
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, GitHostError::Conflict(_))
    }
}

impl From<reqwest::Error> for GitHostError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => GitHostError::from_status(status.as_u16(), err.to_string()),
            None => GitHostError::Http(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for GitHostError {
    fn from(err: serde_json::Error) -> Self {
        GitHostError::InvalidResponse(err.to_string())
    }
}

impl From<base64::DecodeError> for GitHostError {
    fn from(err: base64::DecodeError) -> Self {
        GitHostError::InvalidResponse(format!("base64: {err}"))
    }
}

impl From<std::string::FromUtf8Error> for GitHostError {
    fn from(err: std::string::FromUtf8Error) -> Self {
        GitHostError::InvalidResponse(format!("utf-8: {err}"))
    }
}

impl From<GitHostError> for PortalError {
    fn from(err: GitHostError) -> Self {
        match err {
            GitHostError::NotFound(message) => PortalError::not_found(message),
            GitHostError::Conflict(message) => PortalError::conflict(message),
            GitHostError::NotConfigured(message) => PortalError::unexpected(message),
            other => PortalError::upstream(other.to_string()),
        }
    }
}

/// Result type for git host operations
pub type Result<T> = std::result::Result<T, GitHostError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        assert!(GitHostError::from_status(404, "x").is_not_found());
        assert!(GitHostError::from_status(409, "x").is_conflict());
        assert!(GitHostError::from_status(422, "Reference already exists").is_conflict());
        assert!(matches!(
            GitHostError::from_status(500, "boom"),
            GitHostError::Api { status: 500, .. }
        ));
    }

    #[test]
    fn converts_into_portal_taxonomy() {
        let err: PortalError = GitHostError::from_status(404, "pull 9").into();
        assert_eq!(err.status_code(), 404);
        let err: PortalError = GitHostError::from_status(422, "sha mismatch").into();
        assert_eq!(err.status_code(), 409);
        let err: PortalError = GitHostError::from_status(503, "unavailable").into();
        assert_eq!(err.status_code(), 502);
        assert!(err.to_string().contains("unavailable"));
    }
}
