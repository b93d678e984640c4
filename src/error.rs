//! Error types for the cache
//!
//! Provides unified error handling using thiserror. Filesystem failures carry
//! the step that failed so callers and logs can attribute them.

use std::fmt;
use std::path::{Path, PathBuf};

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

// == I/O Step ==
/// The filesystem operation that produced an [`CacheError::Io`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoStep {
    CreateDir,
    Lock,
    WriteTemp,
    Rename,
    Read,
    Delete,
    ListDir,
}

impl fmt::Display for IoStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            IoStep::CreateDir => "create dir",
            IoStep::Lock => "lock",
            IoStep::WriteTemp => "write temp file",
            IoStep::Rename => "rename",
            IoStep::Read => "read",
            IoStep::Delete => "delete",
            IoStep::ListDir => "list dir",
        };
        f.write_str(name)
    }
}

// == Cache Error Enum ==
/// Unified error type for the cache.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Key not found in cache
    #[error("Key not found: {0}")]
    NotFound(String),

    /// Another writer or reclaimer holds the entry lock
    #[error("Entry is locked: {}", .0.display())]
    LockContention(PathBuf),

    /// Filesystem failure, attributed to the step that failed
    #[error("I/O failure during {step} on {}: {source}", .path.display())]
    Io {
        step: IoStep,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Metadata sidecar could not be parsed
    #[error("Malformed metadata in {}: {source}", .path.display())]
    MalformedMetadata {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Remote key/value store failure
    #[error("Remote store error: {0}")]
    Remote(String),

    /// Invalid request data
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CacheError {
    /// Builds an [`CacheError::Io`] for `path`.
    pub fn io(step: IoStep, path: impl AsRef<Path>, source: std::io::Error) -> Self {
        CacheError::Io {
            step,
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Returns true for an ordinary cache miss.
    pub fn is_not_found(&self) -> bool {
        matches!(self, CacheError::NotFound(_))
    }

    /// Returns true when the failure was lock contention.
    pub fn is_lock_contention(&self) -> bool {
        matches!(self, CacheError::LockContention(_))
    }
}

impl From<redis::RedisError> for CacheError {
    fn from(err: redis::RedisError) -> Self {
        CacheError::Remote(err.to_string())
    }
}

// == IntoResponse Implementation ==
impl IntoResponse for CacheError {
    fn into_response(self) -> Response {
        let status = match &self {
            CacheError::NotFound(_) => StatusCode::NOT_FOUND,
            CacheError::LockContention(_) => StatusCode::CONFLICT,
            CacheError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            CacheError::Remote(_) => StatusCode::BAD_GATEWAY,
            CacheError::Io { .. }
            | CacheError::MalformedMetadata { .. }
            | CacheError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(json!({
            "error": self.to_string()
        }));

        (status, body).into_response()
    }
}

// == Result Type Alias ==
/// Convenience Result type for the cache.
pub type Result<T> = std::result::Result<T, CacheError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_names_step_and_path() {
        let err = CacheError::io(
            IoStep::Rename,
            "/tmp/cache/abc.json",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        let msg = err.to_string();
        assert!(msg.contains("rename"));
        assert!(msg.contains("/tmp/cache/abc.json"));
    }

    #[test]
    fn test_status_codes() {
        let resp = CacheError::NotFound("k".into()).into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let resp = CacheError::LockContention(PathBuf::from("x.lock")).into_response();
        assert_eq!(resp.status(), StatusCode::CONFLICT);

        let resp = CacheError::InvalidRequest("bad".into()).into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_predicates() {
        assert!(CacheError::NotFound("k".into()).is_not_found());
        assert!(!CacheError::Internal("x".into()).is_not_found());
        assert!(CacheError::LockContention(PathBuf::from("a")).is_lock_contention());
    }
}
