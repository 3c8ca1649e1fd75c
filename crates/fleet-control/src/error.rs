//! Control-plane error classification.

use thiserror::Error;

/// Result type alias for control-plane calls.
pub type ControlPlaneResult<T> = Result<T, ControlPlaneError>;

/// Errors returned by a control-plane call.
///
/// Only `Transient` errors are retried.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ControlPlaneError {
    /// Rate limit, server error, timeout or connection failure.
    #[error("transient: {0}")]
    Transient(String),

    /// Invalid argument, not found, permission denied.
    #[error("permanent: {0}")]
    Permanent(String),

    /// The resource to delete no longer exists.
    #[error("already absent: {0}")]
    AlreadyAbsent(String),

    /// The run was cancelled before the call could be retried.
    #[error("cancelled")]
    Cancelled,
}

impl ControlPlaneError {
    pub fn is_transient(&self) -> bool {
        matches!(self, ControlPlaneError::Transient(_))
    }
}

/// Classify a non-2xx HTTP status.
pub fn classify_status(status: u16, message: &str) -> ControlPlaneError {
    let detail = format!("HTTP {status}: {message}");
    match status {
        408 | 409 | 429 | 500..=599 => ControlPlaneError::Transient(detail),
        _ => ControlPlaneError::Permanent(detail),
    }
}

/// Classify a google.rpc status code carried by a long-running operation.
pub fn classify_rpc_code(code: i64, message: &str) -> ControlPlaneError {
    let detail = format!("rpc code {code}: {message}");
    match code {
        // DEADLINE_EXCEEDED, RESOURCE_EXHAUSTED, ABORTED, INTERNAL, UNAVAILABLE
        4 | 8 | 10 | 13 | 14 => ControlPlaneError::Transient(detail),
        _ => ControlPlaneError::Permanent(detail),
    }
}
