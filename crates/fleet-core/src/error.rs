//! Error types for fleet configuration and pre-flight validation.

use thiserror::Error;

/// Result type alias for registry and configuration operations.
pub type FleetResult<T> = Result<T, FleetError>;

/// Errors that abort a run before any mutation is issued.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FleetError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("unknown service: {0}")]
    UnknownService(String),

    #[error("invalid retention count {0}: at least one revision must be kept")]
    InvalidRetention(usize),
}
