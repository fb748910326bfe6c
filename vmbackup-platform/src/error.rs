//! Error types for the platform facade.

use thiserror::Error;

/// Errors that can occur while talking to the management platform.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlatformError {
    /// The platform rejected the request.
    #[error("Request rejected ({status}): {reason}")]
    Request {
        /// HTTP status code returned by the engine
        status: u16,
        /// Reason (and detail, when present) reported by the engine
        reason: String,
    },

    /// Failed to reach the platform.
    #[error("Failed to connect to platform: {0}")]
    Connection(String),

    /// VM was not found by name.
    #[error("VM not found: {0}")]
    VmNotFound(String),

    /// Some other referenced resource was not found.
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// The platform answered with something we could not decode.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for platform operations.
pub type Result<T> = std::result::Result<T, PlatformError>;
