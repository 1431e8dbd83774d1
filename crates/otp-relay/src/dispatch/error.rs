//! Dispatch error types.

use thiserror::Error;

/// Errors from delivering a message to one recipient.
#[derive(Error, Debug)]
pub enum DispatchError {
    /// The HTTP request failed before a response arrived.
    #[error("HTTP request failed: {0}")]
    Http(String),

    /// The API answered with `ok: false`.
    #[error("{method} rejected: {description}")]
    Api {
        method: &'static str,
        description: String,
    },

    /// The response body could not be decoded.
    #[error("Invalid {method} response: {reason}")]
    InvalidResponse {
        method: &'static str,
        reason: String,
    },

    /// Staging a document on disk failed.
    #[error("Failed to stage document '{filename}': {source}")]
    Staging {
        filename: String,
        #[source]
        source: std::io::Error,
    },
}

/// Result type for dispatch operations.
pub type Result<T> = std::result::Result<T, DispatchError>;
