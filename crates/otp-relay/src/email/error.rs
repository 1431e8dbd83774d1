//! Mailbox error types.
//!
//! Every variant is recoverable from the relay's point of view: a failed
//! cycle is abandoned and retried on the next tick.

use thiserror::Error;

/// Errors that can occur while talking to the mailbox.
#[derive(Error, Debug)]
pub enum EmailError {
    /// Failed to connect to the IMAP server.
    #[error("IMAP connection failed: {0}")]
    ConnectionFailed(String),

    /// TLS/SSL error during connection.
    #[error("TLS error: {0}")]
    TlsError(String),

    /// Authentication failed.
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Failed to retrieve credentials.
    #[error("Credentials not available: {0}")]
    CredentialsNotFound(String),

    /// IMAP protocol error.
    #[error("IMAP protocol error: {0}")]
    ProtocolError(String),

    /// Folder not found.
    #[error("IMAP folder '{0}' not found")]
    FolderNotFound(String),

    /// A message id returned by search could not be fetched.
    #[error("Message {0} could not be fetched: {1}")]
    FetchFailed(String, String),

    /// The raw bytes could not be parsed as a message at all.
    #[error("Failed to parse email: {0}")]
    ParseError(String),

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    /// Operation timed out.
    #[error("Operation timed out: {0}")]
    Timeout(String),
}

impl From<async_native_tls::Error> for EmailError {
    fn from(err: async_native_tls::Error) -> Self {
        EmailError::TlsError(err.to_string())
    }
}

impl EmailError {
    /// True when the session can no longer be trusted to be in sync with the
    /// server, so the rest of the cycle must be abandoned.
    pub fn is_session_fatal(&self) -> bool {
        matches!(
            self,
            EmailError::Timeout(_) | EmailError::ConnectionFailed(_) | EmailError::TlsError(_)
        )
    }
}

/// Result type for email operations.
pub type Result<T> = std::result::Result<T, EmailError>;
