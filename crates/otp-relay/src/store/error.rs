//! Entitlement store error types.

use std::path::PathBuf;

use thiserror::Error;

/// Errors from entitlement store operations.
#[derive(Error, Debug)]
pub enum StoreError {
    /// No redeem code with this value exists.
    #[error("Redeem code '{0}' not found")]
    NotFound(String),

    /// The redeem code was already used.
    #[error("Redeem code '{0}' has already been used")]
    AlreadyUsed(String),

    /// Used codes are kept as an audit trail and cannot be deleted.
    #[error("Redeem code '{0}' has been used and cannot be deleted")]
    CodeInUse(String),

    /// The identity already holds permanent access, so a timed code would
    /// only shorten it.
    #[error("'{0}' already has permanent access")]
    AlreadyPermanent(String),

    /// A duration that is not a positive number of days, or overflows.
    #[error("Invalid number of days: {0}")]
    InvalidDays(i64),

    /// Reading or writing a store document failed.
    #[error("Persistence error for '{path}': {source}")]
    Persistence {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A store document exists but is not valid JSON of the expected shape.
    #[error("Corrupt store document '{path}': {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Random source failure while generating a code.
    #[error("Random number generation failed: {0}")]
    Random(String),

    /// The store lock was poisoned.
    #[error("Entitlement store lock poisoned")]
    LockPoisoned,
}

impl StoreError {
    /// True for rejections caused by user input rather than a fault.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            StoreError::NotFound(_)
                | StoreError::AlreadyUsed(_)
                | StoreError::CodeInUse(_)
                | StoreError::AlreadyPermanent(_)
                | StoreError::InvalidDays(_)
        )
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
