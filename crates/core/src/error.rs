//! Error types for the tarball pipeline
//!
//! This module defines the error type shared by every capability boundary.
//! We use `thiserror` for automatic `Display` and `Error` trait implementations.

use std::fmt;
use std::io;
use thiserror::Error;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, Error>;

/// Why a run was asked to stop
///
/// Both causes abort the same way; the cause only changes log and report text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AbortCause {
    /// SIGTERM
    Terminate,
    /// SIGINT
    Interrupt,
}

impl fmt::Display for AbortCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbortCause::Terminate => f.write_str("terminate request"),
            AbortCause::Interrupt => f.write_str("interrupt request"),
        }
    }
}

/// Error types for the pipeline
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error (file operations, copies, stat)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Sidecar digest missing, unreadable or malformed
    #[error("Integrity error: {0}")]
    Integrity(String),

    /// Metadata key not recognized by the store
    #[error("Unknown metadata key: {0}")]
    UnknownKey(String),

    /// No dataset matches the lookup
    #[error("Dataset not found: {0}")]
    DatasetNotFound(String),

    /// Index template update failed for a template-layer reason
    #[error("Template error: {0}")]
    Template(String),

    /// Bulk index submission failed
    #[error("Index submission error: {0}")]
    Submission(String),

    /// Status report could not be posted
    #[error("Report error: {0}")]
    Report(String),

    /// Object store request failed
    #[error("Object store error: {0}")]
    Store(String),

    /// Ledger state could not be read or written
    #[error("Ledger error: {0}")]
    Ledger(String),

    /// A fatal interruption was raised while the call was in progress
    #[error("Aborted by {0}")]
    Aborted(AbortCause),
}

impl Error {
    /// True if this error carries a fatal interruption
    pub fn is_abort(&self) -> bool {
        matches!(self, Error::Aborted(_))
    }

    /// True if this is an I/O "not found" error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::Io(e) if e.kind() == io::ErrorKind::NotFound)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}
