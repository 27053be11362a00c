//! Error types for cascadefs

use std::io;

use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in any tier of a cache cascade
#[derive(Error, Debug)]
pub enum Error {
    /// Name is absent from the tier
    #[error("file not found: {path}")]
    NotFound { path: String },

    /// Write-once violation
    #[error("file already exists: {path}")]
    AlreadyExists { path: String },

    /// Write attempted on a frozen or read-only tier
    #[error("filesystem is read-only, cannot modify: {path}")]
    ReadOnly { path: String },

    /// Malformed path, or a file where a directory was expected
    #[error("invalid path {path}: {reason}")]
    InvalidPath { path: String, reason: String },

    /// Underlying medium failure
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Optional capability not provided by this tier
    #[error("operation not supported by tier: {op}")]
    Unsupported { op: &'static str },

    /// Internal consistency violation
    #[error("internal invariant violated: {0}")]
    Invariant(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    pub fn not_found(path: impl Into<String>) -> Self {
        Error::NotFound { path: path.into() }
    }

    pub fn already_exists(path: impl Into<String>) -> Self {
        Error::AlreadyExists { path: path.into() }
    }

    pub fn read_only(path: impl Into<String>) -> Self {
        Error::ReadOnly { path: path.into() }
    }

    pub fn invalid_path(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::InvalidPath {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Map an I/O error against `path`, keeping the not-found and
    /// already-exists kinds distinguishable from medium failures.
    pub fn from_io(path: impl Into<String>, err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => Error::NotFound { path: path.into() },
            io::ErrorKind::AlreadyExists => Error::AlreadyExists { path: path.into() },
            _ => Error::Io(err),
        }
    }

    /// True when the error only means "this tier does not have it".
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }
}
