//! Error type for the working copy metadata database

use std::path::PathBuf;

/// Result type for working copy database operations
pub type Result<T> = std::result::Result<T, WcError>;

/// Errors that can occur while reading or mutating working copy metadata
#[derive(Debug, thiserror::Error)]
pub enum WcError {
    #[error("The node '{0}' was not found")]
    PathNotFound(PathBuf),

    #[error("'{0}' is not a working copy")]
    NotWorkingCopy(PathBuf),

    #[error("Working copy format of '{path}' is not supported (format {format})")]
    UnsupportedFormat { path: PathBuf, format: i32 },

    #[error("Working copy '{0}' is too old; an upgrade is required")]
    UpgradeRequired(PathBuf),

    #[error("Working copy '{0}' needs cleanup; the work queue is not empty")]
    CleanupRequired(PathBuf),

    #[error("Corrupt working copy data for '{path}': {detail}")]
    Corrupt { path: PathBuf, detail: String },

    #[error("Working copy '{0}' locked")]
    Locked(PathBuf),

    #[error("Unexpected status for '{path}': {detail}")]
    UnexpectedStatus { path: PathBuf, detail: String },

    #[error("Only SHA1 checksums can be used as keys in the pristine file storage")]
    BadChecksumKind,

    #[error("Corrupt checksum value: '{0}'")]
    CorruptChecksum(String),

    #[error("Database error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Operation '{0}' is not implemented")]
    NotImplemented(&'static str),
}

impl WcError {
    /// Build a corrupt-store error for the given path.
    pub(crate) fn corrupt(path: impl Into<PathBuf>, detail: impl Into<String>) -> Self {
        WcError::Corrupt {
            path: path.into(),
            detail: detail.into(),
        }
    }

    /// Build an unexpected-status error for the given path.
    pub(crate) fn unexpected_status(path: impl Into<PathBuf>, detail: impl Into<String>) -> Self {
        WcError::UnexpectedStatus {
            path: path.into(),
            detail: detail.into(),
        }
    }

    /// Whether the underlying store rejected an insert due to a uniqueness
    /// violation. Used to map lock-table inserts onto `Locked`.
    pub(crate) fn is_constraint_violation(&self) -> bool {
        matches!(
            self,
            WcError::Store(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation
        )
    }
}
