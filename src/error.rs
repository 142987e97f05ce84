use std::error::Error;
use std::fmt;

/// The primary error type for the catalog.
///
/// Scanning, archive introspection, reconciliation and the SQLite store all
/// report through this enum so a failed sync surfaces as one error to the
/// operator.
#[derive(Debug)]
pub enum CatalogError {
    /// For internal failures that are not expected to be handled by the caller.
    Internal(anyhow::Error),
    /// A path could not be listed, opened or read.
    Io(String),
    /// Image bytes are not a supported format or are corrupt.
    Decode(String),
    /// An archive index is out of range, or a referenced row does not exist.
    NotFound(String),
    /// An opaque failure reported by the catalog store.
    Persistence(String),
    /// The operation conflicts with the current state (e.g. a sync is already running).
    Conflict(String),
    /// Caller input was rejected before any work started.
    InvalidInput(String),
    /// The operation was cancelled before it completed.
    Cancelled,
}

impl fmt::Display for CatalogError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CatalogError::Internal(e) => write!(f, "Internal error: {}", e),
            CatalogError::Io(msg) => write!(f, "I/O error: {}", msg),
            CatalogError::Decode(msg) => write!(f, "Decode error: {}", msg),
            CatalogError::NotFound(msg) => write!(f, "Not found: {}", msg),
            CatalogError::Persistence(msg) => write!(f, "Persistence error: {}", msg),
            CatalogError::Conflict(msg) => write!(f, "Conflict: {}", msg),
            CatalogError::InvalidInput(msg) => write!(f, "Invalid input: {}", msg),
            CatalogError::Cancelled => write!(f, "Operation cancelled"),
        }
    }
}

impl Error for CatalogError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            CatalogError::Internal(e) => Some(e.as_ref()),
            _ => None,
        }
    }
}

impl CatalogError {
    /// Short machine-readable code. Scan warning events carry it as their `code`.
    pub fn code(&self) -> &'static str {
        match self {
            CatalogError::Internal(_) => "internal",
            CatalogError::Io(_) => "io",
            CatalogError::Decode(_) => "decode",
            CatalogError::NotFound(_) => "not_found",
            CatalogError::Persistence(_) => "persistence",
            CatalogError::Conflict(_) => "conflict",
            CatalogError::InvalidInput(_) => "invalid_input",
            CatalogError::Cancelled => "cancelled",
        }
    }
}

impl From<anyhow::Error> for CatalogError {
    fn from(err: anyhow::Error) -> Self {
        CatalogError::Internal(err)
    }
}

impl From<sqlx::Error> for CatalogError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => CatalogError::NotFound("Record not found".to_string()),
            sqlx::Error::Database(db_err) => {
                CatalogError::Persistence(format!("Database error: {}", db_err.message()))
            }
            _ => CatalogError::Persistence(format!("Database error: {}", err)),
        }
    }
}

impl From<std::io::Error> for CatalogError {
    fn from(err: std::io::Error) -> Self {
        CatalogError::Io(format!("{}: {}", err.kind(), err))
    }
}

impl From<zip::result::ZipError> for CatalogError {
    fn from(err: zip::result::ZipError) -> Self {
        match err {
            zip::result::ZipError::Io(e) => e.into(),
            zip::result::ZipError::FileNotFound => {
                CatalogError::NotFound("Archive entry not found".to_string())
            }
            other => CatalogError::Io(format!("invalid archive: {}", other)),
        }
    }
}

impl From<image::ImageError> for CatalogError {
    fn from(err: image::ImageError) -> Self {
        match err {
            image::ImageError::IoError(e) => e.into(),
            other => CatalogError::Decode(other.to_string()),
        }
    }
}

impl From<tokio::task::JoinError> for CatalogError {
    fn from(err: tokio::task::JoinError) -> Self {
        if err.is_cancelled() {
            CatalogError::Cancelled
        } else {
            CatalogError::Internal(anyhow::anyhow!("worker task panicked: {}", err))
        }
    }
}

/// A type alias for `Result<T, CatalogError>`, used throughout the crate.
pub type CatalogResult<T> = Result<T, CatalogError>;

/// An extension trait for `Option` that provides a convenient way to convert
/// an `Option` to a `Result` with a `NotFound` error.
pub trait OptionExt<T> {
    /// Converts an `Option<T>` to a `Result<T, CatalogError>`.
    ///
    /// # Arguments
    ///
    /// * `entity` - A string describing the entity that was not found.
    fn ok_or_not_found(self, entity: &str) -> CatalogResult<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_not_found(self, entity: &str) -> CatalogResult<T> {
        self.ok_or_else(|| CatalogError::NotFound(format!("{} not found", entity)))
    }
}
