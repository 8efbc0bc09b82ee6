use std::fmt;

use thiserror::Error;
use tokio_postgres::error::SqlState;

/// The application's error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// A malformed request: bad folder name, path separators, depth exceeded.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The request collides with existing state.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// A mutation was attempted on a protected (system) folder.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// A resource does not exist or is not owned by the caller.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Bucket accounting does not match what the store holds.
    #[error("Storage inconsistency: {0}")]
    StorageInconsistency(String),

    /// A unique constraint in the backing store rejected a write.
    ///
    /// Services re-map this to `Conflict` or retry; it is never meant to reach callers.
    #[error("Unique constraint violated: {0}")]
    UniqueViolation(String),

    /// A database error.
    #[error("Database error: {0}")]
    Database(tokio_postgres::Error),

    /// A connection pool error.
    #[error("Pool error: {0}")]
    Pool(#[from] deadpool_postgres::PoolError),

    /// An I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// An internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A `Result` type that uses `AppError` as the error type.
pub type Result<T> = std::result::Result<T, AppError>;

impl From<tokio_postgres::Error> for AppError {
    fn from(e: tokio_postgres::Error) -> Self {
        if let Some(db) = e.as_db_error() {
            if *db.code() == SqlState::UNIQUE_VIOLATION {
                let constraint = db.constraint().unwrap_or("unknown").to_string();
                return AppError::UniqueViolation(constraint);
            }
        }
        AppError::Database(e)
    }
}

/// Coarse classification of an `AppError` for callers that translate
/// failures into their own responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Conflict,
    Forbidden,
    NotFound,
    StorageInconsistency,
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::Validation => "validation",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Forbidden => "forbidden",
            ErrorKind::NotFound => "not_found",
            ErrorKind::StorageInconsistency => "storage_inconsistency",
            ErrorKind::Internal => "internal",
        };
        f.write_str(s)
    }
}

impl AppError {
    /// Returns the kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::Validation(_) => ErrorKind::Validation,
            AppError::Conflict(_) | AppError::UniqueViolation(_) => ErrorKind::Conflict,
            AppError::Forbidden(_) => ErrorKind::Forbidden,
            AppError::NotFound(_) => ErrorKind::NotFound,
            AppError::StorageInconsistency(_) => ErrorKind::StorageInconsistency,
            AppError::Database(_) | AppError::Pool(_) | AppError::Io(_) | AppError::Internal(_) => {
                ErrorKind::Internal
            }
        }
    }

    /// Logs the error at a level matching its kind.
    pub fn log(&self) {
        let kind = self.kind();
        match kind {
            ErrorKind::Internal | ErrorKind::StorageInconsistency => {
                tracing::error!(kind = %kind, "{}", self);
            }
            ErrorKind::Forbidden => tracing::warn!(kind = %kind, "{}", self),
            ErrorKind::Validation | ErrorKind::Conflict | ErrorKind::NotFound => {
                tracing::debug!(kind = %kind, "{}", self);
            }
        }
    }
}
