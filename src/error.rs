//! Error types for db-offload.
//!
//! This module defines the crate-level error using `thiserror`. Driver errors
//! raised inside a worker thread are carried through unchanged, so callers can
//! match on the original [`DriverError`] exactly as if they had called the
//! driver directly.

use crate::driver::DriverError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum OffloadError {
    /// An error raised by the underlying driver, passed through as-is.
    #[error(transparent)]
    Driver(#[from] DriverError),

    #[error("Worker pool '{pool}' is shut down")]
    PoolClosed { pool: String },

    #[error("Invalid worker pool size: {size} (must be at least 1)")]
    InvalidPoolSize { size: usize },

    #[error("Failed to spawn worker thread for pool '{pool}': {message}")]
    WorkerSpawn { pool: String, message: String },

    #[error("Dialect not found: {name}")]
    DialectNotFound { name: String },

    #[error("Invalid argument: {message}")]
    InvalidArgument { message: String },
}

impl OffloadError {
    /// Create a pool closed error.
    pub fn pool_closed(pool: impl Into<String>) -> Self {
        Self::PoolClosed { pool: pool.into() }
    }

    /// Create an invalid pool size error.
    pub fn invalid_pool_size(size: usize) -> Self {
        Self::InvalidPoolSize { size }
    }

    /// Create a worker spawn error.
    pub fn worker_spawn(pool: impl Into<String>, err: std::io::Error) -> Self {
        Self::WorkerSpawn {
            pool: pool.into(),
            message: err.to_string(),
        }
    }

    /// Create a dialect not found error.
    pub fn dialect_not_found(name: impl Into<String>) -> Self {
        Self::DialectNotFound { name: name.into() }
    }

    /// Create an invalid argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// The driver error, if this error came from the driver.
    pub fn as_driver(&self) -> Option<&DriverError> {
        match self {
            Self::Driver(err) => Some(err),
            _ => None,
        }
    }
}

/// Result type alias for offloaded operations.
pub type OffloadResult<T> = Result<T, OffloadError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::DriverErrorKind;

    #[test]
    fn test_driver_error_is_transparent() {
        let driver = DriverError::operational("database is locked");
        let err = OffloadError::from(driver.clone());
        assert_eq!(err.to_string(), driver.to_string());
        assert_eq!(err.as_driver(), Some(&driver));
    }

    #[test]
    fn test_error_display() {
        let err = OffloadError::pool_closed("db-offload-default");
        assert!(err.to_string().contains("db-offload-default"));
        assert!(err.as_driver().is_none());

        let err = OffloadError::invalid_pool_size(0);
        assert!(err.to_string().contains("at least 1"));
    }

    #[test]
    fn test_driver_kind_preserved() {
        let err: OffloadError = DriverError::integrity("UNIQUE constraint failed").into();
        match err {
            OffloadError::Driver(e) => assert_eq!(e.kind, DriverErrorKind::Integrity),
            other => panic!("unexpected error: {other}"),
        }
    }
}
