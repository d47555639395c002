//! Error types for driver operations.

use thiserror::Error;

/// Result type for driver operations.
pub type DriverResult<T> = Result<T, DriverError>;

/// Failures reported across the driver boundary.
///
/// Drivers classify every failure once, at the point where they still have
/// the native error code; callers only ever inspect the class.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DriverError {
    /// A connection-level failure that may succeed if retried.
    #[error("transient failure: {message}")]
    Transient {
        /// Native error description.
        message: String,
    },

    /// The store rejected a write (unique key, foreign key, check).
    #[error("constraint violation: {message}")]
    Constraint {
        /// Native error description.
        message: String,
    },

    /// Any other failure; retrying will not help.
    #[error("{message}")]
    Permanent {
        /// Native error description.
        message: String,
    },

    /// The call's deadline passed before it completed.
    #[error("deadline exceeded")]
    Timeout,

    /// The connection or store has been shut down.
    #[error("connection is closed")]
    Closed,
}

impl DriverError {
    /// Creates a transient error.
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient {
            message: message.into(),
        }
    }

    /// Creates a constraint violation.
    pub fn constraint(message: impl Into<String>) -> Self {
        Self::Constraint {
            message: message.into(),
        }
    }

    /// Creates a permanent error.
    pub fn permanent(message: impl Into<String>) -> Self {
        Self::Permanent {
            message: message.into(),
        }
    }

    /// Returns true if the operation may be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }
}
