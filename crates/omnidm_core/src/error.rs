//! Error types for omnidm.

use omnidm_codec::CodecError;
use omnidm_driver::DriverError;
use std::fmt;
use thiserror::Error;

/// Result type for omnidm operations.
pub type OdmResult<T> = Result<T, OdmError>;

/// One reason a query or update was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryProblem {
    /// The offending field, as written by the caller.
    pub field: String,
    /// The operator involved, if any.
    pub operator: Option<String>,
    /// What is wrong.
    pub message: String,
}

impl QueryProblem {
    /// Creates a problem with no operator.
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            operator: None,
            message: message.into(),
        }
    }

    /// Attaches the operator involved.
    #[must_use]
    pub fn with_operator(mut self, operator: impl Into<String>) -> Self {
        self.operator = Some(operator.into());
        self
    }
}

impl fmt::Display for QueryProblem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.operator {
            Some(op) => write!(f, "`{}` ({op}): {}", self.field, self.message),
            None => write!(f, "`{}`: {}", self.field, self.message),
        }
    }
}

fn join_problems(problems: &[QueryProblem]) -> String {
    problems
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

fn field_suffix(field: &str) -> String {
    if field.is_empty() {
        String::new()
    } else {
        format!(" for `{field}`")
    }
}

/// Errors surfaced to callers of omnidm.
///
/// None of these are retried by the caller-facing API: transient driver
/// failures are retried internally and only surface as
/// [`OdmError::BackendExecution`] once the retry budget is spent.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum OdmError {
    /// An entity's declaration is unusable. Raised when the entity is first
    /// described and on every later attempt.
    #[error("invalid entity definition for {entity}: {message}")]
    InvalidEntityDefinition {
        /// Entity type name.
        entity: String,
        /// What is wrong with the declaration.
        message: String,
    },

    /// A query or update references unknown fields or misuses operators.
    #[error("invalid query: {}", join_problems(.problems))]
    InvalidQuery {
        /// Every problem found, in query order.
        problems: Vec<QueryProblem>,
    },

    /// A logical type has no codec for the target backend.
    #[error("unsupported type: {type_name} has no codec for the {backend} backend")]
    UnsupportedType {
        /// Name of the logical type.
        type_name: String,
        /// Backend family.
        backend: String,
    },

    /// A value could not be converted to or from its declared type.
    #[error("value conversion failed{}: {message}", field_suffix(.field))]
    ValueConversion {
        /// Dotted field path, empty if unknown.
        field: String,
        /// Description of the failure.
        message: String,
    },

    /// The backend rejected a write (unique or foreign key, check).
    #[error("constraint violation on {backend}: {message}")]
    ConstraintViolation {
        /// Registered backend name.
        backend: String,
        /// Native error message.
        message: String,
    },

    /// The backend failed to execute an operation.
    #[error("backend {backend} failed: {message}")]
    BackendExecution {
        /// Registered backend name.
        backend: String,
        /// Native error message.
        message: String,
    },

    /// The call's deadline passed.
    #[error("{operation} on {backend} exceeded its deadline")]
    Timeout {
        /// Registered backend name.
        backend: String,
        /// Operation that timed out.
        operation: String,
    },

    /// Backend configuration is malformed or inconsistent.
    #[error("invalid configuration: {message}")]
    Configuration {
        /// Description of the problem.
        message: String,
    },

    /// No backend is registered under the name.
    #[error("no backend registered as `{name}`")]
    UnknownBackend {
        /// The requested name.
        name: String,
    },

    /// The connection registry has been shut down.
    #[error("connection registry is closed")]
    RegistryClosed,
}

impl OdmError {
    /// Creates an invalid entity definition error.
    pub fn invalid_entity(entity: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidEntityDefinition {
            entity: entity.into(),
            message: message.into(),
        }
    }

    /// Creates an invalid query error from a single problem.
    pub fn invalid_query(problem: QueryProblem) -> Self {
        Self::InvalidQuery {
            problems: vec![problem],
        }
    }

    /// Creates a value conversion error.
    pub fn value_conversion(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ValueConversion {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Creates a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Creates an unknown backend error.
    pub fn unknown_backend(name: impl Into<String>) -> Self {
        Self::UnknownBackend { name: name.into() }
    }

    /// Creates a timeout error.
    pub fn timeout(backend: impl Into<String>, operation: impl Into<String>) -> Self {
        Self::Timeout {
            backend: backend.into(),
            operation: operation.into(),
        }
    }

    /// Classifies a driver failure for the named backend.
    pub fn from_driver(backend: &str, operation: &str, error: DriverError) -> Self {
        match error {
            DriverError::Constraint { message } => Self::ConstraintViolation {
                backend: backend.to_string(),
                message,
            },
            DriverError::Transient { message } | DriverError::Permanent { message } => {
                Self::BackendExecution {
                    backend: backend.to_string(),
                    message,
                }
            }
            DriverError::Timeout => Self::timeout(backend, operation),
            DriverError::Closed => Self::RegistryClosed,
        }
    }

    /// Whether this error means the deadline passed.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

impl From<CodecError> for OdmError {
    fn from(error: CodecError) -> Self {
        match error {
            CodecError::UnsupportedType { type_name, backend } => Self::UnsupportedType { type_name, backend },
            CodecError::ValueConversion { field, message } => Self::ValueConversion { field, message },
        }
    }
}
