//! Error types for the codec crate.

use thiserror::Error;

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors that can occur while converting values between representations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// No codec is registered for a logical type on the target backend.
    #[error("unsupported type: {type_name} has no codec for the {backend} backend")]
    UnsupportedType {
        /// Name of the logical type.
        type_name: String,
        /// Backend family the conversion targeted.
        backend: String,
    },

    /// A value could not be converted to or from its declared logical type.
    #[error("value conversion failed{}: {message}", field_suffix(.field))]
    ValueConversion {
        /// Dotted path of the field being converted, empty at the leaf.
        field: String,
        /// Description of the failure.
        message: String,
    },
}

fn field_suffix(field: &str) -> String {
    if field.is_empty() {
        String::new()
    } else {
        format!(" for `{field}`")
    }
}

impl CodecError {
    /// Creates an unsupported type error.
    pub fn unsupported_type(type_name: impl Into<String>, backend: impl Into<String>) -> Self {
        Self::UnsupportedType {
            type_name: type_name.into(),
            backend: backend.into(),
        }
    }

    /// Creates a value conversion error with no field context.
    pub fn value_conversion(message: impl Into<String>) -> Self {
        Self::ValueConversion {
            field: String::new(),
            message: message.into(),
        }
    }

    /// Prefixes the field path of a conversion error with `name`.
    ///
    /// Errors are raised at the leaf and gain context as they bubble up
    /// through nested records, yielding paths like `address.city`.
    #[must_use]
    pub fn at_field(self, name: &str) -> Self {
        match self {
            Self::ValueConversion { field, message } => {
                let field = if field.is_empty() {
                    name.to_string()
                } else if field.starts_with('[') {
                    format!("{name}{field}")
                } else {
                    format!("{name}.{field}")
                };
                Self::ValueConversion { field, message }
            }
            other => other,
        }
    }

    /// Returns the field path this error refers to, if any.
    pub fn field(&self) -> Option<&str> {
        match self {
            Self::ValueConversion { field, .. } if !field.is_empty() => Some(field),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_paths_accumulate_outwards() {
        let err = CodecError::value_conversion("bad")
            .at_field("city")
            .at_field("address");
        assert_eq!(err.field(), Some("address.city"));
        assert_eq!(
            err.to_string(),
            "value conversion failed for `address.city`: bad"
        );
    }

    #[test]
    fn sequence_indices_attach_without_dot() {
        let err = CodecError::value_conversion("bad")
            .at_field("[2]")
            .at_field("tags");
        assert_eq!(err.field(), Some("tags[2]"));
    }

    #[test]
    fn unsupported_type_message() {
        let err = CodecError::unsupported_type("sequence<integer>", "relational");
        assert_eq!(
            err.to_string(),
            "unsupported type: sequence<integer> has no codec for the relational backend"
        );
        assert_eq!(err.field(), None);
    }
}
