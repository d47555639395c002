//! Logical types and field declarations.

use crate::error::{CodecError, CodecResult};
use crate::value::Value;
use std::fmt;
use std::sync::Arc;

/// The closed set of backend-agnostic field types.
#[derive(Debug, Clone, PartialEq)]
pub enum LogicalType {
    /// 64-bit signed integer.
    Integer,
    /// 64-bit IEEE float.
    Float,
    /// UTF-8 text.
    Text,
    /// Boolean.
    Boolean,
    /// Millisecond UTC timestamp.
    Timestamp,
    /// Opaque bytes.
    Binary,
    /// 128-bit UUID.
    Identifier,
    /// An embedded record with its own field set.
    Nested(Arc<Shape>),
    /// An ordered sequence of elements of one type.
    Sequence(Box<LogicalType>),
}

/// Payload-free discriminant of a [`LogicalType`], used for codec lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TypeTag {
    /// See [`LogicalType::Integer`].
    Integer,
    /// See [`LogicalType::Float`].
    Float,
    /// See [`LogicalType::Text`].
    Text,
    /// See [`LogicalType::Boolean`].
    Boolean,
    /// See [`LogicalType::Timestamp`].
    Timestamp,
    /// See [`LogicalType::Binary`].
    Binary,
    /// See [`LogicalType::Identifier`].
    Identifier,
    /// See [`LogicalType::Nested`].
    Nested,
    /// See [`LogicalType::Sequence`].
    Sequence,
}

impl TypeTag {
    /// Every tag, in declaration order.
    pub const ALL: [TypeTag; 9] = [
        TypeTag::Integer,
        TypeTag::Float,
        TypeTag::Text,
        TypeTag::Boolean,
        TypeTag::Timestamp,
        TypeTag::Binary,
        TypeTag::Identifier,
        TypeTag::Nested,
        TypeTag::Sequence,
    ];

    /// Lowercase name of the tag.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            TypeTag::Integer => "integer",
            TypeTag::Float => "float",
            TypeTag::Text => "text",
            TypeTag::Boolean => "boolean",
            TypeTag::Timestamp => "timestamp",
            TypeTag::Binary => "binary",
            TypeTag::Identifier => "identifier",
            TypeTag::Nested => "nested",
            TypeTag::Sequence => "sequence",
        }
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl LogicalType {
    /// Creates a nested type from a shape.
    #[must_use]
    pub fn nested(shape: Shape) -> Self {
        LogicalType::Nested(Arc::new(shape))
    }

    /// Creates a sequence type.
    #[must_use]
    pub fn sequence(element: LogicalType) -> Self {
        LogicalType::Sequence(Box::new(element))
    }

    /// Returns the payload-free tag.
    #[must_use]
    pub fn tag(&self) -> TypeTag {
        match self {
            LogicalType::Integer => TypeTag::Integer,
            LogicalType::Float => TypeTag::Float,
            LogicalType::Text => TypeTag::Text,
            LogicalType::Boolean => TypeTag::Boolean,
            LogicalType::Timestamp => TypeTag::Timestamp,
            LogicalType::Binary => TypeTag::Binary,
            LogicalType::Identifier => TypeTag::Identifier,
            LogicalType::Nested(_) => TypeTag::Nested,
            LogicalType::Sequence(_) => TypeTag::Sequence,
        }
    }

    /// Whether values of this type have a total order shared by every backend.
    #[must_use]
    pub fn is_ordered(&self) -> bool {
        matches!(
            self,
            LogicalType::Integer
                | LogicalType::Float
                | LogicalType::Text
                | LogicalType::Timestamp
                | LogicalType::Identifier
        )
    }

    /// Whether this is a single-valued (non-composite) type.
    #[must_use]
    pub fn is_scalar(&self) -> bool {
        !matches!(self, LogicalType::Nested(_) | LogicalType::Sequence(_))
    }

    /// Human-readable type name, e.g. `sequence<text>`.
    #[must_use]
    pub fn name(&self) -> String {
        match self {
            LogicalType::Nested(shape) => format!("nested<{}>", shape.name()),
            LogicalType::Sequence(element) => format!("sequence<{}>", element.name()),
            other => other.tag().name().to_string(),
        }
    }

    /// Checks that `value` inhabits this type, recursing into composites.
    ///
    /// `Null` is accepted at any level; nullability is enforced by the
    /// owning [`FieldDescriptor`].
    ///
    /// # Errors
    ///
    /// Returns a value conversion error naming the offending path.
    pub fn check(&self, value: &Value) -> CodecResult<()> {
        match (self, value) {
            (_, Value::Null)
            | (LogicalType::Integer, Value::Integer(_))
            | (LogicalType::Float, Value::Float(_))
            | (LogicalType::Text, Value::Text(_))
            | (LogicalType::Boolean, Value::Boolean(_))
            | (LogicalType::Timestamp, Value::Timestamp(_))
            | (LogicalType::Binary, Value::Binary(_))
            | (LogicalType::Identifier, Value::Identifier(_)) => Ok(()),
            (LogicalType::Nested(shape), Value::Record(record)) => shape.check(record),
            (LogicalType::Sequence(element), Value::Sequence(items)) => {
                for (index, item) in items.iter().enumerate() {
                    element
                        .check(item)
                        .map_err(|e| e.at_field(&format!("[{index}]")))?;
                }
                Ok(())
            }
            (ty, value) => Err(type_mismatch(ty, value)),
        }
    }
}

impl fmt::Display for LogicalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

/// Builds the standard "expected X, found Y" conversion error.
pub(crate) fn type_mismatch(ty: &LogicalType, value: &Value) -> CodecError {
    CodecError::value_conversion(format!(
        "expected {}, found {}",
        ty.name(),
        value.type_name()
    ))
}

/// Declaration of one field of an entity or nested record.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDescriptor {
    name: String,
    ty: LogicalType,
    nullable: bool,
    primary_key: bool,
    storage_name: Option<String>,
}

impl FieldDescriptor {
    /// Creates a non-nullable field.
    pub fn new(name: impl Into<String>, ty: LogicalType) -> Self {
        Self {
            name: name.into(),
            ty,
            nullable: false,
            primary_key: false,
            storage_name: None,
        }
    }

    /// Creates an integer field.
    pub fn integer(name: impl Into<String>) -> Self {
        Self::new(name, LogicalType::Integer)
    }

    /// Creates a float field.
    pub fn float(name: impl Into<String>) -> Self {
        Self::new(name, LogicalType::Float)
    }

    /// Creates a text field.
    pub fn text(name: impl Into<String>) -> Self {
        Self::new(name, LogicalType::Text)
    }

    /// Creates a boolean field.
    pub fn boolean(name: impl Into<String>) -> Self {
        Self::new(name, LogicalType::Boolean)
    }

    /// Creates a timestamp field.
    pub fn timestamp(name: impl Into<String>) -> Self {
        Self::new(name, LogicalType::Timestamp)
    }

    /// Creates a binary field.
    pub fn binary(name: impl Into<String>) -> Self {
        Self::new(name, LogicalType::Binary)
    }

    /// Creates an identifier (UUID) field.
    pub fn identifier(name: impl Into<String>) -> Self {
        Self::new(name, LogicalType::Identifier)
    }

    /// Creates a nested-record field.
    pub fn nested(name: impl Into<String>, shape: Shape) -> Self {
        Self::new(name, LogicalType::nested(shape))
    }

    /// Creates a sequence field.
    pub fn sequence(name: impl Into<String>, element: LogicalType) -> Self {
        Self::new(name, LogicalType::sequence(element))
    }

    /// Marks the field as nullable.
    #[must_use]
    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    /// Marks the field as the primary key.
    #[must_use]
    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    /// Overrides the column or document key the field is stored under.
    #[must_use]
    pub fn stored_as(mut self, storage_name: impl Into<String>) -> Self {
        self.storage_name = Some(storage_name.into());
        self
    }

    /// The logical field name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The declared logical type.
    pub fn logical_type(&self) -> &LogicalType {
        &self.ty
    }

    /// Whether the field accepts null.
    pub fn is_nullable(&self) -> bool {
        self.nullable
    }

    /// Whether this is the primary-key field.
    pub fn is_primary_key(&self) -> bool {
        self.primary_key
    }

    /// The column/key name, falling back to the field name.
    pub fn storage_name(&self) -> &str {
        self.storage_name.as_deref().unwrap_or(&self.name)
    }

    /// Checks a value against the type and nullability of this field.
    ///
    /// # Errors
    ///
    /// Returns a value conversion error carrying this field's name.
    pub fn check(&self, value: &Value) -> CodecResult<()> {
        if value.is_null() {
            return self.check_null();
        }
        self.ty.check(value).map_err(|e| e.at_field(&self.name))
    }

    pub(crate) fn check_null(&self) -> CodecResult<()> {
        if self.nullable {
            Ok(())
        } else {
            Err(CodecError::value_conversion("null is not allowed for a non-nullable field")
                .at_field(&self.name))
        }
    }
}

/// An ordered, named field set: the layout of a nested record or entity.
#[derive(Debug, Clone, PartialEq)]
pub struct Shape {
    name: String,
    fields: Vec<FieldDescriptor>,
}

impl Shape {
    /// Creates a shape.
    pub fn new(name: impl Into<String>, fields: Vec<FieldDescriptor>) -> Self {
        Self {
            name: name.into(),
            fields,
        }
    }

    /// The shape's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Fields in declaration order.
    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    /// Looks up a field by logical name.
    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name() == name)
    }

    /// Checks a record against this shape: known fields only, each valid.
    ///
    /// # Errors
    ///
    /// Returns a value conversion error for unknown fields, type mismatches
    /// or nulls in non-nullable fields.
    pub fn check(&self, record: &crate::Record) -> CodecResult<()> {
        for (name, _) in record.iter() {
            if self.field(name).is_none() {
                return Err(CodecError::value_conversion(format!(
                    "field is not declared by {}",
                    self.name
                ))
                .at_field(name));
            }
        }
        for field in &self.fields {
            field.check(record.get_or_null(field.name()))?;
        }
        Ok(())
    }
}
