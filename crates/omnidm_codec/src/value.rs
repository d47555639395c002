//! Backend-agnostic logical values.

use crate::error::{CodecError, CodecResult};
use crate::schema::TypeTag;
use crate::timestamp::Timestamp;
use bytes::Bytes;
use std::collections::BTreeMap;
use uuid::Uuid;

/// A logical value as seen by application code.
///
/// Every backend codec converts to and from this representation, so it is
/// the common currency between entities, queries and adapters.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Absent value.
    Null,
    /// Signed integer.
    Integer(i64),
    /// Floating point number.
    Float(f64),
    /// UTF-8 text.
    Text(String),
    /// Boolean.
    Boolean(bool),
    /// Millisecond UTC timestamp.
    Timestamp(Timestamp),
    /// Opaque bytes.
    Binary(Bytes),
    /// UUID.
    Identifier(Uuid),
    /// Embedded record.
    Record(Record),
    /// Ordered sequence.
    Sequence(Vec<Value>),
}

impl Value {
    /// Returns true if this is `Null`.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// The type tag this value inhabits, `None` for `Null`.
    pub fn tag(&self) -> Option<TypeTag> {
        match self {
            Value::Null => None,
            Value::Integer(_) => Some(TypeTag::Integer),
            Value::Float(_) => Some(TypeTag::Float),
            Value::Text(_) => Some(TypeTag::Text),
            Value::Boolean(_) => Some(TypeTag::Boolean),
            Value::Timestamp(_) => Some(TypeTag::Timestamp),
            Value::Binary(_) => Some(TypeTag::Binary),
            Value::Identifier(_) => Some(TypeTag::Identifier),
            Value::Record(_) => Some(TypeTag::Nested),
            Value::Sequence(_) => Some(TypeTag::Sequence),
        }
    }

    /// Name of the value's kind, for error messages.
    pub fn type_name(&self) -> &'static str {
        self.tag().map_or("null", TypeTag::name)
    }

    /// Creates a binary value.
    pub fn binary(bytes: impl Into<Bytes>) -> Self {
        Value::Binary(bytes.into())
    }

    /// Creates a sequence from any iterator of convertible items.
    pub fn sequence<I, T>(items: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Value>,
    {
        Value::Sequence(items.into_iter().map(Into::into).collect())
    }

    /// Returns the integer if this is an `Integer`.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Returns the float if this is a `Float`.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Returns the text if this is `Text`.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the boolean if this is a `Boolean`.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Returns the record if this is a `Record`.
    pub fn as_record(&self) -> Option<&Record> {
        match self {
            Value::Record(r) => Some(r),
            _ => None,
        }
    }

    /// Returns the items if this is a `Sequence`.
    pub fn as_sequence(&self) -> Option<&[Value]> {
        match self {
            Value::Sequence(items) => Some(items),
            _ => None,
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(i64::from(v))
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::Integer(i64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<&String> for Value {
    fn from(v: &String) -> Self {
        Value::Text(v.clone())
    }
}

impl From<Timestamp> for Value {
    fn from(v: Timestamp) -> Self {
        Value::Timestamp(v)
    }
}

impl From<Bytes> for Value {
    fn from(v: Bytes) -> Self {
        Value::Binary(v)
    }
}

impl From<Uuid> for Value {
    fn from(v: Uuid) -> Self {
        Value::Identifier(v)
    }
}

impl From<Record> for Value {
    fn from(v: Record) -> Self {
        Value::Record(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::Sequence(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

/// A set of named logical values: one entity instance or nested record.
///
/// Field order is not significant; descriptors define storage order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    fields: BTreeMap<String, Value>,
}

static NULL: Value = Value::Null;

impl Record {
    /// Creates an empty record.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a field, builder style.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Sets a field, returning the previous value.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.fields.insert(name.into(), value.into())
    }

    /// Removes a field.
    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.fields.remove(name)
    }

    /// Returns a field's value if present.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Returns a field's value, treating an absent field as `Null`.
    pub fn get_or_null(&self, name: &str) -> &Value {
        self.fields.get(name).unwrap_or(&NULL)
    }

    /// Whether a field is present.
    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    /// Number of present fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether the record has no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Iterates fields in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Extracts a typed field, treating absence as `Null`.
    ///
    /// # Errors
    ///
    /// Returns a value conversion error naming the field if the value does
    /// not convert to `T`.
    pub fn field<T: FromValue>(&self, name: &str) -> CodecResult<T> {
        T::from_value(self.get_or_null(name)).map_err(|e| e.at_field(name))
    }
}

impl FromIterator<(String, Value)> for Record {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for Record {
    type Item = (String, Value);
    type IntoIter = std::collections::btree_map::IntoIter<String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.into_iter()
    }
}

/// Conversion from a logical value into a Rust type.
pub trait FromValue: Sized {
    /// Converts a value.
    ///
    /// # Errors
    ///
    /// Returns a value conversion error on a kind mismatch or overflow.
    fn from_value(value: &Value) -> CodecResult<Self>;
}

fn expected(kind: &str, value: &Value) -> CodecError {
    CodecError::value_conversion(format!("expected {kind}, found {}", value.type_name()))
}

impl FromValue for Value {
    fn from_value(value: &Value) -> CodecResult<Self> {
        Ok(value.clone())
    }
}

impl FromValue for i64 {
    fn from_value(value: &Value) -> CodecResult<Self> {
        value.as_integer().ok_or_else(|| expected("integer", value))
    }
}

impl FromValue for i32 {
    fn from_value(value: &Value) -> CodecResult<Self> {
        let wide = i64::from_value(value)?;
        i32::try_from(wide)
            .map_err(|_| CodecError::value_conversion(format!("{wide} overflows a 32-bit integer")))
    }
}

impl FromValue for f64 {
    fn from_value(value: &Value) -> CodecResult<Self> {
        value.as_float().ok_or_else(|| expected("float", value))
    }
}

impl FromValue for bool {
    fn from_value(value: &Value) -> CodecResult<Self> {
        value.as_bool().ok_or_else(|| expected("boolean", value))
    }
}

impl FromValue for String {
    fn from_value(value: &Value) -> CodecResult<Self> {
        value
            .as_text()
            .map(str::to_string)
            .ok_or_else(|| expected("text", value))
    }
}

impl FromValue for Timestamp {
    fn from_value(value: &Value) -> CodecResult<Self> {
        match value {
            Value::Timestamp(ts) => Ok(*ts),
            other => Err(expected("timestamp", other)),
        }
    }
}

impl FromValue for Bytes {
    fn from_value(value: &Value) -> CodecResult<Self> {
        match value {
            Value::Binary(b) => Ok(b.clone()),
            other => Err(expected("binary", other)),
        }
    }
}

impl FromValue for Uuid {
    fn from_value(value: &Value) -> CodecResult<Self> {
        match value {
            Value::Identifier(id) => Ok(*id),
            other => Err(expected("identifier", other)),
        }
    }
}

impl FromValue for Record {
    fn from_value(value: &Value) -> CodecResult<Self> {
        value.as_record().cloned().ok_or_else(|| expected("record", value))
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: &Value) -> CodecResult<Self> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

impl<T: FromValue> FromValue for Vec<T> {
    fn from_value(value: &Value) -> CodecResult<Self> {
        let items = value.as_sequence().ok_or_else(|| expected("sequence", value))?;
        items
            .iter()
            .enumerate()
            .map(|(i, item)| T::from_value(item).map_err(|e| e.at_field(&format!("[{i}]"))))
            .collect()
    }
}
