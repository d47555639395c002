//! Relational (SQL) native values and their codec.

use crate::codec::FieldCodec;
use crate::error::{CodecError, CodecResult};
use crate::json::{parse_uuid, JsonCodec};
use crate::registry::BackendKind;
use crate::schema::{type_mismatch, LogicalType};
use crate::timestamp::Timestamp;
use crate::value::Value;
use bytes::Bytes;
use std::fmt;
use uuid::Uuid;

/// A value bound to, or read from, a SQL statement.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    /// SQL `NULL`.
    Null,
    /// Boolean; stored as `0`/`1` by engines without a boolean type.
    Bool(bool),
    /// 64-bit integer.
    Integer(i64),
    /// Double precision float.
    Real(f64),
    /// Text.
    Text(String),
    /// Binary large object.
    Blob(Vec<u8>),
}

impl SqlValue {
    /// Returns true for `NULL`.
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    /// Storage class name, for error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            SqlValue::Null => "NULL",
            SqlValue::Bool(_) => "BOOLEAN",
            SqlValue::Integer(_) => "INTEGER",
            SqlValue::Real(_) => "REAL",
            SqlValue::Text(_) => "TEXT",
            SqlValue::Blob(_) => "BLOB",
        }
    }
}

impl fmt::Display for SqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlValue::Null => f.write_str("NULL"),
            SqlValue::Bool(b) => write!(f, "{b}"),
            SqlValue::Integer(i) => write!(f, "{i}"),
            SqlValue::Real(r) => write!(f, "{r}"),
            SqlValue::Text(s) => write!(f, "{s:?}"),
            SqlValue::Blob(b) => write!(f, "<{} bytes>", b.len()),
        }
    }
}

/// Codec between logical values and [`SqlValue`].
///
/// | logical | column value |
/// |---|---|
/// | timestamp | `INTEGER` epoch milliseconds (RFC 3339 `TEXT` accepted on read) |
/// | identifier | hyphenated `TEXT` (16-byte `BLOB` accepted on read) |
/// | boolean | `BOOLEAN` (`INTEGER` 0/1 accepted on read) |
/// | nested, sequence | JSON `TEXT` via [`JsonCodec`] |
#[derive(Debug, Clone, Copy, Default)]
pub struct RelationalCodec;

impl FieldCodec for RelationalCodec {
    type Native = SqlValue;
    const BACKEND: BackendKind = BackendKind::Relational;

    fn encode(value: &Value, ty: &LogicalType) -> CodecResult<SqlValue> {
        Ok(match (ty, value) {
            (_, Value::Null) => SqlValue::Null,
            (LogicalType::Integer, Value::Integer(i)) => SqlValue::Integer(*i),
            // SQL engines store NaN as NULL, which would not read back.
            (LogicalType::Float, Value::Float(f)) if f.is_nan() => {
                return Err(CodecError::value_conversion("NaN cannot be stored in a SQL column"))
            }
            (LogicalType::Float, Value::Float(f)) => SqlValue::Real(*f),
            (LogicalType::Text, Value::Text(s)) => SqlValue::Text(s.clone()),
            (LogicalType::Boolean, Value::Boolean(b)) => SqlValue::Bool(*b),
            (LogicalType::Timestamp, Value::Timestamp(ts)) => SqlValue::Integer(ts.as_millis()),
            (LogicalType::Binary, Value::Binary(bytes)) => SqlValue::Blob(bytes.to_vec()),
            (LogicalType::Identifier, Value::Identifier(id)) => SqlValue::Text(id.to_string()),
            (LogicalType::Nested(_), Value::Record(_)) | (LogicalType::Sequence(_), Value::Sequence(_)) => {
                let json = JsonCodec::encode(value, ty)?;
                SqlValue::Text(json.to_string())
            }
            (ty, value) => return Err(type_mismatch(ty, value)),
        })
    }

    fn decode(native: &SqlValue, ty: &LogicalType) -> CodecResult<Value> {
        Ok(match (ty, native) {
            (_, SqlValue::Null) => Value::Null,
            (LogicalType::Integer, SqlValue::Integer(i)) => Value::Integer(*i),
            (LogicalType::Float, SqlValue::Real(f)) => Value::Float(*f),
            #[allow(clippy::cast_precision_loss)]
            (LogicalType::Float, SqlValue::Integer(i)) => Value::Float(*i as f64),
            (LogicalType::Text, SqlValue::Text(s)) => Value::Text(s.clone()),
            (LogicalType::Boolean, SqlValue::Bool(b)) => Value::Boolean(*b),
            (LogicalType::Boolean, SqlValue::Integer(0)) => Value::Boolean(false),
            (LogicalType::Boolean, SqlValue::Integer(1)) => Value::Boolean(true),
            (LogicalType::Timestamp, SqlValue::Integer(ms)) => Value::Timestamp(Timestamp::from_millis(*ms)),
            (LogicalType::Timestamp, SqlValue::Text(s)) => Value::Timestamp(Timestamp::parse_rfc3339(s)?),
            (LogicalType::Binary, SqlValue::Blob(b)) => Value::Binary(Bytes::from(b.clone())),
            (LogicalType::Identifier, SqlValue::Text(s)) => Value::Identifier(parse_uuid(s)?),
            (LogicalType::Identifier, SqlValue::Blob(b)) => Value::Identifier(
                Uuid::from_slice(b)
                    .map_err(|_| CodecError::value_conversion(format!("{}-byte blob is not an identifier", b.len())))?,
            ),
            (LogicalType::Nested(_) | LogicalType::Sequence(_), SqlValue::Text(s)) => {
                let json: serde_json::Value = serde_json::from_str(s)
                    .map_err(|e| CodecError::value_conversion(format!("stored JSON is malformed: {e}")))?;
                JsonCodec::decode(&json, ty)?
            }
            (ty, other) => {
                return Err(CodecError::value_conversion(format!(
                    "cannot read {} column value {other} as {}",
                    other.kind(),
                    ty.name()
                )))
            }
        })
    }
}
