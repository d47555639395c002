//! The field codec contract and record-level helpers built on it.

use crate::error::{CodecError, CodecResult};
use crate::registry::BackendKind;
use crate::schema::{FieldDescriptor, LogicalType};
use crate::value::{Record, Value};

/// Converts single values between the logical and a native representation.
///
/// Implementations are pure: no I/O and no shared state. For every
/// representable value `v` of type `t`,
/// `decode(&encode(&v, t)?, t)? == v`, including `Null`.
pub trait FieldCodec {
    /// The backend's native value type.
    type Native;

    /// Backend family this codec serves.
    const BACKEND: BackendKind;

    /// Encodes a logical value of type `ty`.
    ///
    /// # Errors
    ///
    /// Returns a value conversion error if `value` does not inhabit `ty` or
    /// cannot be represented natively.
    fn encode(value: &Value, ty: &LogicalType) -> CodecResult<Self::Native>;

    /// Decodes a native value into a logical value of type `ty`.
    ///
    /// # Errors
    ///
    /// Returns a value conversion error if the native value cannot be read
    /// as `ty`.
    fn decode(native: &Self::Native, ty: &LogicalType) -> CodecResult<Value>;
}

/// Keyed access to native field values (rows, documents, JSON objects).
pub trait NativeFields<N> {
    /// Returns the native value stored under `key`.
    fn native_field(&self, key: &str) -> Option<&N>;
}

impl<N> NativeFields<N> for [(String, N)] {
    fn native_field(&self, key: &str) -> Option<&N> {
        self.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }
}

impl<N> NativeFields<N> for Vec<(String, N)> {
    fn native_field(&self, key: &str) -> Option<&N> {
        self.as_slice().native_field(key)
    }
}

impl NativeFields<bson::Bson> for bson::Document {
    fn native_field(&self, key: &str) -> Option<&bson::Bson> {
        self.get(key)
    }
}

impl NativeFields<serde_json::Value> for serde_json::Map<String, serde_json::Value> {
    fn native_field(&self, key: &str) -> Option<&serde_json::Value> {
        self.get(key)
    }
}

/// Encodes one field's value with nullability enforced.
///
/// # Errors
///
/// Returns a value conversion error carrying the field name.
pub fn encode_field<C: FieldCodec>(field: &FieldDescriptor, value: &Value) -> CodecResult<C::Native> {
    if value.is_null() {
        field.check_null()?;
    }
    C::encode(value, field.logical_type()).map_err(|e| e.at_field(field.name()))
}

/// Decodes one field's native value; `None` (absent key) reads as null.
///
/// # Errors
///
/// Returns a value conversion error carrying the field name.
pub fn decode_field<C: FieldCodec>(
    field: &FieldDescriptor,
    native: Option<&C::Native>,
) -> CodecResult<Value> {
    let value = match native {
        Some(native) => C::decode(native, field.logical_type()).map_err(|e| e.at_field(field.name()))?,
        None => Value::Null,
    };
    if value.is_null() {
        field.check_null()?;
    }
    Ok(value)
}

/// Encodes a record field by field, keyed by storage name, in declaration order.
///
/// # Errors
///
/// Fails on the first unknown field, type mismatch or null violation.
pub fn encode_record<C: FieldCodec>(
    fields: &[FieldDescriptor],
    record: &Record,
) -> CodecResult<Vec<(String, C::Native)>> {
    reject_unknown(fields, record)?;
    fields
        .iter()
        .map(|field| {
            let native = encode_field::<C>(field, record.get_or_null(field.name()))?;
            Ok((field.storage_name().to_string(), native))
        })
        .collect()
}

/// Decodes a record from any keyed native source, by storage name.
///
/// # Errors
///
/// Fails on the first field that cannot be decoded.
pub fn decode_record<C, S>(fields: &[FieldDescriptor], source: &S) -> CodecResult<Record>
where
    C: FieldCodec,
    S: NativeFields<C::Native> + ?Sized,
{
    fields
        .iter()
        .map(|field| {
            let value = decode_field::<C>(field, source.native_field(field.storage_name()))?;
            Ok((field.name().to_string(), value))
        })
        .collect()
}

pub(crate) fn reject_unknown(fields: &[FieldDescriptor], record: &Record) -> CodecResult<()> {
    match record
        .iter()
        .find(|(name, _)| !fields.iter().any(|f| f.name() == *name))
    {
        Some((name, _)) => {
            Err(CodecError::value_conversion("field is not declared").at_field(name))
        }
        None => Ok(()),
    }
}
