//! JSON representation, used for composite values embedded in relational columns.

use crate::codec::{decode_record, encode_record, FieldCodec};
use crate::error::{CodecError, CodecResult};
use crate::registry::BackendKind;
use crate::schema::{type_mismatch, LogicalType};
use crate::timestamp::Timestamp;
use crate::value::Value;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use bytes::Bytes;
use serde_json::{Map, Number, Value as Json};
use uuid::Uuid;

/// Codec between logical values and `serde_json` values.
///
/// Timestamps are epoch milliseconds, binary is standard base64 and
/// identifiers are hyphenated UUID strings. Decoding is driven by the
/// declared type, so these encodings are unambiguous.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl FieldCodec for JsonCodec {
    type Native = Json;
    const BACKEND: BackendKind = BackendKind::Relational;

    fn encode(value: &Value, ty: &LogicalType) -> CodecResult<Json> {
        Ok(match (ty, value) {
            (_, Value::Null) => Json::Null,
            (LogicalType::Integer, Value::Integer(i)) => Json::from(*i),
            (LogicalType::Float, Value::Float(f)) => Number::from_f64(*f)
                .map(Json::Number)
                .ok_or_else(|| CodecError::value_conversion(format!("{f} has no JSON representation")))?,
            (LogicalType::Text, Value::Text(s)) => Json::String(s.clone()),
            (LogicalType::Boolean, Value::Boolean(b)) => Json::Bool(*b),
            (LogicalType::Timestamp, Value::Timestamp(ts)) => Json::from(ts.as_millis()),
            (LogicalType::Binary, Value::Binary(bytes)) => Json::String(STANDARD.encode(bytes)),
            (LogicalType::Identifier, Value::Identifier(id)) => Json::String(id.to_string()),
            (LogicalType::Nested(shape), Value::Record(record)) => {
                let entries = encode_record::<Self>(shape.fields(), record)?;
                Json::Object(entries.into_iter().collect())
            }
            (LogicalType::Sequence(element), Value::Sequence(items)) => Json::Array(
                items
                    .iter()
                    .enumerate()
                    .map(|(i, item)| Self::encode(item, element).map_err(|e| e.at_field(&format!("[{i}]"))))
                    .collect::<CodecResult<_>>()?,
            ),
            (ty, value) => return Err(type_mismatch(ty, value)),
        })
    }

    fn decode(native: &Json, ty: &LogicalType) -> CodecResult<Value> {
        Ok(match (ty, native) {
            (_, Json::Null) => Value::Null,
            (LogicalType::Integer, Json::Number(n)) => Value::Integer(n.as_i64().ok_or_else(|| {
                CodecError::value_conversion(format!("{n} does not fit a 64-bit integer"))
            })?),
            (LogicalType::Float, Json::Number(n)) => Value::Float(
                n.as_f64()
                    .ok_or_else(|| CodecError::value_conversion(format!("{n} is not a float")))?,
            ),
            (LogicalType::Text, Json::String(s)) => Value::Text(s.clone()),
            (LogicalType::Boolean, Json::Bool(b)) => Value::Boolean(*b),
            (LogicalType::Timestamp, Json::Number(n)) => {
                Value::Timestamp(Timestamp::from_millis(n.as_i64().ok_or_else(|| {
                    CodecError::value_conversion(format!("{n} is not an epoch millisecond count"))
                })?))
            }
            (LogicalType::Timestamp, Json::String(s)) => Value::Timestamp(Timestamp::parse_rfc3339(s)?),
            (LogicalType::Binary, Json::String(s)) => Value::Binary(Bytes::from(
                STANDARD
                    .decode(s)
                    .map_err(|e| CodecError::value_conversion(format!("invalid base64: {e}")))?,
            )),
            (LogicalType::Identifier, Json::String(s)) => Value::Identifier(parse_uuid(s)?),
            (LogicalType::Nested(shape), Json::Object(map)) => {
                reject_extra_keys(shape.fields(), map)?;
                Value::Record(decode_record::<Self, _>(shape.fields(), map)?)
            }
            (LogicalType::Sequence(element), Json::Array(items)) => Value::Sequence(
                items
                    .iter()
                    .enumerate()
                    .map(|(i, item)| Self::decode(item, element).map_err(|e| e.at_field(&format!("[{i}]"))))
                    .collect::<CodecResult<_>>()?,
            ),
            (ty, other) => {
                return Err(CodecError::value_conversion(format!(
                    "cannot read JSON {} as {}",
                    json_kind(other),
                    ty.name()
                )))
            }
        })
    }
}

pub(crate) fn parse_uuid(text: &str) -> CodecResult<Uuid> {
    Uuid::parse_str(text)
        .map_err(|e| CodecError::value_conversion(format!("malformed identifier {text:?}: {e}")))
}

fn reject_extra_keys(fields: &[crate::FieldDescriptor], map: &Map<String, Json>) -> CodecResult<()> {
    match map
        .keys()
        .find(|key| !fields.iter().any(|f| f.storage_name() == key.as_str()))
    {
        Some(key) => Err(CodecError::value_conversion("unexpected key in stored object").at_field(key)),
        None => Ok(()),
    }
}

fn json_kind(value: &Json) -> &'static str {
    match value {
        Json::Null => "null",
        Json::Bool(_) => "boolean",
        Json::Number(_) => "number",
        Json::String(_) => "string",
        Json::Array(_) => "array",
        Json::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{FieldDescriptor, Record, Shape};
    use serde_json::json;

    fn point() -> LogicalType {
        LogicalType::nested(Shape::new(
            "Point",
            vec![
                FieldDescriptor::float("x"),
                FieldDescriptor::float("y").stored_as("why"),
                FieldDescriptor::text("label").nullable(),
            ],
        ))
    }

    #[test]
    fn nested_uses_storage_names() {
        let record = Record::new().with("x", 1.5).with("y", -2.0);
        let json = JsonCodec::encode(&Value::Record(record.clone()), &point()).unwrap();
        assert_eq!(json, json!({"x": 1.5, "why": -2.0, "label": null}));

        let back = JsonCodec::decode(&json, &point()).unwrap();
        assert_eq!(back, Value::Record(record.with("label", Value::Null)));
    }

    #[test]
    fn binary_is_base64() {
        let value = Value::binary(vec![0_u8, 255, 7]);
        let json = JsonCodec::encode(&value, &LogicalType::Binary).unwrap();
        assert_eq!(json, json!("AP8H"));
        assert_eq!(JsonCodec::decode(&json, &LogicalType::Binary).unwrap(), value);
    }

    #[test]
    fn non_finite_floats_are_rejected() {
        let err = JsonCodec::encode(&Value::Float(f64::INFINITY), &LogicalType::Float).unwrap_err();
        assert!(matches!(err, CodecError::ValueConversion { .. }));
    }

    #[test]
    fn fractional_number_is_not_an_integer() {
        let err = JsonCodec::decode(&json!(1.5), &LogicalType::Integer).unwrap_err();
        assert!(matches!(err, CodecError::ValueConversion { .. }));
    }

    #[test]
    fn u64_overflow_is_reported() {
        let err = JsonCodec::decode(&json!(u64::MAX), &LogicalType::Integer).unwrap_err();
        assert!(err.to_string().contains("does not fit"));
    }

    #[test]
    fn unexpected_keys_are_rejected() {
        let err = JsonCodec::decode(&json!({"x": 1.0, "why": 2.0, "z": 3}), &point()).unwrap_err();
        assert_eq!(err.field(), Some("z"));
    }

    #[test]
    fn sequence_errors_carry_index() {
        let ty = LogicalType::sequence(LogicalType::Identifier);
        let err = JsonCodec::decode(&json!(["not-a-uuid"]), &ty).unwrap_err();
        assert_eq!(err.field(), Some("[0]"));
    }
}
