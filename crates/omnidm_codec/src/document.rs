//! Document-store (BSON) codec.

use crate::codec::{decode_record, encode_record, FieldCodec};
use crate::error::{CodecError, CodecResult};
use crate::json::parse_uuid;
use crate::registry::BackendKind;
use crate::schema::{type_mismatch, LogicalType};
use crate::timestamp::Timestamp;
use crate::value::Value;
use bson::spec::BinarySubtype;
use bson::{Binary, Bson, Document};
use bytes::Bytes;
use uuid::Uuid;

/// Codec between logical values and BSON.
///
/// Integers are always written as `Int64`; identifiers as binary subtype 4
/// (UUID); nested records as embedded documents and sequences as arrays.
#[derive(Debug, Clone, Copy, Default)]
pub struct DocumentCodec;

impl FieldCodec for DocumentCodec {
    type Native = Bson;
    const BACKEND: BackendKind = BackendKind::Document;

    fn encode(value: &Value, ty: &LogicalType) -> CodecResult<Bson> {
        Ok(match (ty, value) {
            (_, Value::Null) => Bson::Null,
            (LogicalType::Integer, Value::Integer(i)) => Bson::Int64(*i),
            (LogicalType::Float, Value::Float(f)) => Bson::Double(*f),
            (LogicalType::Text, Value::Text(s)) => Bson::String(s.clone()),
            (LogicalType::Boolean, Value::Boolean(b)) => Bson::Boolean(*b),
            (LogicalType::Timestamp, Value::Timestamp(ts)) => {
                Bson::DateTime(bson::DateTime::from_millis(ts.as_millis()))
            }
            (LogicalType::Binary, Value::Binary(bytes)) => Bson::Binary(Binary {
                subtype: BinarySubtype::Generic,
                bytes: bytes.to_vec(),
            }),
            (LogicalType::Identifier, Value::Identifier(id)) => Bson::Binary(Binary {
                subtype: BinarySubtype::Uuid,
                bytes: id.as_bytes().to_vec(),
            }),
            (LogicalType::Nested(shape), Value::Record(record)) => {
                let entries = encode_record::<Self>(shape.fields(), record)?;
                Bson::Document(entries.into_iter().collect::<Document>())
            }
            (LogicalType::Sequence(element), Value::Sequence(items)) => Bson::Array(
                items
                    .iter()
                    .enumerate()
                    .map(|(i, item)| Self::encode(item, element).map_err(|e| e.at_field(&format!("[{i}]"))))
                    .collect::<CodecResult<_>>()?,
            ),
            (ty, value) => return Err(type_mismatch(ty, value)),
        })
    }

    fn decode(native: &Bson, ty: &LogicalType) -> CodecResult<Value> {
        Ok(match (ty, native) {
            (_, Bson::Null | Bson::Undefined) => Value::Null,
            (LogicalType::Integer, Bson::Int64(i)) => Value::Integer(*i),
            (LogicalType::Integer, Bson::Int32(i)) => Value::Integer(i64::from(*i)),
            (LogicalType::Integer, Bson::Double(f)) => Value::Integer(integral(*f)?),
            (LogicalType::Float, Bson::Double(f)) => Value::Float(*f),
            (LogicalType::Float, Bson::Int32(i)) => Value::Float(f64::from(*i)),
            #[allow(clippy::cast_precision_loss)]
            (LogicalType::Float, Bson::Int64(i)) => Value::Float(*i as f64),
            (LogicalType::Text, Bson::String(s)) => Value::Text(s.clone()),
            (LogicalType::Boolean, Bson::Boolean(b)) => Value::Boolean(*b),
            (LogicalType::Timestamp, Bson::DateTime(dt)) => {
                Value::Timestamp(Timestamp::from_millis(dt.timestamp_millis()))
            }
            (LogicalType::Timestamp, Bson::Int64(ms)) => Value::Timestamp(Timestamp::from_millis(*ms)),
            (LogicalType::Timestamp, Bson::String(s)) => Value::Timestamp(Timestamp::parse_rfc3339(s)?),
            (LogicalType::Binary, Bson::Binary(bin)) => Value::Binary(Bytes::from(bin.bytes.clone())),
            (LogicalType::Identifier, Bson::Binary(bin)) => Value::Identifier(
                Uuid::from_slice(&bin.bytes).map_err(|_| {
                    CodecError::value_conversion(format!("{}-byte binary is not an identifier", bin.bytes.len()))
                })?,
            ),
            (LogicalType::Identifier, Bson::String(s)) => Value::Identifier(parse_uuid(s)?),
            (LogicalType::Nested(shape), Bson::Document(doc)) => {
                Value::Record(decode_record::<Self, _>(shape.fields(), doc)?)
            }
            (LogicalType::Sequence(element), Bson::Array(items)) => Value::Sequence(
                items
                    .iter()
                    .enumerate()
                    .map(|(i, item)| Self::decode(item, element).map_err(|e| e.at_field(&format!("[{i}]"))))
                    .collect::<CodecResult<_>>()?,
            ),
            (ty, other) => {
                return Err(CodecError::value_conversion(format!(
                    "cannot read BSON {:?} as {}",
                    other.element_type(),
                    ty.name()
                )))
            }
        })
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
fn integral(f: f64) -> CodecResult<i64> {
    // 2^63 is exactly representable; anything at or beyond it overflows.
    const LIMIT: f64 = 9_223_372_036_854_775_808.0;
    if f.fract() == 0.0 && f >= -LIMIT && f < LIMIT {
        Ok(f as i64)
    } else {
        Err(CodecError::value_conversion(format!("{f} is not a 64-bit integer")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{FieldDescriptor, Record, Shape};
    use bson::doc;

    #[test]
    fn integers_are_int64() {
        let native = DocumentCodec::encode(&Value::Integer(7), &LogicalType::Integer).unwrap();
        assert_eq!(native, Bson::Int64(7));
    }

    #[test]
    fn narrower_numbers_widen_on_read() {
        assert_eq!(
            DocumentCodec::decode(&Bson::Int32(7), &LogicalType::Integer).unwrap(),
            Value::Integer(7)
        );
        assert_eq!(
            DocumentCodec::decode(&Bson::Double(3.0), &LogicalType::Integer).unwrap(),
            Value::Integer(3)
        );
        assert!(DocumentCodec::decode(&Bson::Double(3.5), &LogicalType::Integer).is_err());
        assert!(DocumentCodec::decode(&Bson::Double(1e19), &LogicalType::Integer).is_err());
    }

    #[test]
    fn identifiers_use_uuid_subtype() {
        let id = Uuid::new_v4();
        let native = DocumentCodec::encode(&Value::Identifier(id), &LogicalType::Identifier).unwrap();
        match &native {
            Bson::Binary(bin) => assert_eq!(bin.subtype, BinarySubtype::Uuid),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(
            DocumentCodec::decode(&native, &LogicalType::Identifier).unwrap(),
            Value::Identifier(id)
        );
    }

    #[test]
    fn nested_records_become_documents() {
        let ty = LogicalType::nested(Shape::new(
            "Address",
            vec![
                FieldDescriptor::text("city"),
                FieldDescriptor::text("postal_code").stored_as("zip").nullable(),
            ],
        ));
        let value = Value::Record(Record::new().with("city", "Oslo").with("postal_code", "0150"));
        let native = DocumentCodec::encode(&value, &ty).unwrap();
        assert_eq!(native, Bson::Document(doc! { "city": "Oslo", "zip": "0150" }));
        assert_eq!(DocumentCodec::decode(&native, &ty).unwrap(), value);
    }

    #[test]
    fn missing_nested_key_reads_as_null() {
        let ty = LogicalType::nested(Shape::new(
            "Address",
            vec![FieldDescriptor::text("city"), FieldDescriptor::text("zip").nullable()],
        ));
        let decoded = DocumentCodec::decode(&Bson::Document(doc! { "city": "Oslo" }), &ty).unwrap();
        assert_eq!(
            decoded,
            Value::Record(Record::new().with("city", "Oslo").with("zip", Value::Null))
        );
    }

    #[test]
    fn missing_required_nested_key_fails() {
        let ty = LogicalType::nested(Shape::new("Address", vec![FieldDescriptor::text("city")]));
        let err = DocumentCodec::decode(&Bson::Document(doc! {}), &ty).unwrap_err();
        assert_eq!(err.field(), Some("city"));
    }

    #[test]
    fn type_mismatch_on_read() {
        let err = DocumentCodec::decode(&Bson::String("x".into()), &LogicalType::Boolean).unwrap_err();
        assert!(err.to_string().contains("cannot read BSON"));
    }
}
