//! # omnidm Codec
//!
//! Logical values and the field codecs that move them in and out of each
//! backend's native representation.
//!
//! - [`Value`] / [`Record`] are what application code and queries see.
//! - [`LogicalType`] and [`FieldDescriptor`] declare what a field may hold.
//! - [`DocumentCodec`] (BSON), [`RelationalCodec`] ([`SqlValue`]) and
//!   [`JsonCodec`] implement [`FieldCodec`].
//! - [`CodecRegistry`] records which logical types each backend family
//!   supports.
//!
//! ## Usage
//!
//! ```
//! use omnidm_codec::{DocumentCodec, FieldCodec, LogicalType, Value};
//!
//! let native = DocumentCodec::encode(&Value::Integer(42), &LogicalType::Integer).unwrap();
//! let back = DocumentCodec::decode(&native, &LogicalType::Integer).unwrap();
//! assert_eq!(back, Value::Integer(42));
//! ```

mod codec;
mod document;
mod error;
mod json;
mod registry;
mod relational;
mod schema;
mod timestamp;
mod value;

pub use codec::{decode_field, decode_record, encode_field, encode_record, FieldCodec, NativeFields};
pub use document::DocumentCodec;
pub use error::{CodecError, CodecResult};
pub use json::JsonCodec;
pub use registry::{BackendKind, CodecRegistry};
pub use relational::{RelationalCodec, SqlValue};
pub use schema::{FieldDescriptor, LogicalType, Shape, TypeTag};
pub use timestamp::Timestamp;
pub use value::{FromValue, Record, Value};

/// Native records: storage key to native value, in field declaration order.
pub type NativeRecord<N> = Vec<(String, N)>;

// Re-exported so downstream crates agree on the exact versions.
pub use bson;
pub use bytes::Bytes;
pub use uuid::Uuid;
