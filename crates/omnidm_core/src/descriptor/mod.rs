//! Entity declarations and their validated, cached descriptors.

mod builder;
mod cache;

pub use builder::DescriptorBuilder;
pub use cache::{describe, DescriptorCache};

use crate::error::{OdmError, OdmResult};
use omnidm_codec::{
    decode_field, encode_field, BackendKind, CodecResult, FieldCodec, FieldDescriptor, NativeFields,
    NativeRecord, Record, Shape, Value,
};
use std::sync::Arc;

/// Document key under which every document store keeps the primary key.
pub const DOCUMENT_ID_KEY: &str = "_id";

/// A type that can be persisted through a [`crate::Session`].
///
/// Implementations declare their fields once in [`Entity::define`] and
/// convert to and from the logical [`Record`] form. The declaration is
/// validated and cached the first time the type is used.
///
/// # Example
///
/// ```rust
/// use omnidm_core::{DescriptorBuilder, Entity};
/// use omnidm_codec::{CodecResult, FieldDescriptor, Record};
///
/// struct User {
///     id: i64,
///     name: String,
/// }
///
/// impl Entity for User {
///     fn define(builder: DescriptorBuilder) -> DescriptorBuilder {
///         builder
///             .collection("users")
///             .field(FieldDescriptor::integer("id").primary_key())
///             .field(FieldDescriptor::text("name"))
///     }
///
///     fn to_record(&self) -> Record {
///         Record::new().with("id", self.id).with("name", &self.name)
///     }
///
///     fn from_record(record: Record) -> CodecResult<Self> {
///         Ok(Self { id: record.field("id")?, name: record.field("name")? })
///     }
/// }
///
/// let descriptor = omnidm_core::describe::<User>().unwrap();
/// assert_eq!(descriptor.collection(), "users");
/// assert_eq!(descriptor.primary_key().name(), "id");
/// ```
pub trait Entity: Sized + Send + 'static {
    /// Declares the entity's fields on top of `builder`.
    fn define(builder: DescriptorBuilder) -> DescriptorBuilder;

    /// Converts the instance into its logical record.
    fn to_record(&self) -> Record;

    /// Rebuilds an instance from a logical record.
    ///
    /// # Errors
    ///
    /// Returns a value conversion error if a field has the wrong shape.
    fn from_record(record: Record) -> CodecResult<Self>;

    /// Name used in errors and as the default collection name.
    fn entity_name() -> &'static str {
        let full = std::any::type_name::<Self>();
        let base = full.split('<').next().unwrap_or(full);
        base.rsplit("::").next().unwrap_or(base)
    }
}

/// The validated layout of one entity type.
///
/// Immutable once built and shared by every session for the type.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityDescriptor {
    entity: String,
    collection: String,
    shape: Arc<Shape>,
    primary_key: usize,
}

impl EntityDescriptor {
    pub(crate) fn new(entity: String, collection: String, shape: Shape, primary_key: usize) -> Self {
        Self {
            entity,
            collection,
            shape: Arc::new(shape),
            primary_key,
        }
    }

    /// Entity type name.
    pub fn entity(&self) -> &str {
        &self.entity
    }

    /// Table or collection name.
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// The field layout.
    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    /// Fields in declaration order.
    pub fn fields(&self) -> &[FieldDescriptor] {
        self.shape.fields()
    }

    /// Looks up a top-level field by logical name.
    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.shape.field(name)
    }

    /// The primary-key field.
    pub fn primary_key(&self) -> &FieldDescriptor {
        &self.shape.fields()[self.primary_key]
    }

    /// Native key for a top-level field on a backend family.
    ///
    /// Document stores keep the primary key under `_id`; everything else
    /// uses the field's storage name.
    pub fn storage_key<'a>(&self, field: &'a FieldDescriptor, backend: BackendKind) -> &'a str {
        if backend == BackendKind::Document && field.is_primary_key() {
            DOCUMENT_ID_KEY
        } else {
            field.storage_name()
        }
    }

    /// Checks a record against the layout, including a non-null key.
    ///
    /// # Errors
    ///
    /// Returns a value conversion error for unknown fields, type mismatches
    /// or null violations.
    pub fn check(&self, record: &Record) -> OdmResult<()> {
        self.shape.check(record)?;
        Ok(())
    }

    /// Extracts the primary-key value of a record.
    ///
    /// # Errors
    ///
    /// Returns a value conversion error if the key is absent or null.
    pub fn key_of(&self, record: &Record) -> OdmResult<Value> {
        let pk = self.primary_key();
        match record.get(pk.name()) {
            Some(value) if !value.is_null() => {
                pk.check(value)?;
                Ok(value.clone())
            }
            _ => Err(OdmError::value_conversion(pk.name(), "primary key must not be null")),
        }
    }

    /// Encodes a key value for backend `C`.
    ///
    /// # Errors
    ///
    /// Returns a value conversion error if the value is not a valid key.
    pub fn encode_key<C: FieldCodec>(&self, key: &Value) -> OdmResult<C::Native> {
        let pk = self.primary_key();
        if key.is_null() {
            return Err(OdmError::value_conversion(pk.name(), "primary key must not be null"));
        }
        Ok(encode_field::<C>(pk, key)?)
    }

    /// Encodes a record into native values keyed by storage key, in
    /// declaration order.
    ///
    /// # Errors
    ///
    /// Fails before producing anything if any field does not convert.
    pub fn to_native_record<C: FieldCodec>(&self, record: &Record) -> OdmResult<NativeRecord<C::Native>> {
        self.check(record)?;
        self.key_of(record)?;
        self.fields()
            .iter()
            .map(|field| {
                let native = encode_field::<C>(field, record.get_or_null(field.name()))?;
                Ok((self.storage_key(field, C::BACKEND).to_string(), native))
            })
            .collect()
    }

    /// Encodes only `fields` of a record.
    ///
    /// # Errors
    ///
    /// Returns a value conversion error for the first failing field.
    pub fn encode_fields<C: FieldCodec>(
        &self,
        fields: &[&FieldDescriptor],
        record: &Record,
    ) -> OdmResult<NativeRecord<C::Native>> {
        fields
            .iter()
            .map(|field| {
                let native = encode_field::<C>(field, record.get_or_null(field.name()))?;
                Ok((self.storage_key(field, C::BACKEND).to_string(), native))
            })
            .collect()
    }

    /// Decodes a full record from a native row or document.
    ///
    /// # Errors
    ///
    /// Returns a value conversion error for the first field that cannot be
    /// read; no partial record is produced.
    pub fn from_native_record<C, S>(&self, source: &S) -> OdmResult<Record>
    where
        C: FieldCodec,
        S: NativeFields<C::Native> + ?Sized,
    {
        let fields: Vec<&FieldDescriptor> = self.fields().iter().collect();
        self.decode_fields::<C, S>(&fields, source)
    }

    /// Decodes only `fields` from a native row or document.
    ///
    /// # Errors
    ///
    /// Returns a value conversion error for the first failing field.
    pub fn decode_fields<C, S>(&self, fields: &[&FieldDescriptor], source: &S) -> OdmResult<Record>
    where
        C: FieldCodec,
        S: NativeFields<C::Native> + ?Sized,
    {
        fields
            .iter()
            .map(|field| {
                let native = source.native_field(self.storage_key(field, C::BACKEND));
                let value = decode_field::<C>(field, native)?;
                Ok((field.name().to_string(), value))
            })
            .collect()
    }
}
