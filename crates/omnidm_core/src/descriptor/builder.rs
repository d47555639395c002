//! Declarative construction and validation of entity descriptors.

use super::{EntityDescriptor, DOCUMENT_ID_KEY};
use crate::error::{OdmError, OdmResult};
use omnidm_codec::{CodecRegistry, FieldDescriptor, LogicalType, Shape};
use std::collections::HashSet;

/// Collects an entity's field declarations.
///
/// Nothing is checked until [`DescriptorBuilder::build`].
#[derive(Debug, Clone)]
pub struct DescriptorBuilder {
    entity: String,
    collection: Option<String>,
    fields: Vec<FieldDescriptor>,
}

impl DescriptorBuilder {
    /// Starts a declaration for the named entity.
    pub fn new(entity: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            collection: None,
            fields: Vec::new(),
        }
    }

    /// Overrides the table or collection name (defaults to the entity name).
    #[must_use]
    pub fn collection(mut self, name: impl Into<String>) -> Self {
        self.collection = Some(name.into());
        self
    }

    /// Declares a field.
    #[must_use]
    pub fn field(mut self, field: FieldDescriptor) -> Self {
        self.fields.push(field);
        self
    }

    /// Declares several fields.
    #[must_use]
    pub fn fields(mut self, fields: impl IntoIterator<Item = FieldDescriptor>) -> Self {
        self.fields.extend(fields);
        self
    }

    /// Validates against the default codec registry.
    ///
    /// # Errors
    ///
    /// See [`DescriptorBuilder::build_with`].
    pub fn build(self) -> OdmResult<EntityDescriptor> {
        self.build_with(&CodecRegistry::default())
    }

    /// Validates the declaration and produces a descriptor.
    ///
    /// # Errors
    ///
    /// Returns an invalid entity definition error if there is not exactly
    /// one primary key, the key is nullable or not an integer, text or
    /// identifier, names collide, a name contains `.`, or a field's type
    /// has no codec on any backend.
    pub fn build_with(self, codecs: &CodecRegistry) -> OdmResult<EntityDescriptor> {
        let invalid = |message: String| OdmError::invalid_entity(&self.entity, message);

        if self.fields.is_empty() {
            return Err(invalid("no fields declared".into()));
        }
        let collection = self.collection.clone().unwrap_or_else(|| self.entity.clone());
        if collection.is_empty() {
            return Err(invalid("collection name is empty".into()));
        }

        let keys: Vec<usize> = self
            .fields
            .iter()
            .enumerate()
            .filter(|(_, f)| f.is_primary_key())
            .map(|(i, _)| i)
            .collect();
        let primary_key = match keys.as_slice() {
            [index] => *index,
            [] => return Err(invalid("no primary key declared".into())),
            _ => return Err(invalid(format!("{} primary keys declared; exactly one is allowed", keys.len()))),
        };
        let pk = &self.fields[primary_key];
        if pk.is_nullable() {
            return Err(invalid(format!("primary key `{}` must not be nullable", pk.name())));
        }
        if !matches!(
            pk.logical_type(),
            LogicalType::Integer | LogicalType::Text | LogicalType::Identifier
        ) {
            return Err(invalid(format!(
                "primary key `{}` must be integer, text or identifier, not {}",
                pk.name(),
                pk.logical_type()
            )));
        }

        check_fields(&self.fields, true).map_err(invalid)?;
        for field in &self.fields {
            if !field.is_primary_key() && field.storage_name() == DOCUMENT_ID_KEY {
                return Err(invalid(format!(
                    "`{}` is stored as `{DOCUMENT_ID_KEY}`, which is reserved for the primary key",
                    field.name()
                )));
            }
            if !codecs.covers(field.logical_type()) {
                return Err(invalid(format!(
                    "field `{}` has type {} with no registered codec",
                    field.name(),
                    field.logical_type()
                )));
            }
        }

        let shape = Shape::new(self.entity.clone(), self.fields);
        Ok(EntityDescriptor::new(self.entity, collection, shape, primary_key))
    }
}

/// Checks names within one field set, recursing into nested shapes.
fn check_fields(fields: &[FieldDescriptor], top_level: bool) -> Result<(), String> {
    let mut names = HashSet::new();
    let mut storage = HashSet::new();
    for field in fields {
        if field.name().is_empty() || field.storage_name().is_empty() {
            return Err("field names must not be empty".into());
        }
        if field.name().contains('.') || field.storage_name().contains('.') {
            return Err(format!("field `{}` must not contain `.`", field.name()));
        }
        if !names.insert(field.name()) {
            return Err(format!("duplicate field `{}`", field.name()));
        }
        if !storage.insert(field.storage_name()) {
            return Err(format!("duplicate storage name `{}`", field.storage_name()));
        }
        if !top_level && field.is_primary_key() {
            return Err(format!("nested field `{}` cannot be a primary key", field.name()));
        }
        check_type(field.logical_type())?;
    }
    Ok(())
}

fn check_type(ty: &LogicalType) -> Result<(), String> {
    match ty {
        LogicalType::Nested(shape) => check_fields(shape.fields(), false),
        LogicalType::Sequence(element) => check_type(element),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use omnidm_codec::{BackendKind, TypeTag};

    fn base() -> DescriptorBuilder {
        DescriptorBuilder::new("User").field(FieldDescriptor::integer("id").primary_key())
    }

    fn message(result: OdmResult<EntityDescriptor>) -> String {
        match result {
            Err(OdmError::InvalidEntityDefinition { message, .. }) => message,
            other => panic!("expected invalid definition, got {other:?}"),
        }
    }

    #[test]
    fn collection_defaults_to_entity_name() {
        let d = base().field(FieldDescriptor::text("name")).build().unwrap();
        assert_eq!(d.collection(), "User");
        assert_eq!(d.fields().len(), 2);
    }

    #[test]
    fn exactly_one_primary_key() {
        let none = DescriptorBuilder::new("User").field(FieldDescriptor::integer("id"));
        assert_eq!(message(none.build()), "no primary key declared");
        let two = base().field(FieldDescriptor::text("code").primary_key());
        assert!(message(two.build()).contains("2 primary keys"));
    }

    #[test]
    fn primary_key_type_and_nullability() {
        let nullable = DescriptorBuilder::new("T").field(FieldDescriptor::integer("id").primary_key().nullable());
        assert!(message(nullable.build()).contains("nullable"));
        let float = DescriptorBuilder::new("T").field(FieldDescriptor::float("id").primary_key());
        assert!(message(float.build()).contains("must be integer, text or identifier"));
    }

    #[test]
    fn duplicate_names() {
        let dup = base().field(FieldDescriptor::text("id"));
        assert_eq!(message(dup.build()), "duplicate field `id`");
        let dup = base()
            .field(FieldDescriptor::text("a").stored_as("x"))
            .field(FieldDescriptor::text("b").stored_as("x"));
        assert_eq!(message(dup.build()), "duplicate storage name `x`");
    }

    #[test]
    fn dotted_and_reserved_names() {
        assert!(message(base().field(FieldDescriptor::text("a.b")).build()).contains("must not contain"));
        assert!(message(base().field(FieldDescriptor::text("_id")).build()).contains("reserved"));
    }

    #[test]
    fn nested_shapes_are_checked() {
        let shape = Shape::new(
            "Address",
            vec![FieldDescriptor::text("city"), FieldDescriptor::text("city")],
        );
        let result = base().field(FieldDescriptor::nested("address", shape)).build();
        assert_eq!(message(result), "duplicate field `city`");

        let shape = Shape::new("Tag", vec![FieldDescriptor::integer("k").primary_key()]);
        let result = base()
            .field(FieldDescriptor::sequence("tags", LogicalType::nested(shape)))
            .build();
        assert!(message(result).contains("cannot be a primary key"));
    }

    #[test]
    fn uncovered_types_are_rejected() {
        let codecs = CodecRegistry::default()
            .unregister(BackendKind::Document, TypeTag::Binary)
            .unregister(BackendKind::Relational, TypeTag::Binary);
        let result = base().field(FieldDescriptor::binary("blob")).build_with(&codecs);
        assert!(message(result).contains("no registered codec"));
    }

    #[test]
    fn empty_declaration() {
        assert_eq!(message(DescriptorBuilder::new("T").build()), "no fields declared");
    }
}
