//! Memoized statement text for operations whose shape depends only on
//! the entity descriptor.

use super::dialect::Dialect;
use super::statement;
use crate::descriptor::EntityDescriptor;
use omnidm_codec::FieldDescriptor;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Operations with a fixed statement shape per entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum ShapeKind {
    CreateTable,
    SelectAll,
    ExistsByKey,
    InsertOne,
    ReplaceByKey,
}

/// Statement text keyed by entity, collection and operation.
///
/// Descriptors never change after they are built, so entries are never
/// invalidated.
#[derive(Debug)]
pub(crate) struct ShapeCache {
    dialect: Dialect,
    entries: RwLock<HashMap<(String, String, ShapeKind), Arc<str>>>,
}

impl ShapeCache {
    pub(crate) fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub(crate) fn get(&self, descriptor: &EntityDescriptor, kind: ShapeKind) -> Arc<str> {
        let key = (descriptor.entity().to_string(), descriptor.collection().to_string(), kind);
        if let Some(sql) = self.entries.read().get(&key) {
            return Arc::clone(sql);
        }
        let sql: Arc<str> = self.build(descriptor, kind).into();
        Arc::clone(self.entries.write().entry(key).or_insert(sql))
    }

    fn build(&self, descriptor: &EntityDescriptor, kind: ShapeKind) -> String {
        let d = self.dialect;
        match kind {
            ShapeKind::CreateTable => statement::create_table(d, descriptor),
            ShapeKind::SelectAll => {
                let fields: Vec<&FieldDescriptor> = descriptor.fields().iter().collect();
                statement::select_prefix(d, descriptor, &fields)
            }
            ShapeKind::ExistsByKey => statement::exists_by_key(d, descriptor),
            ShapeKind::InsertOne => statement::insert_one(d, descriptor),
            ShapeKind::ReplaceByKey => {
                let fields: Vec<&FieldDescriptor> =
                    descriptor.fields().iter().filter(|f| !f.is_primary_key()).collect();
                statement::update_by_key(d, descriptor, &fields)
            }
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.entries.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::DescriptorBuilder;

    #[test]
    fn shapes_are_built_once() {
        let d = DescriptorBuilder::new("Tag")
            .field(FieldDescriptor::text("key").primary_key())
            .field(FieldDescriptor::integer("uses"))
            .build()
            .unwrap();
        let cache = ShapeCache::new(Dialect::Sqlite);
        let first = cache.get(&d, ShapeKind::ReplaceByKey);
        let second = cache.get(&d, ShapeKind::ReplaceByKey);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(&*first, r#"UPDATE "Tag" SET "uses" = ? WHERE "key" = ?"#);
        cache.get(&d, ShapeKind::InsertOne);
        assert_eq!(cache.len(), 2);
    }
}
