//! Per-type descriptor memoization.

use super::{DescriptorBuilder, Entity, EntityDescriptor};
use crate::error::OdmResult;
use parking_lot::RwLock;
use std::any::TypeId;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use tracing::debug;

/// Descriptors keyed by entity type.
///
/// Descriptors are built outside the lock; when two threads race to
/// describe the same type, the first insert wins and both get it.
/// Invalid declarations are not cached, so every use reports the error.
#[derive(Debug, Default)]
pub struct DescriptorCache {
    entries: RwLock<HashMap<TypeId, Arc<EntityDescriptor>>>,
}

impl DescriptorCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the descriptor for `T`, building it on first use.
    ///
    /// # Errors
    ///
    /// Returns an invalid entity definition error if `T`'s declaration is
    /// unusable.
    pub fn describe<T: Entity>(&self) -> OdmResult<Arc<EntityDescriptor>> {
        let key = TypeId::of::<T>();
        if let Some(found) = self.entries.read().get(&key) {
            return Ok(Arc::clone(found));
        }

        let built = Arc::new(T::define(DescriptorBuilder::new(T::entity_name())).build()?);
        debug!(
            entity = built.entity(),
            collection = built.collection(),
            fields = built.fields().len(),
            "described entity"
        );
        let mut entries = self.entries.write();
        Ok(Arc::clone(entries.entry(key).or_insert(built)))
    }

    /// Number of cached descriptors.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

/// Returns the process-wide descriptor for `T`.
///
/// # Errors
///
/// Returns an invalid entity definition error if `T`'s declaration is
/// unusable.
pub fn describe<T: Entity>() -> OdmResult<Arc<EntityDescriptor>> {
    static CACHE: OnceLock<DescriptorCache> = OnceLock::new();
    CACHE.get_or_init(DescriptorCache::new).describe::<T>()
}
