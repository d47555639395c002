//! Which logical types each backend family can store.

use crate::codec::FieldCodec;
use crate::error::{CodecError, CodecResult};
use crate::schema::{LogicalType, TypeTag};
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// A family of storage backends sharing one native representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Document stores (BSON documents).
    Document,
    /// Relational stores (SQL rows).
    Relational,
}

impl BackendKind {
    /// Lowercase name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            BackendKind::Document => "document",
            BackendKind::Relational => "relational",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Registered codec coverage per backend family.
///
/// The default registry covers every logical type on both families
/// (relational stores embed nested and sequence values as JSON text).
/// Narrower registries model deployments whose backends lack a type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodecRegistry {
    document: BTreeSet<TypeTag>,
    relational: BTreeSet<TypeTag>,
}

impl Default for CodecRegistry {
    fn default() -> Self {
        Self {
            document: TypeTag::ALL.into_iter().collect(),
            relational: TypeTag::ALL.into_iter().collect(),
        }
    }
}

impl CodecRegistry {
    /// Creates a registry covering every type on every backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry with no codecs at all.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            document: BTreeSet::new(),
            relational: BTreeSet::new(),
        }
    }

    /// Registers a codec for `tag` on `backend`.
    #[must_use]
    pub fn register(mut self, backend: BackendKind, tag: TypeTag) -> Self {
        self.tags_mut(backend).insert(tag);
        self
    }

    /// Removes the codec for `tag` on `backend`.
    #[must_use]
    pub fn unregister(mut self, backend: BackendKind, tag: TypeTag) -> Self {
        self.tags_mut(backend).remove(&tag);
        self
    }

    fn tags(&self, backend: BackendKind) -> &BTreeSet<TypeTag> {
        match backend {
            BackendKind::Document => &self.document,
            BackendKind::Relational => &self.relational,
        }
    }

    fn tags_mut(&mut self, backend: BackendKind) -> &mut BTreeSet<TypeTag> {
        match backend {
            BackendKind::Document => &mut self.document,
            BackendKind::Relational => &mut self.relational,
        }
    }

    /// Whether `backend` has a codec for `tag`.
    #[must_use]
    pub fn supports(&self, backend: BackendKind, tag: TypeTag) -> bool {
        self.tags(backend).contains(&tag)
    }

    /// Checks that `backend` can store `ty`, including every nested part.
    ///
    /// # Errors
    ///
    /// Returns an unsupported type error naming the first uncovered type.
    pub fn check(&self, backend: BackendKind, ty: &LogicalType) -> CodecResult<()> {
        if !self.supports(backend, ty.tag()) {
            return Err(CodecError::unsupported_type(ty.name(), backend.name()));
        }
        match ty {
            LogicalType::Sequence(element) => self.check(backend, element),
            LogicalType::Nested(shape) => shape
                .fields()
                .iter()
                .try_for_each(|f| self.check(backend, f.logical_type())),
            _ => Ok(()),
        }
    }

    /// Whether at least one backend family can store `ty`.
    #[must_use]
    pub fn covers(&self, ty: &LogicalType) -> bool {
        [BackendKind::Document, BackendKind::Relational]
            .into_iter()
            .any(|backend| self.check(backend, ty).is_ok())
    }

    /// Encodes through `C` after checking coverage for its backend.
    ///
    /// # Errors
    ///
    /// Returns an unsupported type error or the codec's conversion error.
    pub fn encode<C: FieldCodec>(&self, value: &Value, ty: &LogicalType) -> CodecResult<C::Native> {
        self.check(C::BACKEND, ty)?;
        C::encode(value, ty)
    }

    /// Decodes through `C` after checking coverage for its backend.
    ///
    /// # Errors
    ///
    /// Returns an unsupported type error or the codec's conversion error.
    pub fn decode<C: FieldCodec>(&self, native: &C::Native, ty: &LogicalType) -> CodecResult<Value> {
        self.check(C::BACKEND, ty)?;
        C::decode(native, ty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RelationalCodec;

    #[test]
    fn default_covers_everything() {
        let registry = CodecRegistry::default();
        for tag in TypeTag::ALL {
            assert!(registry.supports(BackendKind::Document, tag));
            assert!(registry.supports(BackendKind::Relational, tag));
        }
    }

    #[test]
    fn check_recurses_into_sequences() {
        let registry =
            CodecRegistry::default().unregister(BackendKind::Relational, TypeTag::Binary);
        let ty = LogicalType::sequence(LogicalType::Binary);
        let err = registry.check(BackendKind::Relational, &ty).unwrap_err();
        assert_eq!(err, CodecError::unsupported_type("binary", "relational"));
        assert!(registry.check(BackendKind::Document, &ty).is_ok());
        assert!(registry.covers(&ty));
    }

    #[test]
    fn empty_registry_covers_nothing() {
        assert!(!CodecRegistry::empty().covers(&LogicalType::Integer));
    }

    #[test]
    fn encode_refuses_uncovered_types() {
        let registry =
            CodecRegistry::default().unregister(BackendKind::Relational, TypeTag::Float);
        let err = registry
            .encode::<RelationalCodec>(&Value::Float(1.5), &LogicalType::Float)
            .unwrap_err();
        assert!(matches!(err, CodecError::UnsupportedType { .. }));
    }
}
