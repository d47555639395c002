//! Backend adapters.
//!
//! An adapter translates validated, backend-neutral operations into one
//! backend family's native form, runs them through a driver, and maps the
//! results back into logical records. Sessions pick their adapter once,
//! when they are opened, and never branch on the backend again.
//!
//! Two families exist:
//!
//! - [`DocumentAdapter`]: filter and update documents for a
//!   [`DocumentDriver`](omnidm_driver::DocumentDriver). The primary key is
//!   stored as `_id`; nested records and sequences are embedded.
//! - [`RelationalAdapter`]: parameterized SQL for a
//!   [`SqlConnector`](omnidm_driver::SqlConnector) in one [`Dialect`],
//!   executed on pooled connections.

mod cursor;
mod document;
pub mod relational;

pub use cursor::RecordCursor;
pub use document::DocumentAdapter;
pub use relational::{Dialect, RelationalAdapter, SqlPool, Statement};

use crate::descriptor::EntityDescriptor;
use crate::error::OdmResult;
use crate::query::{ValidatedQuery, ValidatedUpdate};
use omnidm_codec::{BackendKind, FieldDescriptor, Record, Value};
use std::time::Instant;

/// Native execution of entity operations for one backend.
///
/// Every method takes the call's deadline; work still running when it
/// passes is abandoned and reported as a timeout. Transient driver
/// failures are retried according to the adapter's retry policy.
pub trait Adapter: Send + Sync {
    /// The configured backend name, used in errors and logs.
    fn backend(&self) -> &str;

    /// The backend family, which selects the field codec.
    fn kind(&self) -> BackendKind;

    /// Creates the entity's table if the backend needs one.
    ///
    /// # Errors
    ///
    /// Returns a backend execution error if the DDL fails.
    fn ensure_schema(&self, descriptor: &EntityDescriptor, deadline: Option<Instant>) -> OdmResult<()>;

    /// Streams the records a query selects.
    ///
    /// # Errors
    ///
    /// Returns an error if the query cannot be translated or started;
    /// decoding errors are reported by the cursor.
    fn find(&self, query: &ValidatedQuery, deadline: Option<Instant>) -> OdmResult<RecordCursor>;

    /// Counts the records a query's predicate matches.
    ///
    /// # Errors
    ///
    /// Returns an error if the query cannot be translated or run.
    fn count(&self, query: &ValidatedQuery, deadline: Option<Instant>) -> OdmResult<u64>;

    /// Whether a record with primary key `key` is stored.
    ///
    /// # Errors
    ///
    /// Returns an error if the key does not encode or the lookup fails.
    fn contains_key(&self, descriptor: &EntityDescriptor, key: &Value, deadline: Option<Instant>) -> OdmResult<bool>;

    /// Inserts new records; returns how many were stored.
    ///
    /// # Errors
    ///
    /// Returns a value conversion error before writing anything if a
    /// record does not encode, or a constraint violation for a taken key.
    fn insert(&self, descriptor: &EntityDescriptor, records: &[Record], deadline: Option<Instant>) -> OdmResult<u64>;

    /// Overwrites every field of the stored record with the same key;
    /// returns how many records matched.
    ///
    /// # Errors
    ///
    /// Returns a value conversion error if the record does not encode.
    fn replace(&self, descriptor: &EntityDescriptor, record: &Record, deadline: Option<Instant>) -> OdmResult<u64>;

    /// Writes only `fields` of `record` to the stored record with key
    /// `key`; returns how many records matched.
    ///
    /// # Errors
    ///
    /// Returns a value conversion error if a field does not encode.
    fn update_fields(
        &self,
        descriptor: &EntityDescriptor,
        key: &Value,
        record: &Record,
        fields: &[&FieldDescriptor],
        deadline: Option<Instant>,
    ) -> OdmResult<u64>;

    /// Applies an update to every record the query matches.
    ///
    /// # Errors
    ///
    /// Returns an error if the query or update cannot be translated or run.
    fn update_where(
        &self,
        query: &ValidatedQuery,
        update: &ValidatedUpdate,
        deadline: Option<Instant>,
    ) -> OdmResult<u64>;

    /// Applies an update to at most one record the query matches; returns
    /// 1 if one was updated, otherwise 0.
    ///
    /// # Errors
    ///
    /// Returns an error if the query or update cannot be translated or run.
    fn update_one(&self, query: &ValidatedQuery, update: &ValidatedUpdate, deadline: Option<Instant>)
        -> OdmResult<u64>;

    /// Removes every record the query matches; returns the count.
    ///
    /// # Errors
    ///
    /// Returns an error if the query cannot be translated or run.
    fn delete(&self, query: &ValidatedQuery, deadline: Option<Instant>) -> OdmResult<u64>;

    /// Removes at most one record the query matches; returns 1 if one was
    /// removed, otherwise 0.
    ///
    /// # Errors
    ///
    /// Returns an error if the query cannot be translated or run.
    fn delete_one(&self, query: &ValidatedQuery, deadline: Option<Instant>) -> OdmResult<u64>;

    /// Checks that the backend is reachable.
    ///
    /// # Errors
    ///
    /// Returns the classified driver error.
    fn ping(&self) -> OdmResult<()>;

    /// Releases connections. Later calls fail.
    fn close(&self);
}
