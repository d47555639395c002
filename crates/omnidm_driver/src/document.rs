//! Document store driver boundary.

use crate::error::DriverResult;
use bson::Document;
use std::time::Instant;

/// A lazily consumed stream of result documents.
pub type DocumentCursor = Box<dyn Iterator<Item = DriverResult<Document>> + Send>;

/// Options for a document `find`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindOptions {
    /// Sort specification, `{field: 1 | -1}` in priority order.
    pub sort: Option<Document>,
    /// Number of matching documents to skip.
    pub skip: u64,
    /// Maximum number of documents to return.
    pub limit: Option<u64>,
    /// Projection, `{field: 1}`; `_id` is always included.
    pub projection: Option<Document>,
}

/// A connection (or client pool) to a document store.
///
/// Filters and updates use the MongoDB query language. Drivers own their
/// own connection pooling and must be usable from many threads at once.
///
/// Every call takes an optional deadline; a driver that cannot finish in
/// time abandons the call and returns [`crate::DriverError::Timeout`].
pub trait DocumentDriver: Send + Sync {
    /// Short driver name used in logs.
    fn name(&self) -> &str;

    /// Finds documents matching `filter`.
    ///
    /// # Errors
    ///
    /// Returns an error if the filter is malformed or the store fails.
    fn find(
        &self,
        collection: &str,
        filter: &Document,
        options: &FindOptions,
        deadline: Option<Instant>,
    ) -> DriverResult<DocumentCursor>;

    /// Counts documents matching `filter`.
    ///
    /// # Errors
    ///
    /// Returns an error if the filter is malformed or the store fails.
    fn count(&self, collection: &str, filter: &Document, deadline: Option<Instant>) -> DriverResult<u64>;

    /// Inserts one document.
    ///
    /// # Errors
    ///
    /// Returns a constraint error if the `_id` already exists.
    fn insert_one(&self, collection: &str, document: Document, deadline: Option<Instant>) -> DriverResult<()>;

    /// Inserts documents in order, stopping at the first failure.
    ///
    /// Returns the number inserted.
    ///
    /// # Errors
    ///
    /// Returns a constraint error if any `_id` already exists; documents
    /// before it remain inserted.
    fn insert_many(
        &self,
        collection: &str,
        documents: Vec<Document>,
        deadline: Option<Instant>,
    ) -> DriverResult<u64>;

    /// Replaces the first document matching `filter`; returns the match count.
    ///
    /// # Errors
    ///
    /// Returns an error if the replacement changes `_id` or the store fails.
    fn replace_one(
        &self,
        collection: &str,
        filter: &Document,
        replacement: Document,
        deadline: Option<Instant>,
    ) -> DriverResult<u64>;

    /// Applies an operator update (`$set`, `$unset`, `$inc`, `$push`) to
    /// every match.
    ///
    /// Returns the number of matched documents.
    ///
    /// # Errors
    ///
    /// Returns an error if the update is malformed or the store fails.
    fn update_many(
        &self,
        collection: &str,
        filter: &Document,
        update: &Document,
        deadline: Option<Instant>,
    ) -> DriverResult<u64>;

    /// Applies an operator update to the first match in natural order;
    /// returns 1 if a document matched, otherwise 0.
    ///
    /// # Errors
    ///
    /// Returns an error if the update is malformed or the store fails.
    fn update_one(
        &self,
        collection: &str,
        filter: &Document,
        update: &Document,
        deadline: Option<Instant>,
    ) -> DriverResult<u64>;

    /// Deletes the first match in natural order; returns 1 if a document
    /// matched, otherwise 0.
    ///
    /// # Errors
    ///
    /// Returns an error if the filter is malformed or the store fails.
    fn delete_one(&self, collection: &str, filter: &Document, deadline: Option<Instant>) -> DriverResult<u64>;

    /// Deletes every match; returns the number deleted.
    ///
    /// # Errors
    ///
    /// Returns an error if the filter is malformed or the store fails.
    fn delete_many(&self, collection: &str, filter: &Document, deadline: Option<Instant>) -> DriverResult<u64>;

    /// Checks the store is reachable.
    ///
    /// # Errors
    ///
    /// Returns an error if it is not.
    fn ping(&self) -> DriverResult<()>;

    /// Releases the driver's connections. Later calls fail with `Closed`.
    fn close(&self) {}
}
