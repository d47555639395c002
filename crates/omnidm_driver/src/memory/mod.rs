//! In-memory document store.

mod matcher;
mod ordering;
mod update;

pub use matcher::{lookup, matches};
pub use ordering::{compare, total_order};

use crate::document::{DocumentCursor, DocumentDriver, FindOptions};
use crate::error::{DriverError, DriverResult};
use bson::oid::ObjectId;
use bson::{Bson, Document};
use parking_lot::{Mutex, RwLock};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::time::{Duration, Instant};

/// An in-memory document store speaking the MongoDB query language.
///
/// This driver is suitable for:
/// - Unit and integration tests
/// - Ephemeral stores that don't need persistence
///
/// Collections are created on first write. Documents keep insertion order,
/// which is the natural order of unsorted reads. `_id` is unique per
/// collection and generated as an `ObjectId` when absent.
///
/// Failures and latency can be injected to exercise retry and deadline
/// handling in callers.
///
/// # Thread Safety
///
/// This store is thread-safe and can be shared across threads.
///
/// # Example
///
/// ```rust
/// use omnidm_driver::{DocumentDriver, FindOptions, MemoryDocumentStore};
/// use bson::doc;
///
/// let store = MemoryDocumentStore::new();
/// store.insert_one("users", doc! { "_id": 1_i64, "name": "a" }, None).unwrap();
/// let found: Vec<_> = store
///     .find("users", &doc! { "name": "a" }, &FindOptions::default(), None)
///     .unwrap()
///     .collect();
/// assert_eq!(found.len(), 1);
/// ```
#[derive(Debug, Default)]
pub struct MemoryDocumentStore {
    collections: RwLock<HashMap<String, Vec<Document>>>,
    faults: Mutex<Faults>,
    closed: AtomicBool,
}

#[derive(Debug, Default)]
struct Faults {
    transient_failures: u32,
    latency: Duration,
}

impl MemoryDocumentStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `count` operations fail with a transient error.
    pub fn fail_next(&self, count: u32) {
        self.faults.lock().transient_failures = count;
    }

    /// Delays every operation by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        self.faults.lock().latency = latency;
    }

    /// Returns a copy of every document in `collection`, in storage order.
    #[must_use]
    pub fn snapshot(&self, collection: &str) -> Vec<Document> {
        self.collections
            .read()
            .get(collection)
            .cloned()
            .unwrap_or_default()
    }

    /// Removes every collection.
    pub fn clear(&self) {
        self.collections.write().clear();
    }

    /// Gate run before each operation: closed check, injected faults, deadline.
    fn begin(&self, deadline: Option<Instant>) -> DriverResult<()> {
        if self.closed.load(AtomicOrdering::Acquire) {
            return Err(DriverError::Closed);
        }
        let latency = {
            let mut faults = self.faults.lock();
            if faults.transient_failures > 0 {
                faults.transient_failures -= 1;
                return Err(DriverError::transient("simulated connection reset"));
            }
            faults.latency
        };
        if !latency.is_zero() {
            let wake = Instant::now() + latency;
            match deadline {
                Some(deadline) if deadline < wake => {
                    std::thread::sleep(deadline.saturating_duration_since(Instant::now()));
                    return Err(DriverError::Timeout);
                }
                _ => std::thread::sleep(latency),
            }
        }
        if deadline.is_some_and(|d| Instant::now() >= d) {
            return Err(DriverError::Timeout);
        }
        Ok(())
    }

    fn select(&self, collection: &str, filter: &Document) -> DriverResult<Vec<Document>> {
        let collections = self.collections.read();
        let mut out = Vec::new();
        for doc in collections.get(collection).into_iter().flatten() {
            if matches(doc, filter)? {
                out.push(doc.clone());
            }
        }
        Ok(out)
    }
}

fn sort_documents(docs: &mut [Document], sort: &Document) -> DriverResult<()> {
    let mut keys = Vec::with_capacity(sort.len());
    for (path, direction) in sort {
        let descending = match direction {
            Bson::Int32(1) | Bson::Int64(1) => false,
            Bson::Int32(-1) | Bson::Int64(-1) => true,
            other => return Err(DriverError::permanent(format!("invalid sort direction {other} for {path}"))),
        };
        keys.push((path.as_str(), descending));
    }
    docs.sort_by(|a, b| {
        for (path, descending) in &keys {
            let left = lookup(a, path).unwrap_or(&Bson::Null);
            let right = lookup(b, path).unwrap_or(&Bson::Null);
            let ord = total_order(left, right);
            let ord = if *descending { ord.reverse() } else { ord };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    });
    Ok(())
}

fn project(doc: Document, projection: &Document) -> Document {
    let keep_id = !matches!(projection.get("_id"), Some(Bson::Int32(0) | Bson::Int64(0) | Bson::Boolean(false)));
    doc.into_iter()
        .filter(|(key, _)| (key == "_id" && keep_id) || (key != "_id" && projection.contains_key(key)))
        .collect()
}

fn first_match(docs: &[Document], filter: &Document) -> DriverResult<Option<usize>> {
    for (index, doc) in docs.iter().enumerate() {
        if matches(doc, filter)? {
            return Ok(Some(index));
        }
    }
    Ok(None)
}

fn id_of(doc: &Document) -> Option<&Bson> {
    doc.get("_id")
}

fn duplicate_key(collection: &str, id: &Bson) -> DriverError {
    DriverError::constraint(format!(
        "E11000 duplicate key error collection: {collection} index: _id_ dup key: {{ _id: {id} }}"
    ))
}

impl DocumentDriver for MemoryDocumentStore {
    fn name(&self) -> &str {
        "memory"
    }

    fn find(
        &self,
        collection: &str,
        filter: &Document,
        options: &FindOptions,
        deadline: Option<Instant>,
    ) -> DriverResult<DocumentCursor> {
        self.begin(deadline)?;
        let mut docs = self.select(collection, filter)?;
        if let Some(sort) = &options.sort {
            sort_documents(&mut docs, sort)?;
        }
        let skip = usize::try_from(options.skip).unwrap_or(usize::MAX);
        let limit = options
            .limit
            .map_or(usize::MAX, |l| usize::try_from(l).unwrap_or(usize::MAX));
        let projection = options.projection.clone();
        let iter = docs.into_iter().skip(skip).take(limit).map(move |doc| {
            Ok(match &projection {
                Some(p) => project(doc, p),
                None => doc,
            })
        });
        Ok(Box::new(iter))
    }

    fn count(&self, collection: &str, filter: &Document, deadline: Option<Instant>) -> DriverResult<u64> {
        self.begin(deadline)?;
        Ok(self.select(collection, filter)?.len() as u64)
    }

    fn insert_one(&self, collection: &str, document: Document, deadline: Option<Instant>) -> DriverResult<()> {
        self.insert_many(collection, vec![document], deadline).map(|_| ())
    }

    fn insert_many(
        &self,
        collection: &str,
        documents: Vec<Document>,
        deadline: Option<Instant>,
    ) -> DriverResult<u64> {
        self.begin(deadline)?;
        let mut collections = self.collections.write();
        let stored = collections.entry(collection.to_string()).or_default();
        let mut inserted = 0;
        for mut document in documents {
            if !document.contains_key("_id") {
                document.insert("_id", ObjectId::new());
            }
            if let Some(id) = id_of(&document) {
                if stored.iter().any(|d| id_of(d).is_some_and(|other| ordering::equal(other, id))) {
                    return Err(duplicate_key(collection, id));
                }
            }
            stored.push(document);
            inserted += 1;
        }
        Ok(inserted)
    }

    fn replace_one(
        &self,
        collection: &str,
        filter: &Document,
        mut replacement: Document,
        deadline: Option<Instant>,
    ) -> DriverResult<u64> {
        self.begin(deadline)?;
        let mut collections = self.collections.write();
        let Some(stored) = collections.get_mut(collection) else {
            return Ok(0);
        };
        for slot in stored.iter_mut() {
            if !matches(slot, filter)? {
                continue;
            }
            let current_id = id_of(slot).cloned().unwrap_or(Bson::Null);
            match id_of(&replacement) {
                Some(new_id) if !ordering::equal(new_id, &current_id) => {
                    return Err(DriverError::permanent("replacement may not change _id"));
                }
                Some(_) => {}
                None => {
                    replacement.insert("_id", current_id);
                }
            }
            *slot = replacement;
            return Ok(1);
        }
        Ok(0)
    }

    fn update_many(
        &self,
        collection: &str,
        filter: &Document,
        update: &Document,
        deadline: Option<Instant>,
    ) -> DriverResult<u64> {
        self.begin(deadline)?;
        let mut collections = self.collections.write();
        let Some(stored) = collections.get_mut(collection) else {
            return Ok(0);
        };
        // Apply to copies first so a failing update leaves nothing half-written.
        let mut staged = Vec::new();
        for (index, doc) in stored.iter().enumerate() {
            if matches(doc, filter)? {
                let mut next = doc.clone();
                update::apply(&mut next, update)?;
                staged.push((index, next));
            }
        }
        let matched = staged.len() as u64;
        for (index, next) in staged {
            stored[index] = next;
        }
        Ok(matched)
    }

    fn update_one(
        &self,
        collection: &str,
        filter: &Document,
        update: &Document,
        deadline: Option<Instant>,
    ) -> DriverResult<u64> {
        self.begin(deadline)?;
        let mut collections = self.collections.write();
        let Some(stored) = collections.get_mut(collection) else {
            return Ok(0);
        };
        let Some(index) = first_match(stored, filter)? else {
            return Ok(0);
        };
        let mut next = stored[index].clone();
        update::apply(&mut next, update)?;
        stored[index] = next;
        Ok(1)
    }

    fn delete_one(&self, collection: &str, filter: &Document, deadline: Option<Instant>) -> DriverResult<u64> {
        self.begin(deadline)?;
        let mut collections = self.collections.write();
        let Some(stored) = collections.get_mut(collection) else {
            return Ok(0);
        };
        match first_match(stored, filter)? {
            Some(index) => {
                stored.remove(index);
                Ok(1)
            }
            None => Ok(0),
        }
    }

    fn delete_many(&self, collection: &str, filter: &Document, deadline: Option<Instant>) -> DriverResult<u64> {
        self.begin(deadline)?;
        let mut collections = self.collections.write();
        let Some(stored) = collections.get_mut(collection) else {
            return Ok(0);
        };
        let before = stored.len();
        let mut failure = None;
        stored.retain(|doc| match matches(doc, filter) {
            Ok(hit) => !hit,
            Err(e) => {
                failure.get_or_insert(e);
                true
            }
        });
        if let Some(e) = failure {
            return Err(e);
        }
        Ok((before - stored.len()) as u64)
    }

    fn ping(&self) -> DriverResult<()> {
        self.begin(None)
    }

    fn close(&self) {
        self.closed.store(true, AtomicOrdering::Release);
    }
}
