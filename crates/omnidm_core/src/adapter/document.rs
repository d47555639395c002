//! Document store adapter.

use super::{Adapter, RecordCursor};
use crate::descriptor::EntityDescriptor;
use crate::error::{OdmError, OdmResult};
use crate::query::{CompareOp, Direction, FieldPath, Predicate, ValidatedQuery, ValidatedUpdate};
use crate::retry::{self, RetryPolicy};
use omnidm_codec::bson::{Bson, Document};
use omnidm_codec::{encode_field, BackendKind, DocumentCodec, FieldCodec, FieldDescriptor, LogicalType, Record, Value};
use omnidm_driver::{DocumentDriver, DriverResult, FindOptions};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// Runs entity operations against a [`DocumentDriver`].
pub struct DocumentAdapter {
    name: String,
    driver: Arc<dyn DocumentDriver>,
    retry: RetryPolicy,
}

impl DocumentAdapter {
    /// Creates an adapter named `name` over `driver`.
    pub fn new(name: impl Into<String>, driver: Arc<dyn DocumentDriver>, retry: RetryPolicy) -> Self {
        Self {
            name: name.into(),
            driver,
            retry,
        }
    }

    /// The underlying driver.
    pub fn driver(&self) -> &Arc<dyn DocumentDriver> {
        &self.driver
    }

    /// Compiles a query's predicate into a filter document.
    ///
    /// # Errors
    ///
    /// Returns a value conversion error if a literal does not encode.
    pub fn filter_document(query: &ValidatedQuery) -> OdmResult<Document> {
        compile(query.descriptor(), query.predicate())
    }

    fn call<T>(
        &self,
        operation: &str,
        collection: &str,
        deadline: Option<Instant>,
        mut f: impl FnMut(&dyn DocumentDriver) -> DriverResult<T>,
    ) -> OdmResult<T> {
        debug!(backend = %self.name, collection, operation, "document operation");
        retry::run(&self.retry, &self.name, operation, deadline, || f(self.driver.as_ref()))
    }

    fn key_filter(descriptor: &EntityDescriptor, key: &Value) -> OdmResult<Document> {
        let mut filter = Document::new();
        filter.insert(crate::descriptor::DOCUMENT_ID_KEY, descriptor.encode_key::<DocumentCodec>(key)?);
        Ok(filter)
    }
}

impl fmt::Debug for DocumentAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DocumentAdapter")
            .field("name", &self.name)
            .field("driver", &self.driver.name())
            .finish_non_exhaustive()
    }
}

fn condition(key: String, op: &str, operand: Bson) -> Document {
    let mut inner = Document::new();
    inner.insert(op, operand);
    let mut outer = Document::new();
    outer.insert(key, inner);
    outer
}

fn literal(path: &FieldPath, value: &Value) -> OdmResult<Bson> {
    Ok(encode_field::<DocumentCodec>(path.leaf(), value)?)
}

fn compile(descriptor: &EntityDescriptor, predicate: &Predicate) -> OdmResult<Document> {
    let key = |path: &FieldPath| path.storage_path(descriptor, BackendKind::Document);
    Ok(match predicate {
        Predicate::Compare { path, op, value } => {
            let op = match op {
                CompareOp::Eq => "$eq",
                CompareOp::Ne => "$ne",
                CompareOp::Gt => "$gt",
                CompareOp::Gte => "$gte",
                CompareOp::Lt => "$lt",
                CompareOp::Lte => "$lte",
            };
            condition(key(path), op, literal(path, value)?)
        }
        Predicate::In { path, values } => {
            let list = values.iter().map(|v| literal(path, v)).collect::<OdmResult<Vec<_>>>()?;
            condition(key(path), "$in", Bson::Array(list))
        }
        Predicate::IsNull { path } => condition(key(path), "$eq", Bson::Null),
        Predicate::IsNotNull { path } => condition(key(path), "$ne", Bson::Null),
        Predicate::And(children) if children.is_empty() => Document::new(),
        Predicate::And(children) => junction("$and", descriptor, children)?,
        // `$or` rejects an empty array; match nothing instead.
        Predicate::Or(children) if children.is_empty() => {
            condition(crate::descriptor::DOCUMENT_ID_KEY.to_string(), "$in", Bson::Array(Vec::new()))
        }
        Predicate::Or(children) => junction("$or", descriptor, children)?,
        Predicate::Not(child) => {
            let mut doc = Document::new();
            doc.insert("$nor", Bson::Array(vec![Bson::Document(compile(descriptor, child)?)]));
            doc
        }
    })
}

fn junction(op: &str, descriptor: &EntityDescriptor, children: &[Predicate]) -> OdmResult<Document> {
    let compiled = children
        .iter()
        .map(|c| compile(descriptor, c).map(Bson::Document))
        .collect::<OdmResult<Vec<_>>>()?;
    let mut doc = Document::new();
    doc.insert(op, Bson::Array(compiled));
    Ok(doc)
}

fn find_options(query: &ValidatedQuery) -> FindOptions {
    let descriptor = query.descriptor();
    let sort = (!query.sort().is_empty()).then(|| {
        query
            .sort()
            .iter()
            .map(|(path, direction)| {
                let order = match direction {
                    Direction::Ascending => 1,
                    Direction::Descending => -1,
                };
                (path.storage_path(descriptor, BackendKind::Document), Bson::Int32(order))
            })
            .collect::<Document>()
    });
    let projection = query.projection().map(|fields| {
        fields
            .iter()
            .map(|f| (descriptor.storage_key(f, BackendKind::Document).to_string(), Bson::Int32(1)))
            .collect::<Document>()
    });
    FindOptions {
        sort,
        skip: query.offset(),
        limit: query.limit(),
        projection,
    }
}

/// `$set`, `$inc` and `$push` operators for a validated update.
fn update_document(descriptor: &EntityDescriptor, update: &ValidatedUpdate) -> OdmResult<Document> {
    let key = |field: &FieldDescriptor| descriptor.storage_key(field, BackendKind::Document).to_string();
    let encode = |pairs: &[(FieldDescriptor, Value)]| -> OdmResult<Document> {
        pairs
            .iter()
            .map(|(field, value)| Ok((key(field), encode_field::<DocumentCodec>(field, value)?)))
            .collect()
    };
    let mut native = Document::new();
    if !update.assignments().is_empty() {
        native.insert("$set", encode(update.assignments())?);
    }
    if !update.increments().is_empty() {
        native.insert("$inc", encode(update.increments())?);
    }
    if !update.pushes().is_empty() {
        let mut push = Document::new();
        for (field, element) in update.pushes() {
            let LogicalType::Sequence(element_type) = field.logical_type() else {
                return Err(OdmError::value_conversion(field.name(), "push needs a sequence field"));
            };
            let native = DocumentCodec::encode(element, element_type).map_err(|e| e.at_field(field.name()))?;
            push.insert(key(field), native);
        }
        native.insert("$push", push);
    }
    Ok(native)
}

fn to_document(descriptor: &EntityDescriptor, record: &Record) -> OdmResult<Document> {
    Ok(descriptor
        .to_native_record::<DocumentCodec>(record)?
        .into_iter()
        .collect())
}

impl Adapter for DocumentAdapter {
    fn backend(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Document
    }

    fn ensure_schema(&self, _descriptor: &EntityDescriptor, _deadline: Option<Instant>) -> OdmResult<()> {
        Ok(())
    }

    fn find(&self, query: &ValidatedQuery, deadline: Option<Instant>) -> OdmResult<RecordCursor> {
        let descriptor = Arc::clone(query.descriptor());
        let filter = compile(&descriptor, query.predicate())?;
        let options = find_options(query);
        let collection = descriptor.collection();
        let cursor = self.call("find", collection, deadline, |d| {
            d.find(collection, &filter, &options, deadline)
        })?;

        let fields: Vec<FieldDescriptor> = query.selected_fields().into_iter().cloned().collect();
        let backend = self.name.clone();
        Ok(RecordCursor::new(cursor.map(move |item| {
            let doc = item.map_err(|e| OdmError::from_driver(&backend, "find", e))?;
            let refs: Vec<&FieldDescriptor> = fields.iter().collect();
            descriptor.decode_fields::<DocumentCodec, Document>(&refs, &doc)
        })))
    }

    fn count(&self, query: &ValidatedQuery, deadline: Option<Instant>) -> OdmResult<u64> {
        let filter = compile(query.descriptor(), query.predicate())?;
        let collection = query.descriptor().collection();
        self.call("count", collection, deadline, |d| d.count(collection, &filter, deadline))
    }

    fn contains_key(&self, descriptor: &EntityDescriptor, key: &Value, deadline: Option<Instant>) -> OdmResult<bool> {
        let filter = Self::key_filter(descriptor, key)?;
        let collection = descriptor.collection();
        let n = self.call("contains_key", collection, deadline, |d| d.count(collection, &filter, deadline))?;
        Ok(n > 0)
    }

    fn insert(&self, descriptor: &EntityDescriptor, records: &[Record], deadline: Option<Instant>) -> OdmResult<u64> {
        let docs = records
            .iter()
            .map(|r| to_document(descriptor, r))
            .collect::<OdmResult<Vec<_>>>()?;
        let collection = descriptor.collection();
        match docs.len() {
            0 => Ok(0),
            1 => {
                self.call("insert", collection, deadline, |d| {
                    d.insert_one(collection, docs[0].clone(), deadline)
                })?;
                Ok(1)
            }
            _ => self.call("insert_many", collection, deadline, |d| {
                d.insert_many(collection, docs.clone(), deadline)
            }),
        }
    }

    fn replace(&self, descriptor: &EntityDescriptor, record: &Record, deadline: Option<Instant>) -> OdmResult<u64> {
        let doc = to_document(descriptor, record)?;
        let filter = Self::key_filter(descriptor, &descriptor.key_of(record)?)?;
        let collection = descriptor.collection();
        self.call("replace", collection, deadline, |d| {
            d.replace_one(collection, &filter, doc.clone(), deadline)
        })
    }

    fn update_fields(
        &self,
        descriptor: &EntityDescriptor,
        key: &Value,
        record: &Record,
        fields: &[&FieldDescriptor],
        deadline: Option<Instant>,
    ) -> OdmResult<u64> {
        if fields.is_empty() {
            return self.contains_key(descriptor, key, deadline).map(u64::from);
        }
        let filter = Self::key_filter(descriptor, key)?;
        let set: Document = descriptor
            .encode_fields::<DocumentCodec>(fields, record)?
            .into_iter()
            .collect();
        let mut update = Document::new();
        update.insert("$set", set);
        let collection = descriptor.collection();
        self.call("update", collection, deadline, |d| {
            d.update_many(collection, &filter, &update, deadline)
        })
    }

    fn update_where(
        &self,
        query: &ValidatedQuery,
        update: &ValidatedUpdate,
        deadline: Option<Instant>,
    ) -> OdmResult<u64> {
        let filter = compile(query.descriptor(), query.predicate())?;
        let native = update_document(query.descriptor(), update)?;
        let collection = query.descriptor().collection();
        self.call("update_many", collection, deadline, |d| {
            d.update_many(collection, &filter, &native, deadline)
        })
    }

    fn update_one(
        &self,
        query: &ValidatedQuery,
        update: &ValidatedUpdate,
        deadline: Option<Instant>,
    ) -> OdmResult<u64> {
        let filter = compile(query.descriptor(), query.predicate())?;
        let native = update_document(query.descriptor(), update)?;
        let collection = query.descriptor().collection();
        self.call("update_one", collection, deadline, |d| {
            d.update_one(collection, &filter, &native, deadline)
        })
    }

    fn delete(&self, query: &ValidatedQuery, deadline: Option<Instant>) -> OdmResult<u64> {
        let filter = compile(query.descriptor(), query.predicate())?;
        let collection = query.descriptor().collection();
        self.call("delete", collection, deadline, |d| d.delete_many(collection, &filter, deadline))
    }

    fn delete_one(&self, query: &ValidatedQuery, deadline: Option<Instant>) -> OdmResult<u64> {
        let filter = compile(query.descriptor(), query.predicate())?;
        let collection = query.descriptor().collection();
        self.call("delete_one", collection, deadline, |d| d.delete_one(collection, &filter, deadline))
    }

    fn ping(&self) -> OdmResult<()> {
        self.call("ping", "", None, |d| d.ping())
    }

    fn close(&self) {
        self.driver.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::DescriptorBuilder;
    use crate::query::{and, eq, gt, in_list, is_not_null, is_null, not, or, Query, Update};
    use omnidm_codec::bson::doc;
    use omnidm_codec::{LogicalType, Shape};
    use omnidm_driver::MemoryDocumentStore;

    fn users() -> Arc<EntityDescriptor> {
        Arc::new(
            DescriptorBuilder::new("User")
                .collection("users")
                .field(FieldDescriptor::integer("id").primary_key())
                .field(FieldDescriptor::text("name"))
                .field(FieldDescriptor::integer("age").nullable())
                .field(FieldDescriptor::float("score").nullable())
                .field(FieldDescriptor::nested(
                    "address",
                    Shape::new("Address", vec![FieldDescriptor::text("city").stored_as("town")]),
                ).nullable())
                .field(FieldDescriptor::sequence("tags", LogicalType::Text).nullable())
                .build()
                .unwrap(),
        )
    }

    fn adapter() -> (Arc<MemoryDocumentStore>, DocumentAdapter) {
        let store = Arc::new(MemoryDocumentStore::new());
        let adapter = DocumentAdapter::new("docs", store.clone(), RetryPolicy::no_retry());
        (store, adapter)
    }

    fn user(id: i64, name: &str, age: Option<i64>) -> Record {
        Record::new().with("id", id).with("name", name).with("age", age)
    }

    fn filter(query: Query) -> Document {
        DocumentAdapter::filter_document(&query.validate(&users()).unwrap()).unwrap()
    }

    #[test]
    fn filters_use_native_operators() {
        assert_eq!(
            filter(Query::matching(and([gt("age", 30), eq("address.city", "Oslo")]))),
            doc! { "$and": [ { "age": { "$gt": 30_i64 } }, { "address.town": { "$eq": "Oslo" } } ] }
        );
        assert_eq!(filter(Query::matching(eq("id", 7))), doc! { "_id": { "$eq": 7_i64 } });
        assert_eq!(
            filter(Query::matching(or([is_null("age"), not(is_not_null("name"))]))),
            doc! { "$or": [ { "age": { "$eq": null } }, { "$nor": [ { "name": { "$ne": null } } ] } ] }
        );
        assert_eq!(
            filter(Query::matching(in_list("id", [1, 2]))),
            doc! { "_id": { "$in": [1_i64, 2_i64] } }
        );
        assert_eq!(filter(Query::all()), doc! {});
        assert_eq!(filter(Query::matching(or([]))), doc! { "_id": { "$in": [] } });
    }

    #[test]
    fn primary_key_is_the_document_id() {
        let (store, adapter) = adapter();
        let d = users();
        adapter.insert(&d, &[user(1, "a", Some(30))], None).unwrap();
        let stored = store.snapshot("users");
        assert_eq!(stored[0].get("_id"), Some(&Bson::Int64(1)));
        assert!(stored[0].get("id").is_none());
        assert!(adapter.contains_key(&d, &Value::Integer(1), None).unwrap());
        assert!(!adapter.contains_key(&d, &Value::Integer(2), None).unwrap());
    }

    #[test]
    fn find_sorts_pages_and_projects() {
        let (_, adapter) = adapter();
        let d = users();
        let records: Vec<Record> = (1..=5).map(|i| user(i, &format!("u{i}"), Some(40 - i))).collect();
        assert_eq!(adapter.insert(&d, &records, None).unwrap(), 5);

        let q = Query::all().sort_asc("age").offset(1).limit(2).validate(&d).unwrap();
        let ids: Vec<i64> = adapter
            .find(&q, None)
            .unwrap()
            .map(|r| r.unwrap().field::<i64>("id").unwrap())
            .collect();
        assert_eq!(ids, [4, 3]);

        let q = Query::matching(eq("id", 2)).select(["name"]).validate(&d).unwrap();
        let found: Vec<Record> = adapter.find(&q, None).unwrap().map(Result::unwrap).collect();
        assert_eq!(found, vec![Record::new().with("name", "u2")]);
    }

    #[test]
    fn replace_and_partial_update() {
        let (store, adapter) = adapter();
        let d = users();
        adapter.insert(&d, &[user(1, "a", Some(30))], None).unwrap();
        assert_eq!(adapter.replace(&d, &user(1, "b", None), None).unwrap(), 1);
        assert_eq!(store.snapshot("users")[0].get("age"), Some(&Bson::Null));

        let name = d.field("name").unwrap();
        let n = adapter
            .update_fields(&d, &Value::Integer(1), &user(1, "c", Some(99)), &[name], None)
            .unwrap();
        assert_eq!(n, 1);
        let doc = &store.snapshot("users")[0];
        assert_eq!(doc.get_str("name").unwrap(), "c");
        assert_eq!(doc.get("age"), Some(&Bson::Null));
    }

    #[test]
    fn bulk_update_and_delete() {
        let (_, adapter) = adapter();
        let d = users();
        adapter
            .insert(&d, &[user(1, "a", Some(30)), user(2, "b", None), user(3, "c", Some(50))], None)
            .unwrap();
        let q = Query::matching(is_not_null("name")).validate(&d).unwrap();
        let u = Update::new().inc("age", 1).set("score", 2).validate(&d).unwrap();
        assert_eq!(adapter.update_where(&q, &u, None).unwrap(), 3);

        let q = Query::matching(eq("age", 1)).validate(&d).unwrap();
        assert_eq!(adapter.count(&q, None).unwrap(), 1);
        let q = Query::matching(gt("age", 30)).validate(&d).unwrap();
        assert_eq!(adapter.delete(&q, None).unwrap(), 2);
        assert_eq!(adapter.count(&ValidatedQuery::all(&d), None).unwrap(), 1);
    }

    #[test]
    fn push_and_single_record_writes() {
        let (store, adapter) = adapter();
        let d = users();
        adapter
            .insert(&d, &[user(1, "a", Some(30)), user(2, "b", Some(30)), user(3, "c", None)], None)
            .unwrap();
        let q = Query::matching(eq("age", 30)).validate(&d).unwrap();
        let u = Update::new().push("tags", "x").validate(&d).unwrap();
        assert_eq!(adapter.update_one(&q, &u, None).unwrap(), 1);
        let docs = store.snapshot("users");
        assert_eq!(docs[0].get_array("tags").unwrap(), &vec![Bson::from("x")]);
        assert!(matches!(docs[1].get("tags"), None | Some(Bson::Null)));

        assert_eq!(adapter.update_where(&q, &u, None).unwrap(), 2);
        let docs = store.snapshot("users");
        assert_eq!(docs[0].get_array("tags").unwrap().len(), 2);
        assert_eq!(docs[1].get_array("tags").unwrap().len(), 1);

        assert_eq!(adapter.delete_one(&q, None).unwrap(), 1);
        assert_eq!(adapter.count(&q, None).unwrap(), 1);
        let none = Query::matching(eq("age", 99)).validate(&d).unwrap();
        assert_eq!(adapter.delete_one(&none, None).unwrap(), 0);
        assert_eq!(adapter.update_one(&none, &u, None).unwrap(), 0);
    }

    #[test]
    fn duplicate_ids_are_constraint_violations() {
        let (_, adapter) = adapter();
        let d = users();
        adapter.insert(&d, &[user(1, "a", None)], None).unwrap();
        let err = adapter.insert(&d, &[user(1, "b", None)], None).unwrap_err();
        assert!(matches!(err, OdmError::ConstraintViolation { ref backend, .. } if backend == "docs"));
    }

    #[test]
    fn transient_failures_are_retried() {
        let store = Arc::new(MemoryDocumentStore::new());
        let retry = RetryPolicy::new(3)
            .with_initial_delay(std::time::Duration::from_millis(1))
            .with_jitter(false);
        let adapter = DocumentAdapter::new("docs", store.clone(), retry);
        store.fail_next(2);
        assert!(adapter.ping().is_ok());
        store.fail_next(3);
        let err = adapter.ping().unwrap_err();
        assert!(matches!(err, OdmError::BackendExecution { .. }));
    }

    #[test]
    fn invalid_records_write_nothing() {
        let (store, adapter) = adapter();
        let d = users();
        let bad = user(2, "b", None).with("age", "old");
        let err = adapter.insert(&d, &[user(1, "a", None), bad], None).unwrap_err();
        assert!(matches!(err, OdmError::ValueConversion { ref field, .. } if field == "age"));
        assert!(store.snapshot("users").is_empty());
    }
}
