//! Relational adapter: parameterized SQL over pooled connections.

mod dialect;
mod pool;
mod shapes;
pub mod statement;

pub use dialect::Dialect;
pub use pool::{PooledConnection, SqlPool};
pub use statement::Statement;

use super::{Adapter, RecordCursor};
use crate::descriptor::EntityDescriptor;
use crate::error::{OdmError, OdmResult};
use crate::query::{ValidatedQuery, ValidatedUpdate};
use crate::retry::{self, RetryPolicy};
use omnidm_codec::{BackendKind, FieldDescriptor, Record, RelationalCodec, SqlValue, Value};
use omnidm_driver::{DriverResult, RowCursor};
use shapes::{ShapeCache, ShapeKind};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// Rows fetched per round trip by a lazy result cursor.
pub const DEFAULT_FETCH_SIZE: usize = 256;

/// Runs entity operations as SQL in one dialect.
///
/// Each write checks a connection out of the pool for the duration of the
/// statement. A read keeps its connection until the cursor is exhausted
/// or dropped, fetching `fetch_size` rows per round trip.
pub struct RelationalAdapter {
    name: String,
    dialect: Dialect,
    pool: SqlPool,
    retry: RetryPolicy,
    shapes: ShapeCache,
    fetch_size: u64,
}

impl RelationalAdapter {
    /// Creates an adapter named `name` over `pool`.
    pub fn new(name: impl Into<String>, dialect: Dialect, pool: SqlPool, retry: RetryPolicy) -> Self {
        Self {
            name: name.into(),
            dialect,
            pool,
            retry,
            shapes: ShapeCache::new(dialect),
            fetch_size: DEFAULT_FETCH_SIZE as u64,
        }
    }

    /// Sets how many rows a cursor fetches per round trip (at least 1).
    #[must_use]
    pub fn with_fetch_size(mut self, fetch_size: usize) -> Self {
        self.fetch_size = fetch_size.max(1) as u64;
        self
    }

    /// The SQL dialect.
    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// The connection pool.
    pub fn pool(&self) -> &SqlPool {
        &self.pool
    }

    /// Runs `f` on a pooled connection and hands the connection back to
    /// the caller along with the result, retrying transient failures.
    ///
    /// A connection that fails transiently and then fails a ping is
    /// discarded rather than returned to the pool.
    fn with_held_connection<T>(
        &self,
        operation: &str,
        deadline: Option<Instant>,
        mut f: impl FnMut(&mut PooledConnection) -> DriverResult<T>,
    ) -> OdmResult<(PooledConnection, T)> {
        retry::run(&self.retry, &self.name, operation, deadline, || {
            let mut conn = self.pool.checkout(deadline)?;
            match f(&mut conn) {
                Ok(value) => Ok((conn, value)),
                Err(e) => {
                    discard_if_dead(&mut conn, &e);
                    Err(e)
                }
            }
        })
    }

    fn with_connection<T>(
        &self,
        operation: &str,
        deadline: Option<Instant>,
        f: impl FnMut(&mut PooledConnection) -> DriverResult<T>,
    ) -> OdmResult<T> {
        self.with_held_connection(operation, deadline, f).map(|(_, value)| value)
    }

    fn execute(&self, operation: &str, statement: &Statement, deadline: Option<Instant>) -> OdmResult<u64> {
        debug!(backend = %self.name, sql = %statement.sql, params = statement.params.len(), "execute");
        self.with_connection(operation, deadline, |conn| {
            conn.execute(&statement.sql, &statement.params, deadline)
        })
    }

    fn query(
        &self,
        operation: &str,
        statement: &Statement,
        deadline: Option<Instant>,
    ) -> OdmResult<Box<dyn RowCursor>> {
        debug!(backend = %self.name, sql = %statement.sql, params = statement.params.len(), "query");
        self.with_connection(operation, deadline, |conn| {
            conn.query(&statement.sql, &statement.params, deadline)
        })
    }

    /// Runs several statements atomically on one connection.
    ///
    /// A failed statement or COMMIT rolls the transaction back before the
    /// connection is returned; if the rollback fails too, the connection
    /// is discarded so no later caller inherits the open transaction.
    fn execute_batch(&self, operation: &str, statements: &[Statement], deadline: Option<Instant>) -> OdmResult<u64> {
        if let [single] = statements {
            return self.execute(operation, single, deadline);
        }
        debug!(backend = %self.name, statements = statements.len(), "batch");
        self.with_connection(operation, deadline, |conn| {
            conn.execute("BEGIN", &[], deadline)?;
            let mut total = 0;
            for statement in statements {
                match conn.execute(&statement.sql, &statement.params, deadline) {
                    Ok(n) => total += n,
                    Err(e) => {
                        self.roll_back(conn);
                        return Err(e);
                    }
                }
            }
            if let Err(e) = conn.execute("COMMIT", &[], deadline) {
                self.roll_back(conn);
                return Err(e);
            }
            Ok(total)
        })
    }

    fn roll_back(&self, conn: &mut PooledConnection) {
        if let Err(error) = conn.execute("ROLLBACK", &[], None) {
            warn!(backend = %self.name, %error, "rollback failed, discarding connection");
            conn.poison();
        }
    }

    fn key_param(descriptor: &EntityDescriptor, key: &Value) -> OdmResult<SqlValue> {
        descriptor.encode_key::<RelationalCodec>(key)
    }
}

fn discard_if_dead(conn: &mut PooledConnection, error: &omnidm_driver::DriverError) {
    if error.is_retryable() && conn.ping().is_err() {
        conn.poison();
    }
}

/// Reads a query's rows a window at a time on one held connection.
///
/// Each window is its own statement, so rows committed by other
/// connections between fetches may shift later windows. The connection
/// goes back to the pool once a short window has been drained, an error
/// is reported, or the reader is dropped.
struct PagedRows {
    backend: String,
    dialect: Dialect,
    query: ValidatedQuery,
    prefix: Arc<str>,
    fields: Vec<FieldDescriptor>,
    columns: Vec<String>,
    fetch_size: u64,
    deadline: Option<Instant>,
    conn: Option<PooledConnection>,
    rows: Box<dyn RowCursor>,
    read: u64,
    in_window: u64,
}

impl PagedRows {
    fn fail(&mut self, error: omnidm_driver::DriverError) -> OdmError {
        if let Some(conn) = self.conn.as_mut() {
            discard_if_dead(conn, &error);
        }
        self.conn = None;
        OdmError::from_driver(&self.backend, "find", error)
    }

    /// Fetches the next window; `Ok(false)` once the results are exhausted.
    fn advance(&mut self) -> OdmResult<bool> {
        if self.in_window < self.fetch_size {
            return Ok(false);
        }
        let window = self.query.window(self.read, self.fetch_size);
        if window.limit() == Some(0) {
            return Ok(false);
        }
        let statement = statement::select(self.dialect, &window, &self.prefix)?;
        debug!(backend = %self.backend, sql = %statement.sql, offset = window.offset(), "fetch");
        let Some(conn) = self.conn.as_mut() else {
            return Ok(false);
        };
        match conn.query(&statement.sql, &statement.params, self.deadline) {
            Ok(rows) => {
                self.rows = rows;
                self.in_window = 0;
                Ok(true)
            }
            Err(e) => Err(self.fail(e)),
        }
    }
}

impl Iterator for PagedRows {
    type Item = OdmResult<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        while self.conn.is_some() {
            match self.rows.next_row() {
                Ok(Some(values)) => {
                    self.read += 1;
                    self.in_window += 1;
                    let row: Vec<(String, SqlValue)> = self.columns.iter().cloned().zip(values).collect();
                    let refs: Vec<&FieldDescriptor> = self.fields.iter().collect();
                    return Some(self.query.descriptor().decode_fields::<RelationalCodec, _>(&refs, &row));
                }
                Ok(None) => match self.advance() {
                    Ok(true) => {}
                    Ok(false) => self.conn = None,
                    Err(e) => {
                        self.conn = None;
                        return Some(Err(e));
                    }
                },
                Err(e) => return Some(Err(self.fail(e))),
            }
        }
        None
    }
}

impl fmt::Debug for RelationalAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelationalAdapter")
            .field("name", &self.name)
            .field("dialect", &self.dialect)
            .field("pool", &self.pool)
            .field("fetch_size", &self.fetch_size)
            .finish_non_exhaustive()
    }
}

impl Adapter for RelationalAdapter {
    fn backend(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Relational
    }

    fn ensure_schema(&self, descriptor: &EntityDescriptor, deadline: Option<Instant>) -> OdmResult<()> {
        let sql = self.shapes.get(descriptor, ShapeKind::CreateTable);
        self.execute("create_table", &Statement::new(&*sql, Vec::new()), deadline)?;
        Ok(())
    }

    fn find(&self, query: &ValidatedQuery, deadline: Option<Instant>) -> OdmResult<RecordCursor> {
        let descriptor = query.descriptor();
        let fields: Vec<FieldDescriptor> = query.selected_fields().into_iter().cloned().collect();
        let prefix: Arc<str> = if query.projection().is_none() {
            self.shapes.get(descriptor, ShapeKind::SelectAll)
        } else {
            let refs: Vec<&FieldDescriptor> = fields.iter().collect();
            statement::select_prefix(self.dialect, descriptor, &refs).into()
        };
        let window = query.window(0, self.fetch_size);
        if window.limit() == Some(0) {
            return Ok(RecordCursor::empty());
        }
        let statement = statement::select(self.dialect, &window, &prefix)?;
        debug!(backend = %self.name, sql = %statement.sql, params = statement.params.len(), "query");
        let (conn, rows) = self.with_held_connection("find", deadline, |conn| {
            conn.query(&statement.sql, &statement.params, deadline)
        })?;

        Ok(RecordCursor::new(PagedRows {
            backend: self.name.clone(),
            dialect: self.dialect,
            query: query.clone(),
            prefix,
            fields,
            columns: rows.columns().to_vec(),
            fetch_size: self.fetch_size,
            deadline,
            conn: Some(conn),
            rows,
            read: 0,
            in_window: 0,
        }))
    }

    fn count(&self, query: &ValidatedQuery, deadline: Option<Instant>) -> OdmResult<u64> {
        let statement = statement::count(self.dialect, query)?;
        let mut rows = self.query("count", &statement, deadline)?;
        match rows.next_row() {
            Ok(Some(values)) => match values.first() {
                Some(SqlValue::Integer(n)) => Ok(u64::try_from(*n).unwrap_or(0)),
                other => Err(OdmError::BackendExecution {
                    backend: self.name.clone(),
                    message: format!("COUNT(*) returned {other:?}"),
                }),
            },
            Ok(None) => Ok(0),
            Err(e) => Err(OdmError::from_driver(&self.name, "count", e)),
        }
    }

    fn contains_key(&self, descriptor: &EntityDescriptor, key: &Value, deadline: Option<Instant>) -> OdmResult<bool> {
        let sql = self.shapes.get(descriptor, ShapeKind::ExistsByKey);
        let statement = Statement::new(&*sql, vec![Self::key_param(descriptor, key)?]);
        let mut rows = self.query("contains_key", &statement, deadline)?;
        rows.next_row()
            .map(|row| row.is_some())
            .map_err(|e| OdmError::from_driver(&self.name, "contains_key", e))
    }

    fn insert(&self, descriptor: &EntityDescriptor, records: &[Record], deadline: Option<Instant>) -> OdmResult<u64> {
        let rows = records
            .iter()
            .map(|r| descriptor.to_native_record::<RelationalCodec>(r))
            .collect::<OdmResult<Vec<_>>>()?;
        match rows.len() {
            0 => Ok(0),
            1 => {
                let sql = self.shapes.get(descriptor, ShapeKind::InsertOne);
                let params = rows.into_iter().flatten().map(|(_, v)| v).collect();
                self.execute("insert", &Statement::new(&*sql, params), deadline)
            }
            _ => {
                let statements = statement::insert_many(self.dialect, descriptor, rows);
                self.execute_batch("insert_many", &statements, deadline)
            }
        }
    }

    fn replace(&self, descriptor: &EntityDescriptor, record: &Record, deadline: Option<Instant>) -> OdmResult<u64> {
        descriptor.check(record)?;
        let key = descriptor.key_of(record)?;
        let fields: Vec<&FieldDescriptor> = descriptor.fields().iter().filter(|f| !f.is_primary_key()).collect();
        if fields.is_empty() {
            return self.contains_key(descriptor, &key, deadline).map(u64::from);
        }
        let mut params: Vec<SqlValue> = descriptor
            .encode_fields::<RelationalCodec>(&fields, record)?
            .into_iter()
            .map(|(_, v)| v)
            .collect();
        params.push(Self::key_param(descriptor, &key)?);
        let sql = self.shapes.get(descriptor, ShapeKind::ReplaceByKey);
        self.execute("replace", &Statement::new(&*sql, params), deadline)
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
        let mut params: Vec<SqlValue> = descriptor
            .encode_fields::<RelationalCodec>(fields, record)?
            .into_iter()
            .map(|(_, v)| v)
            .collect();
        params.push(Self::key_param(descriptor, key)?);
        let sql = statement::update_by_key(self.dialect, descriptor, fields);
        self.execute("update", &Statement::new(sql, params), deadline)
    }

    fn update_where(
        &self,
        query: &ValidatedQuery,
        update: &ValidatedUpdate,
        deadline: Option<Instant>,
    ) -> OdmResult<u64> {
        let statement = statement::update_where(self.dialect, query, update)?;
        self.execute("update_many", &statement, deadline)
    }

    fn update_one(
        &self,
        query: &ValidatedQuery,
        update: &ValidatedUpdate,
        deadline: Option<Instant>,
    ) -> OdmResult<u64> {
        let statement = statement::update_first(self.dialect, query, update)?;
        self.execute("update_one", &statement, deadline)
    }

    fn delete(&self, query: &ValidatedQuery, deadline: Option<Instant>) -> OdmResult<u64> {
        let statement = statement::delete(self.dialect, query)?;
        self.execute("delete", &statement, deadline)
    }

    fn delete_one(&self, query: &ValidatedQuery, deadline: Option<Instant>) -> OdmResult<u64> {
        let statement = statement::delete_first(self.dialect, query)?;
        self.execute("delete_one", &statement, deadline)
    }

    fn ping(&self) -> OdmResult<()> {
        self.with_connection("ping", None, |conn| conn.ping())
    }

    fn close(&self) {
        self.pool.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::DescriptorBuilder;
    use crate::query::{eq, gt, is_null, Query, Update};
    use omnidm_codec::{LogicalType, Shape};
    use omnidm_driver::{DriverError, SqlConnection, SqlConnector, SqliteConnector};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn users() -> Arc<EntityDescriptor> {
        Arc::new(
            DescriptorBuilder::new("User")
                .collection("users")
                .field(FieldDescriptor::integer("id").primary_key())
                .field(FieldDescriptor::text("name").stored_as("full_name"))
                .field(FieldDescriptor::integer("age").nullable())
                .field(FieldDescriptor::boolean("active"))
                .field(
                    FieldDescriptor::nested("address", Shape::new("Address", vec![FieldDescriptor::text("city")]))
                        .nullable(),
                )
                .field(FieldDescriptor::sequence("tags", LogicalType::Text).nullable())
                .build()
                .unwrap(),
        )
    }

    fn adapter() -> RelationalAdapter {
        adapter_over(Arc::new(SqliteConnector::memory()))
    }

    fn adapter_over(connector: Arc<dyn SqlConnector>) -> RelationalAdapter {
        let pool = SqlPool::new(connector, 1, Duration::from_secs(1));
        let adapter = RelationalAdapter::new("sql", Dialect::Sqlite, pool, RetryPolicy::no_retry());
        adapter.ensure_schema(&users(), None).unwrap();
        adapter
    }

    /// SQLite connections whose COMMIT and ROLLBACK can be made to fail.
    struct Unreliable {
        inner: SqliteConnector,
        commits_to_fail: Arc<AtomicUsize>,
        rollback_fails: bool,
    }

    struct UnreliableConnection {
        inner: Box<dyn SqlConnection>,
        commits_to_fail: Arc<AtomicUsize>,
        rollback_fails: bool,
    }

    impl SqlConnection for UnreliableConnection {
        fn execute(&mut self, sql: &str, params: &[SqlValue], deadline: Option<Instant>) -> DriverResult<u64> {
            let fail_commit = sql == "COMMIT"
                && self
                    .commits_to_fail
                    .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                    .is_ok();
            if fail_commit {
                return Err(DriverError::Timeout);
            }
            if sql == "ROLLBACK" && self.rollback_fails {
                return Err(DriverError::permanent("connection reset during rollback"));
            }
            self.inner.execute(sql, params, deadline)
        }

        fn query(&mut self, sql: &str, params: &[SqlValue], deadline: Option<Instant>) -> DriverResult<Box<dyn RowCursor>> {
            self.inner.query(sql, params, deadline)
        }

        fn ping(&mut self) -> DriverResult<()> {
            self.inner.ping()
        }
    }

    impl SqlConnector for Unreliable {
        fn name(&self) -> &str {
            "unreliable"
        }

        fn connect(&self, timeout: Duration) -> DriverResult<Box<dyn SqlConnection>> {
            Ok(Box::new(UnreliableConnection {
                inner: self.inner.connect(timeout)?,
                commits_to_fail: Arc::clone(&self.commits_to_fail),
                rollback_fails: self.rollback_fails,
            }))
        }
    }

    fn unreliable(commits_to_fail: usize, rollback_fails: bool) -> RelationalAdapter {
        adapter_over(Arc::new(Unreliable {
            inner: SqliteConnector::memory(),
            commits_to_fail: Arc::new(AtomicUsize::new(commits_to_fail)),
            rollback_fails,
        }))
    }

    fn user(id: i64, name: &str, age: Option<i64>, active: bool) -> Record {
        Record::new()
            .with("id", id)
            .with("name", name)
            .with("age", age)
            .with("active", active)
    }

    fn ids(adapter: &RelationalAdapter, query: Query) -> Vec<i64> {
        let q = query.validate(&users()).unwrap();
        adapter
            .find(&q, None)
            .unwrap()
            .map(|r| r.unwrap().field::<i64>("id").unwrap())
            .collect()
    }

    #[test]
    fn insert_find_round_trip() {
        let a = adapter();
        let d = users();
        let record = user(1, "a", Some(30), true)
            .with("address", Record::new().with("city", "Oslo"))
            .with("tags", Value::sequence(["x", "y"]));
        assert_eq!(a.insert(&d, &[record.clone()], None).unwrap(), 1);
        let found: Vec<Record> = a
            .find(&ValidatedQuery::by_key(&d, Value::Integer(1)).unwrap(), None)
            .unwrap()
            .map(Result::unwrap)
            .collect();
        assert_eq!(found, vec![record]);
    }

    #[test]
    fn batch_insert_and_filtering() {
        let a = adapter();
        let d = users();
        let records: Vec<Record> = (1..=6).map(|i| user(i, "n", (i % 2 == 0).then_some(i * 10), i < 4)).collect();
        assert_eq!(a.insert(&d, &records, None).unwrap(), 6);
        assert_eq!(ids(&a, Query::matching(gt("age", 15)).sort_desc("age")), [6, 4, 2]);
        assert_eq!(ids(&a, Query::matching(is_null("age"))), [1, 3, 5]);
        assert_eq!(ids(&a, Query::all().after(4)), [5, 6]);
        let q = Query::matching(eq("active", true)).validate(&d).unwrap();
        assert_eq!(a.count(&q, None).unwrap(), 3);
    }

    #[test]
    fn duplicate_keys_are_constraint_violations() {
        let a = adapter();
        let d = users();
        a.insert(&d, &[user(1, "a", None, true)], None).unwrap();
        let err = a.insert(&d, &[user(1, "b", None, true)], None).unwrap_err();
        assert!(matches!(err, OdmError::ConstraintViolation { ref backend, .. } if backend == "sql"));
    }

    #[test]
    fn failed_batches_roll_back() {
        let a = adapter();
        let d = users();
        let records = vec![user(1, "a", None, true), user(1, "b", None, true)];
        assert!(a.insert(&d, &records, None).is_err());
        assert_eq!(a.count(&ValidatedQuery::all(&d), None).unwrap(), 0);
    }

    #[test]
    fn replace_update_and_delete() {
        let a = adapter();
        let d = users();
        a.insert(&d, &[user(1, "a", Some(1), true), user(2, "b", None, false)], None).unwrap();
        assert!(a.contains_key(&d, &Value::Integer(2), None).unwrap());
        assert_eq!(a.replace(&d, &user(2, "c", Some(5), true), None).unwrap(), 1);
        assert_eq!(a.replace(&d, &user(9, "z", None, true), None).unwrap(), 0);

        let name = d.field("name").unwrap();
        let n = a.update_fields(&d, &Value::Integer(1), &user(1, "renamed", None, false), &[name], None);
        assert_eq!(n.unwrap(), 1);

        let q = ValidatedQuery::all(&d);
        let u = Update::new().inc("age", 10).validate(&d).unwrap();
        assert_eq!(a.update_where(&q, &u, None).unwrap(), 2);

        let rows: Vec<Record> = a.find(&q, None).unwrap().map(Result::unwrap).collect();
        assert_eq!(rows[0].get("name"), Some(&Value::Text("renamed".into())));
        assert_eq!(rows[0].get("age"), Some(&Value::Integer(11)));
        assert_eq!(rows[1].get("age"), Some(&Value::Integer(15)));

        let q = Query::matching(gt("age", 12)).validate(&d).unwrap();
        assert_eq!(a.delete(&q, None).unwrap(), 1);
        assert!(!a.contains_key(&d, &Value::Integer(2), None).unwrap());
    }

    #[test]
    fn projection_reads_selected_columns() {
        let a = adapter();
        let d = users();
        a.insert(&d, &[user(1, "a", Some(3), true)], None).unwrap();
        let q = Query::all().select(["name", "age"]).validate(&d).unwrap();
        let rows: Vec<Record> = a.find(&q, None).unwrap().map(Result::unwrap).collect();
        assert_eq!(rows, vec![Record::new().with("name", "a").with("age", 3_i64)]);
    }

    #[test]
    fn closed_adapter_reports_registry_closed() {
        let a = adapter();
        a.close();
        assert_eq!(a.ping().unwrap_err(), OdmError::RegistryClosed);
    }

    #[test]
    fn failed_commit_rolls_back_before_release() {
        let a = unreliable(1, false);
        let d = users();
        let first: Vec<Record> = (1..=1000).map(|i| user(i, "n", None, true)).collect();
        let err = a.insert(&d, &first, None).unwrap_err();
        assert!(err.is_timeout(), "{err:?}");
        assert_eq!(a.pool().open_count(), 1);

        let second: Vec<Record> = (1..=3).map(|i| user(i, "m", None, false)).collect();
        assert_eq!(a.insert(&d, &second, None).unwrap(), 3);
        assert_eq!(a.count(&ValidatedQuery::all(&d), None).unwrap(), 3);
    }

    #[test]
    fn failed_rollback_discards_the_connection() {
        let a = unreliable(1, true);
        let d = users();
        let records: Vec<Record> = (1..=3).map(|i| user(i, "n", None, true)).collect();
        assert!(a.insert(&d, &records, None).is_err());
        assert_eq!(a.pool().open_count(), 0);
    }

    #[test]
    fn open_cursor_holds_its_connection() {
        let a = adapter();
        let d = users();
        let all = ValidatedQuery::all(&d);
        a.insert(&d, &(1..=3).map(|i| user(i, "n", None, true)).collect::<Vec<_>>(), None)
            .unwrap();

        let mut cursor = a.find(&all, None).unwrap();
        assert_eq!(cursor.next().unwrap().unwrap().field::<i64>("id").unwrap(), 1);
        let soon = Some(Instant::now() + Duration::from_millis(50));
        assert!(a.delete(&all, soon).unwrap_err().is_timeout());
        assert_eq!(a.pool().idle_count(), 0);

        let rest: Vec<i64> = cursor.map(|r| r.unwrap().field::<i64>("id").unwrap()).collect();
        assert_eq!(rest, [2, 3]);
        assert_eq!(a.delete(&all, None).unwrap(), 3);
    }

    #[test]
    fn dropped_cursor_releases_its_connection() {
        let a = adapter();
        let d = users();
        a.insert(&d, &[user(1, "a", None, true), user(2, "b", None, true)], None)
            .unwrap();
        let mut cursor = a.find(&ValidatedQuery::all(&d), None).unwrap();
        assert!(cursor.next().is_some());
        drop(cursor);
        assert_eq!(a.pool().idle_count(), 1);
        assert_eq!(a.insert(&d, &[user(3, "c", None, true)], None).unwrap(), 1);
    }

    #[test]
    fn cursors_fetch_in_windows() {
        let a = adapter().with_fetch_size(2);
        let d = users();
        let records: Vec<Record> = (1..=5).map(|i| user(i, "n", Some(i * 10), true)).collect();
        a.insert(&d, &records, None).unwrap();

        assert_eq!(ids(&a, Query::all()), [1, 2, 3, 4, 5]);
        assert_eq!(ids(&a, Query::all().sort_desc("age").limit(3)), [5, 4, 3]);
        assert_eq!(ids(&a, Query::all().offset(1).limit(4)), [2, 3, 4, 5]);
        assert_eq!(ids(&a, Query::all().limit(0)), Vec::<i64>::new());
        assert_eq!(a.pool().idle_count(), 1);
    }

    #[test]
    fn push_and_single_record_writes() {
        let a = adapter();
        let d = users();
        a.insert(
            &d,
            &[
                user(1, "a", Some(7), true).with("tags", Value::sequence(["x"])),
                user(2, "b", Some(7), true),
                user(3, "c", None, true),
            ],
            None,
        )
        .unwrap();

        let sevens = Query::matching(eq("age", 7)).validate(&d).unwrap();
        let push = Update::new().push("tags", "y").validate(&d).unwrap();
        assert_eq!(a.update_where(&sevens, &push, None).unwrap(), 2);
        let tags: Vec<Value> = a
            .find(&sevens, None)
            .unwrap()
            .map(|r| r.unwrap().get("tags").cloned().unwrap_or(Value::Null))
            .collect();
        assert_eq!(tags, [Value::sequence(["x", "y"]), Value::sequence(["y"])]);

        let rename = Update::new().set("name", "first").validate(&d).unwrap();
        assert_eq!(a.update_one(&sevens, &rename, None).unwrap(), 1);
        let named = Query::matching(eq("name", "first")).validate(&d).unwrap();
        assert_eq!(ids(&a, Query::matching(eq("name", "first"))), [1]);

        assert_eq!(a.delete_one(&sevens, None).unwrap(), 1);
        assert_eq!(a.count(&named, None).unwrap(), 0);
        assert_eq!(a.count(&sevens, None).unwrap(), 1);
        let none = Query::matching(eq("age", 99)).validate(&d).unwrap();
        assert_eq!(a.delete_one(&none, None).unwrap(), 0);
        assert_eq!(a.update_one(&none, &rename, None).unwrap(), 0);
    }
}
