//! SQLite driver built on `rusqlite`.

use crate::error::{DriverError, DriverResult};
use crate::sql::{RowCursor, Rows, SqlConnection, SqlConnector};
use omnidm_codec::SqlValue;
use rusqlite::types::Value as SqliteValue;
use rusqlite::{params_from_iter, Connection, ErrorCode};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::trace;

/// Virtual machine instructions between deadline checks.
const PROGRESS_INTERVAL: i32 = 1_000;

/// Where a SQLite database lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqliteTarget {
    /// A private in-memory database, one per connection.
    Memory,
    /// A database file.
    File(PathBuf),
}

/// Opens SQLite connections.
///
/// Each in-memory connection is a separate database, so pools over
/// [`SqliteTarget::Memory`] should hold a single connection.
#[derive(Debug, Clone)]
pub struct SqliteConnector {
    target: SqliteTarget,
    busy_timeout: Duration,
}

impl SqliteConnector {
    /// Connector for a private in-memory database.
    #[must_use]
    pub fn memory() -> Self {
        Self {
            target: SqliteTarget::Memory,
            busy_timeout: Duration::from_secs(5),
        }
    }

    /// Connector for a database file, created if missing.
    pub fn file(path: impl AsRef<Path>) -> Self {
        Self {
            target: SqliteTarget::File(path.as_ref().to_path_buf()),
            busy_timeout: Duration::from_secs(5),
        }
    }

    /// Sets how long a connection waits on a locked database.
    #[must_use]
    pub fn with_busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    /// The configured target.
    pub fn target(&self) -> &SqliteTarget {
        &self.target
    }
}

impl SqlConnector for SqliteConnector {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn connect(&self, timeout: Duration) -> DriverResult<Box<dyn SqlConnection>> {
        let conn = match &self.target {
            SqliteTarget::Memory => Connection::open_in_memory(),
            SqliteTarget::File(path) => Connection::open(path),
        }
        .map_err(classify)?;
        conn.busy_timeout(self.busy_timeout.min(timeout.max(Duration::from_millis(1))))
            .map_err(classify)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;").map_err(classify)?;
        trace!(target = ?self.target, "opened sqlite connection");
        Ok(Box::new(SqliteConnection { conn }))
    }
}

/// One SQLite connection.
pub struct SqliteConnection {
    conn: Connection,
}

impl std::fmt::Debug for SqliteConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteConnection")
            .field("path", &self.conn.path())
            .finish()
    }
}

impl SqliteConnection {
    /// Installs a progress handler that interrupts the statement at `deadline`.
    fn arm(&self, deadline: Option<Instant>) -> DriverResult<()> {
        if let Some(deadline) = deadline {
            if Instant::now() >= deadline {
                return Err(DriverError::Timeout);
            }
            self.conn
                .progress_handler(PROGRESS_INTERVAL, Some(move || Instant::now() >= deadline));
        }
        Ok(())
    }

    fn disarm(&self, deadline: Option<Instant>) {
        if deadline.is_some() {
            self.conn.progress_handler(0, None::<fn() -> bool>);
        }
    }
}

impl SqlConnection for SqliteConnection {
    fn execute(&mut self, sql: &str, params: &[SqlValue], deadline: Option<Instant>) -> DriverResult<u64> {
        self.arm(deadline)?;
        let result = run_execute(&self.conn, sql, params);
        self.disarm(deadline);
        result.map(|n| n as u64).map_err(classify)
    }

    fn query(
        &mut self,
        sql: &str,
        params: &[SqlValue],
        deadline: Option<Instant>,
    ) -> DriverResult<Box<dyn RowCursor>> {
        self.arm(deadline)?;
        let result = run_query(&self.conn, sql, params);
        self.disarm(deadline);
        Ok(Box::new(result.map_err(classify)?))
    }

    fn ping(&mut self) -> DriverResult<()> {
        self.conn
            .query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
            .map(|_| ())
            .map_err(classify)
    }
}

fn run_execute(conn: &Connection, sql: &str, params: &[SqlValue]) -> rusqlite::Result<usize> {
    let mut stmt = conn.prepare_cached(sql)?;
    stmt.execute(params_from_iter(params.iter().map(to_sqlite)))
}

fn run_query(conn: &Connection, sql: &str, params: &[SqlValue]) -> rusqlite::Result<Rows> {
    let mut stmt = conn.prepare_cached(sql)?;
    let columns: Vec<String> = stmt.column_names().into_iter().map(str::to_string).collect();
    let width = columns.len();
    let mut rows = stmt.query(params_from_iter(params.iter().map(to_sqlite)))?;
    let mut buffered = Vec::new();
    while let Some(row) = rows.next()? {
        let mut values = Vec::with_capacity(width);
        for index in 0..width {
            values.push(from_sqlite(row.get::<_, SqliteValue>(index)?));
        }
        buffered.push(values);
    }
    Ok(Rows::new(columns, buffered))
}

fn to_sqlite(value: &SqlValue) -> SqliteValue {
    match value {
        SqlValue::Null => SqliteValue::Null,
        SqlValue::Bool(b) => SqliteValue::Integer(i64::from(*b)),
        SqlValue::Integer(i) => SqliteValue::Integer(*i),
        SqlValue::Real(f) => SqliteValue::Real(*f),
        SqlValue::Text(s) => SqliteValue::Text(s.clone()),
        SqlValue::Blob(b) => SqliteValue::Blob(b.clone()),
    }
}

fn from_sqlite(value: SqliteValue) -> SqlValue {
    match value {
        SqliteValue::Null => SqlValue::Null,
        SqliteValue::Integer(i) => SqlValue::Integer(i),
        SqliteValue::Real(f) => SqlValue::Real(f),
        SqliteValue::Text(s) => SqlValue::Text(s),
        SqliteValue::Blob(b) => SqlValue::Blob(b),
    }
}

/// Maps a rusqlite error onto the driver error classes.
fn classify(error: rusqlite::Error) -> DriverError {
    match &error {
        rusqlite::Error::SqliteFailure(failure, _) => match failure.code {
            ErrorCode::ConstraintViolation => DriverError::constraint(error.to_string()),
            ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked | ErrorCode::CannotOpen => {
                DriverError::transient(error.to_string())
            }
            ErrorCode::OperationInterrupted => DriverError::Timeout,
            _ => DriverError::permanent(error.to_string()),
        },
        _ => DriverError::permanent(error.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open() -> Box<dyn SqlConnection> {
        SqliteConnector::memory().connect(Duration::from_secs(1)).unwrap()
    }

    fn collect(mut cursor: Box<dyn RowCursor>) -> Vec<Vec<SqlValue>> {
        let mut out = Vec::new();
        while let Some(row) = cursor.next_row().unwrap() {
            out.push(row);
        }
        out
    }

    #[test]
    fn execute_and_query_with_bound_parameters() {
        let mut conn = open();
        conn.execute("CREATE TABLE t (id INTEGER PRIMARY KEY, name TEXT, ok INTEGER)", &[], None)
            .unwrap();
        let inserted = conn
            .execute(
                "INSERT INTO t (id, name, ok) VALUES (?, ?, ?), (?, ?, ?)",
                &[
                    SqlValue::Integer(1),
                    SqlValue::Text("a".into()),
                    SqlValue::Bool(true),
                    SqlValue::Integer(2),
                    SqlValue::Text("b'); DROP TABLE t; --".into()),
                    SqlValue::Bool(false),
                ],
                None,
            )
            .unwrap();
        assert_eq!(inserted, 2);

        let cursor = conn
            .query("SELECT id, name, ok FROM t WHERE id > ? ORDER BY id", &[SqlValue::Integer(0)], None)
            .unwrap();
        assert_eq!(cursor.columns(), ["id", "name", "ok"].map(String::from));
        let rows = collect(cursor);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1][1], SqlValue::Text("b'); DROP TABLE t; --".into()));
        assert_eq!(rows[0][2], SqlValue::Integer(1));
    }

    #[test]
    fn unique_violation_is_classified() {
        let mut conn = open();
        conn.execute("CREATE TABLE t (id INTEGER PRIMARY KEY)", &[], None).unwrap();
        conn.execute("INSERT INTO t (id) VALUES (?)", &[SqlValue::Integer(1)], None)
            .unwrap();
        let err = conn
            .execute("INSERT INTO t (id) VALUES (?)", &[SqlValue::Integer(1)], None)
            .unwrap_err();
        assert!(matches!(err, DriverError::Constraint { .. }));
    }

    #[test]
    fn syntax_error_is_permanent() {
        let mut conn = open();
        let err = conn.execute("SELEC nonsense", &[], None).unwrap_err();
        assert!(matches!(err, DriverError::Permanent { .. }));
    }

    #[test]
    fn long_statement_is_interrupted_at_deadline() {
        let mut conn = open();
        let deadline = Instant::now() + Duration::from_millis(20);
        let err = conn
            .query(
                "WITH RECURSIVE c(x) AS (SELECT 1 UNION ALL SELECT x + 1 FROM c LIMIT 500000000) \
                 SELECT count(*) FROM c",
                &[],
                Some(deadline),
            )
            .err()
            .unwrap();
        assert_eq!(err, DriverError::Timeout);
        // The handler is removed afterwards, so later calls run normally.
        conn.ping().unwrap();
    }

    #[test]
    fn expired_deadline_fails_before_running() {
        let mut conn = open();
        let err = conn.execute("SELECT 1", &[], Some(Instant::now())).unwrap_err();
        assert_eq!(err, DriverError::Timeout);
    }

    #[test]
    fn file_databases_persist_across_connections() {
        let dir = tempfile::tempdir().unwrap();
        let connector = SqliteConnector::file(dir.path().join("store.db"));
        let mut first = connector.connect(Duration::from_secs(1)).unwrap();
        first.execute("CREATE TABLE t (v TEXT)", &[], None).unwrap();
        first.execute("INSERT INTO t (v) VALUES (?)", &[SqlValue::Text("x".into())], None)
            .unwrap();
        let mut second = connector.connect(Duration::from_secs(1)).unwrap();
        let rows = collect(second.query("SELECT v FROM t", &[], None).unwrap());
        assert_eq!(rows, vec![vec![SqlValue::Text("x".into())]]);
    }
}
