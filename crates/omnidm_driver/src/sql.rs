//! Relational driver boundary.

use crate::error::DriverResult;
use omnidm_codec::SqlValue;
use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// A forward-only cursor over a statement's result rows.
pub trait RowCursor: Send {
    /// Column names, in result order.
    fn columns(&self) -> &[String];

    /// Returns the next row, or `None` once exhausted.
    ///
    /// # Errors
    ///
    /// Returns an error if fetching the row fails.
    fn next_row(&mut self) -> DriverResult<Option<Vec<SqlValue>>>;
}

/// One physical connection to a relational store.
///
/// A connection is used by one thread at a time; pooling is the caller's
/// responsibility. Parameters bind positionally to the statement's
/// placeholders.
pub trait SqlConnection: Send {
    /// Executes a statement that returns no rows; returns the affected count.
    ///
    /// # Errors
    ///
    /// Returns a classified driver error.
    fn execute(&mut self, sql: &str, params: &[SqlValue], deadline: Option<Instant>) -> DriverResult<u64>;

    /// Executes a query and returns its rows.
    ///
    /// # Errors
    ///
    /// Returns a classified driver error.
    fn query(
        &mut self,
        sql: &str,
        params: &[SqlValue],
        deadline: Option<Instant>,
    ) -> DriverResult<Box<dyn RowCursor>>;

    /// Checks the connection is still usable.
    ///
    /// # Errors
    ///
    /// Returns an error if it is not.
    fn ping(&mut self) -> DriverResult<()>;
}

/// Opens connections to one configured relational store.
pub trait SqlConnector: Send + Sync {
    /// Short driver name used in logs.
    fn name(&self) -> &str;

    /// Opens a new connection, giving up after `timeout`.
    ///
    /// # Errors
    ///
    /// Returns a transient error if the store is unreachable.
    fn connect(&self, timeout: Duration) -> DriverResult<Box<dyn SqlConnection>>;
}

/// A fully buffered result set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Rows {
    columns: Vec<String>,
    rows: VecDeque<Vec<SqlValue>>,
}

impl Rows {
    /// Creates a buffered result set.
    pub fn new(columns: Vec<String>, rows: impl Into<VecDeque<Vec<SqlValue>>>) -> Self {
        Self {
            columns,
            rows: rows.into(),
        }
    }

    /// Remaining row count.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether no rows remain.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl RowCursor for Rows {
    fn columns(&self) -> &[String] {
        &self.columns
    }

    fn next_row(&mut self) -> DriverResult<Option<Vec<SqlValue>>> {
        Ok(self.rows.pop_front())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rows_drain_in_order() {
        let mut rows = Rows::new(
            vec!["id".into()],
            vec![vec![SqlValue::Integer(1)], vec![SqlValue::Integer(2)]],
        );
        assert_eq!(rows.columns(), ["id".to_string()]);
        assert_eq!(rows.next_row().unwrap(), Some(vec![SqlValue::Integer(1)]));
        assert_eq!(rows.len(), 1);
        assert_eq!(rows.next_row().unwrap(), Some(vec![SqlValue::Integer(2)]));
        assert_eq!(rows.next_row().unwrap(), None);
        assert!(rows.is_empty());
    }
}
