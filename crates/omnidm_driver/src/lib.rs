//! # omnidm driver
//!
//! The boundary between omnidm and the native clients of each store.
//!
//! Drivers speak their store's own vocabulary: BSON documents and the
//! MongoDB query language on the document side, SQL text with positional
//! parameters on the relational side. They know nothing about entities.
//! Every failure is classified once into a [`DriverError`] so callers can
//! decide what to retry without inspecting native error codes.
//!
//! ## Available Drivers
//!
//! - [`MemoryDocumentStore`] - In-process document store for tests and
//!   ephemeral data, with fault injection
//! - [`SqliteConnector`] - SQLite through `rusqlite`, file or in-memory
//!
//! Other stores plug in by implementing [`DocumentDriver`] or
//! [`SqlConnector`].
//!
//! ## Example
//!
//! ```rust
//! use omnidm_driver::{SqlConnector, SqliteConnector};
//! use omnidm_codec::SqlValue;
//! use std::time::Duration;
//!
//! let mut conn = SqliteConnector::memory().connect(Duration::from_secs(1)).unwrap();
//! conn.execute("CREATE TABLE t (v INTEGER)", &[], None).unwrap();
//! let n = conn.execute("INSERT INTO t (v) VALUES (?)", &[SqlValue::Integer(7)], None).unwrap();
//! assert_eq!(n, 1);
//! ```

mod document;
mod error;
mod memory;
mod sql;
mod sqlite;

pub use document::{DocumentCursor, DocumentDriver, FindOptions};
pub use error::{DriverError, DriverResult};
pub use memory::{compare, lookup, matches, total_order, MemoryDocumentStore};
pub use sql::{RowCursor, Rows, SqlConnection, SqlConnector};
pub use sqlite::{SqliteConnection, SqliteConnector, SqliteTarget};
