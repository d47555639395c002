//! The backend-neutral query model.
//!
//! Callers build a [`Query`] from [`Filter`] trees, sort keys, a limit and
//! a page start. Before execution the query is validated against the
//! entity's descriptor, producing a [`ValidatedQuery`] whose field paths
//! are resolved and whose literals are known to fit their fields. Adapters
//! only ever translate validated queries.

mod filter;
mod model;
mod update;
mod validate;

pub use filter::{
    and, eq, gt, gte, in_list, is_not_null, is_null, lt, lte, ne, not, or, CompareOp, Filter,
};
pub use model::{Direction, Page, Query, SortKey};
pub use update::Update;
pub use validate::{FieldPath, Predicate, ValidatedQuery, ValidatedUpdate};
