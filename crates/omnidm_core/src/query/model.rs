//! Queries: filter, projection, ordering and pagination.

use super::filter::Filter;
use omnidm_codec::Value;

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Direction {
    /// Smallest first.
    #[default]
    Ascending,
    /// Largest first.
    Descending,
}

/// One sort key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    /// Field path.
    pub field: String,
    /// Direction.
    pub direction: Direction,
}

/// Where a page of results starts.
#[derive(Debug, Clone, PartialEq)]
pub enum Page {
    /// Skip this many matching records.
    Offset(u64),
    /// Keyset pagination: records whose primary key is greater than this
    /// value, in primary-key order.
    After(Value),
}

/// A backend-agnostic query over one entity type.
///
/// Queries are plain values; nothing is checked until a session validates
/// the query against the entity's descriptor.
///
/// # Example
///
/// ```rust
/// use omnidm_core::query::{eq, gt, Query};
///
/// let query = Query::matching(gt("age", 30).and(eq("active", true)))
///     .sort_desc("age")
///     .limit(10)
///     .offset(20);
/// assert_eq!(query.limit_value(), Some(10));
/// ```
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Query {
    filter: Option<Filter>,
    projection: Option<Vec<String>>,
    sort: Vec<SortKey>,
    limit: Option<u64>,
    page: Option<Page>,
}

impl Query {
    /// A query matching every record.
    pub fn all() -> Self {
        Self::default()
    }

    /// A query matching `filter`.
    pub fn matching(filter: Filter) -> Self {
        Self {
            filter: Some(filter),
            ..Self::default()
        }
    }

    /// Adds `filter` as a further conjunct.
    #[must_use]
    pub fn and_where(mut self, filter: Filter) -> Self {
        self.filter = Some(match self.filter.take() {
            Some(existing) => existing.and(filter),
            None => filter,
        });
        self
    }

    /// Restricts returned fields (see [`crate::Session::project`]).
    #[must_use]
    pub fn select<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.projection = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    /// Appends an ascending sort key.
    #[must_use]
    pub fn sort_asc(self, field: impl Into<String>) -> Self {
        self.sort_by(field, Direction::Ascending)
    }

    /// Appends a descending sort key.
    #[must_use]
    pub fn sort_desc(self, field: impl Into<String>) -> Self {
        self.sort_by(field, Direction::Descending)
    }

    /// Appends a sort key.
    #[must_use]
    pub fn sort_by(mut self, field: impl Into<String>, direction: Direction) -> Self {
        self.sort.push(SortKey {
            field: field.into(),
            direction,
        });
        self
    }

    /// Returns at most `n` records.
    #[must_use]
    pub fn limit(mut self, n: u64) -> Self {
        self.limit = Some(n);
        self
    }

    /// Skips the first `n` matching records.
    #[must_use]
    pub fn offset(mut self, n: u64) -> Self {
        self.page = Some(Page::Offset(n));
        self
    }

    /// Starts after the record with primary key `key`.
    #[must_use]
    pub fn after(mut self, key: impl Into<Value>) -> Self {
        self.page = Some(Page::After(key.into()));
        self
    }

    /// The filter, if any.
    pub fn filter(&self) -> Option<&Filter> {
        self.filter.as_ref()
    }

    /// The projection, if any.
    pub fn projection(&self) -> Option<&[String]> {
        self.projection.as_deref()
    }

    /// Sort keys in priority order.
    pub fn sort(&self) -> &[SortKey] {
        &self.sort
    }

    /// The limit, if any.
    pub fn limit_value(&self) -> Option<u64> {
        self.limit
    }

    /// The page start, if any.
    pub fn page(&self) -> Option<&Page> {
        self.page.as_ref()
    }

    /// Whether any of projection, sort or pagination is set.
    pub fn is_shaped(&self) -> bool {
        self.projection.is_some() || !self.sort.is_empty() || self.limit.is_some() || self.page.is_some()
    }
}

impl From<Filter> for Query {
    fn from(filter: Filter) -> Self {
        Query::matching(filter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{eq, gt};

    #[test]
    fn and_where_accumulates() {
        let q = Query::all().and_where(gt("age", 1)).and_where(eq("active", true));
        assert_eq!(q.filter(), Some(&gt("age", 1).and(eq("active", true))));
    }

    #[test]
    fn offset_and_after_replace_each_other() {
        let q = Query::all().offset(5).after(10);
        assert_eq!(q.page(), Some(&Page::After(Value::Integer(10))));
        let q = Query::all().after(10).offset(5);
        assert_eq!(q.page(), Some(&Page::Offset(5)));
    }

    #[test]
    fn shape_detection() {
        assert!(!Query::matching(eq("a", 1)).is_shaped());
        assert!(Query::all().sort_asc("a").is_shaped());
        assert!(Query::all().select(["a"]).is_shaped());
    }
}
