//! Bulk field updates applied to every record a query matches.

use omnidm_codec::Value;

/// Field assignments, increments and sequence appends.
///
/// ```rust
/// use omnidm_core::query::Update;
///
/// let update = Update::new().set("active", false).inc("visits", 1).push("tags", "new");
/// assert_eq!(update.assignments().len(), 1);
/// assert_eq!(update.pushes().len(), 1);
/// ```
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Update {
    set: Vec<(String, Value)>,
    inc: Vec<(String, Value)>,
    push: Vec<(String, Value)>,
}

impl Update {
    /// An empty update.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets `field` to `value`.
    #[must_use]
    pub fn set(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set.push((field.into(), value.into()));
        self
    }

    /// Adds `by` to the numeric `field`. A null field is treated as zero.
    #[must_use]
    pub fn inc(mut self, field: impl Into<String>, by: impl Into<Value>) -> Self {
        self.inc.push((field.into(), by.into()));
        self
    }

    /// Appends `element` to the sequence `field`. A null field becomes a
    /// one-element sequence.
    #[must_use]
    pub fn push(mut self, field: impl Into<String>, element: impl Into<Value>) -> Self {
        self.push.push((field.into(), element.into()));
        self
    }

    /// Assignments in declaration order.
    pub fn assignments(&self) -> &[(String, Value)] {
        &self.set
    }

    /// Increments in declaration order.
    pub fn increments(&self) -> &[(String, Value)] {
        &self.inc
    }

    /// Appends in declaration order.
    pub fn pushes(&self) -> &[(String, Value)] {
        &self.push
    }

    /// Whether nothing would change.
    pub fn is_empty(&self) -> bool {
        self.set.is_empty() && self.inc.is_empty() && self.push.is_empty()
    }
}
