//! Backend-agnostic predicate trees.

use omnidm_codec::Value;
use std::fmt;

/// Comparison operators for leaf predicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareOp {
    /// Equal.
    Eq,
    /// Not equal; a null field counts as not equal.
    Ne,
    /// Greater than.
    Gt,
    /// Greater than or equal.
    Gte,
    /// Less than.
    Lt,
    /// Less than or equal.
    Lte,
}

impl CompareOp {
    /// Short operator name used in error messages.
    pub fn name(self) -> &'static str {
        match self {
            CompareOp::Eq => "eq",
            CompareOp::Ne => "ne",
            CompareOp::Gt => "gt",
            CompareOp::Gte => "gte",
            CompareOp::Lt => "lt",
            CompareOp::Lte => "lte",
        }
    }

    /// Whether the operator needs an ordered type.
    pub fn is_range(self) -> bool {
        matches!(self, CompareOp::Gt | CompareOp::Gte | CompareOp::Lt | CompareOp::Lte)
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A predicate over an entity's fields.
///
/// Field names are logical names; nested fields are addressed with dotted
/// paths (`address.city`). Build trees with the free functions in this
/// module or the [`Filter::and`], [`Filter::or`] and [`Filter::negate`]
/// combinators.
///
/// An empty `And` matches every record, an empty `Or` and an empty `In`
/// match none.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// `field <op> value`.
    Compare {
        /// Field path.
        field: String,
        /// Operator.
        op: CompareOp,
        /// Literal operand; never null.
        value: Value,
    },
    /// `field` equals one of `values`.
    In {
        /// Field path.
        field: String,
        /// Candidate values.
        values: Vec<Value>,
    },
    /// `field` is null or absent.
    IsNull {
        /// Field path.
        field: String,
    },
    /// `field` is present and not null.
    IsNotNull {
        /// Field path.
        field: String,
    },
    /// All children hold.
    And(Vec<Filter>),
    /// At least one child holds.
    Or(Vec<Filter>),
    /// The child does not hold.
    Not(Box<Filter>),
}

impl Filter {
    /// A filter matching everything.
    pub fn all() -> Self {
        Filter::And(Vec::new())
    }

    /// Conjunction, flattening nested `And`s.
    #[must_use]
    pub fn and(self, other: Filter) -> Self {
        match (self, other) {
            (Filter::And(mut left), Filter::And(right)) => {
                left.extend(right);
                Filter::And(left)
            }
            (Filter::And(mut left), other) => {
                left.push(other);
                Filter::And(left)
            }
            (this, Filter::And(mut right)) => {
                right.insert(0, this);
                Filter::And(right)
            }
            (this, other) => Filter::And(vec![this, other]),
        }
    }

    /// Disjunction, flattening nested `Or`s.
    #[must_use]
    pub fn or(self, other: Filter) -> Self {
        match (self, other) {
            (Filter::Or(mut left), Filter::Or(right)) => {
                left.extend(right);
                Filter::Or(left)
            }
            (Filter::Or(mut left), other) => {
                left.push(other);
                Filter::Or(left)
            }
            (this, Filter::Or(mut right)) => {
                right.insert(0, this);
                Filter::Or(right)
            }
            (this, other) => Filter::Or(vec![this, other]),
        }
    }

    /// Negation.
    #[must_use]
    pub fn negate(self) -> Self {
        Filter::Not(Box::new(self))
    }

    /// Every field path the filter references, in tree order.
    pub fn fields(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_fields(&mut out);
        out
    }

    fn collect_fields<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Filter::Compare { field, .. }
            | Filter::In { field, .. }
            | Filter::IsNull { field }
            | Filter::IsNotNull { field } => out.push(field),
            Filter::And(children) | Filter::Or(children) => {
                children.iter().for_each(|c| c.collect_fields(out));
            }
            Filter::Not(child) => child.collect_fields(out),
        }
    }
}

fn compare(field: impl Into<String>, op: CompareOp, value: impl Into<Value>) -> Filter {
    Filter::Compare {
        field: field.into(),
        op,
        value: value.into(),
    }
}

/// `field == value`.
pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Filter {
    compare(field, CompareOp::Eq, value)
}

/// `field != value`, also matching null fields.
pub fn ne(field: impl Into<String>, value: impl Into<Value>) -> Filter {
    compare(field, CompareOp::Ne, value)
}

/// `field > value`.
pub fn gt(field: impl Into<String>, value: impl Into<Value>) -> Filter {
    compare(field, CompareOp::Gt, value)
}

/// `field >= value`.
pub fn gte(field: impl Into<String>, value: impl Into<Value>) -> Filter {
    compare(field, CompareOp::Gte, value)
}

/// `field < value`.
pub fn lt(field: impl Into<String>, value: impl Into<Value>) -> Filter {
    compare(field, CompareOp::Lt, value)
}

/// `field <= value`.
pub fn lte(field: impl Into<String>, value: impl Into<Value>) -> Filter {
    compare(field, CompareOp::Lte, value)
}

/// `field` is one of `values`.
pub fn in_list<I, V>(field: impl Into<String>, values: I) -> Filter
where
    I: IntoIterator<Item = V>,
    V: Into<Value>,
{
    Filter::In {
        field: field.into(),
        values: values.into_iter().map(Into::into).collect(),
    }
}

/// `field` is null or absent.
pub fn is_null(field: impl Into<String>) -> Filter {
    Filter::IsNull { field: field.into() }
}

/// `field` is set.
pub fn is_not_null(field: impl Into<String>) -> Filter {
    Filter::IsNotNull { field: field.into() }
}

/// All of `filters`.
pub fn and(filters: impl IntoIterator<Item = Filter>) -> Filter {
    Filter::And(filters.into_iter().collect())
}

/// Any of `filters`.
pub fn or(filters: impl IntoIterator<Item = Filter>) -> Filter {
    Filter::Or(filters.into_iter().collect())
}

/// Negation of `filter`.
pub fn not(filter: Filter) -> Filter {
    filter.negate()
}
