//! Resolution of queries and updates against an entity descriptor.
//!
//! Validation happens before any backend sees the query: every field path
//! is resolved to its declaration, every literal is checked against the
//! field's logical type, and all problems are reported together.

use super::filter::{CompareOp, Filter};
use super::model::{Direction, Page, Query};
use super::update::Update;
use crate::descriptor::EntityDescriptor;
use crate::error::{OdmError, OdmResult, QueryProblem};
use omnidm_codec::{BackendKind, CodecError, FieldDescriptor, LogicalType, Value};
use std::collections::HashSet;
use std::sync::Arc;

/// A field reference resolved to its declarations, outermost first.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldPath {
    segments: Vec<FieldDescriptor>,
}

impl FieldPath {
    pub(crate) fn top_level(field: &FieldDescriptor) -> Self {
        Self {
            segments: vec![field.clone()],
        }
    }

    /// The top-level field.
    pub fn top(&self) -> &FieldDescriptor {
        &self.segments[0]
    }

    /// The addressed field.
    pub fn leaf(&self) -> &FieldDescriptor {
        &self.segments[self.segments.len() - 1]
    }

    /// Whether the path reaches into a nested record.
    pub fn is_nested(&self) -> bool {
        self.segments.len() > 1
    }

    /// Dotted logical name.
    pub fn name(&self) -> String {
        self.segments.iter().map(FieldDescriptor::name).collect::<Vec<_>>().join(".")
    }

    /// Dotted native key path on a backend family.
    pub fn storage_path(&self, descriptor: &EntityDescriptor, backend: BackendKind) -> String {
        let mut path = descriptor.storage_key(self.top(), backend).to_string();
        for segment in &self.segments[1..] {
            path.push('.');
            path.push_str(segment.storage_name());
        }
        path
    }
}

/// A validated predicate tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// `path <op> value`; `value` inhabits the leaf's type.
    Compare {
        /// Resolved field.
        path: FieldPath,
        /// Operator.
        op: CompareOp,
        /// Literal, never null.
        value: Value,
    },
    /// `path` is one of `values`.
    In {
        /// Resolved field.
        path: FieldPath,
        /// Candidates, never null.
        values: Vec<Value>,
    },
    /// `path` is null or absent.
    IsNull {
        /// Resolved field.
        path: FieldPath,
    },
    /// `path` is set.
    IsNotNull {
        /// Resolved field.
        path: FieldPath,
    },
    /// All children hold; empty matches everything.
    And(Vec<Predicate>),
    /// Some child holds; empty matches nothing.
    Or(Vec<Predicate>),
    /// The child does not hold.
    Not(Box<Predicate>),
}

impl Predicate {
    /// Every field path referenced, in tree order.
    pub fn paths(&self) -> Vec<&FieldPath> {
        let mut out = Vec::new();
        self.collect_paths(&mut out);
        out
    }

    fn collect_paths<'a>(&'a self, out: &mut Vec<&'a FieldPath>) {
        match self {
            Predicate::Compare { path, .. }
            | Predicate::In { path, .. }
            | Predicate::IsNull { path }
            | Predicate::IsNotNull { path } => out.push(path),
            Predicate::And(children) | Predicate::Or(children) => {
                children.iter().for_each(|c| c.collect_paths(out));
            }
            Predicate::Not(child) => child.collect_paths(out),
        }
    }

    /// Whether this is the always-true empty conjunction.
    pub fn is_trivial(&self) -> bool {
        matches!(self, Predicate::And(children) if children.is_empty())
    }
}

/// A query checked against its entity, ready for an adapter.
#[derive(Debug, Clone)]
pub struct ValidatedQuery {
    descriptor: Arc<EntityDescriptor>,
    predicate: Predicate,
    projection: Option<Vec<FieldDescriptor>>,
    sort: Vec<(FieldPath, Direction)>,
    limit: Option<u64>,
    offset: u64,
}

impl ValidatedQuery {
    /// Matches every record of the entity.
    pub fn all(descriptor: &Arc<EntityDescriptor>) -> Self {
        Self::with_predicate(descriptor, Predicate::And(Vec::new()))
    }

    /// Matches the record whose primary key is `key`.
    ///
    /// # Errors
    ///
    /// Returns a value conversion error if `key` is null or not of the
    /// key's type.
    pub fn by_key(descriptor: &Arc<EntityDescriptor>, key: Value) -> OdmResult<Self> {
        let pk = descriptor.primary_key();
        if key.is_null() {
            return Err(OdmError::value_conversion(pk.name(), "primary key must not be null"));
        }
        pk.check(&key)?;
        Ok(Self::with_predicate(
            descriptor,
            Predicate::Compare {
                path: FieldPath::top_level(pk),
                op: CompareOp::Eq,
                value: key,
            },
        ))
    }

    fn with_predicate(descriptor: &Arc<EntityDescriptor>, predicate: Predicate) -> Self {
        Self {
            descriptor: Arc::clone(descriptor),
            predicate,
            projection: None,
            sort: Vec::new(),
            limit: None,
            offset: 0,
        }
    }

    /// The entity's descriptor.
    pub fn descriptor(&self) -> &Arc<EntityDescriptor> {
        &self.descriptor
    }

    /// The predicate.
    pub fn predicate(&self) -> &Predicate {
        &self.predicate
    }

    /// Projected fields, if any.
    pub fn projection(&self) -> Option<&[FieldDescriptor]> {
        self.projection.as_deref()
    }

    /// Fields a read returns: the projection or every field.
    pub fn selected_fields(&self) -> Vec<&FieldDescriptor> {
        match &self.projection {
            Some(fields) => fields.iter().collect(),
            None => self.descriptor.fields().iter().collect(),
        }
    }

    /// Sort keys, ending with the primary key whenever order matters.
    pub fn sort(&self) -> &[(FieldPath, Direction)] {
        &self.sort
    }

    /// The limit, if any.
    pub fn limit(&self) -> Option<u64> {
        self.limit
    }

    /// Records to skip.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Caps the limit at `n`.
    #[must_use]
    pub fn capped(mut self, n: u64) -> Self {
        self.limit = Some(self.limit.map_or(n, |l| l.min(n)));
        self
    }

    /// At most `take` of this query's results, starting `skip` records in.
    ///
    /// An unordered query is ordered by the primary key so that
    /// consecutive windows neither overlap nor leave gaps.
    #[must_use]
    pub fn window(&self, skip: u64, take: u64) -> Self {
        let mut window = self.clone();
        if window.sort.is_empty() {
            window
                .sort
                .push((FieldPath::top_level(self.descriptor.primary_key()), Direction::Ascending));
        }
        window.offset = self.offset.saturating_add(skip);
        let remaining = self.limit.map_or(take, |l| l.saturating_sub(skip));
        window.limit = Some(take.min(remaining));
        window
    }
}

/// An update checked against its entity.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedUpdate {
    set: Vec<(FieldDescriptor, Value)>,
    inc: Vec<(FieldDescriptor, Value)>,
    push: Vec<(FieldDescriptor, Value)>,
}

impl ValidatedUpdate {
    /// Assignments.
    pub fn assignments(&self) -> &[(FieldDescriptor, Value)] {
        &self.set
    }

    /// Increments.
    pub fn increments(&self) -> &[(FieldDescriptor, Value)] {
        &self.inc
    }

    /// Sequence fields paired with the element appended to each.
    pub fn pushes(&self) -> &[(FieldDescriptor, Value)] {
        &self.push
    }
}

impl Query {
    /// Resolves the query against `descriptor`.
    ///
    /// # Errors
    ///
    /// Returns an invalid query error listing every unknown field,
    /// mismatched literal, operator misuse and pagination conflict.
    pub fn validate(&self, descriptor: &Arc<EntityDescriptor>) -> OdmResult<ValidatedQuery> {
        let mut v = Validator {
            descriptor: descriptor.as_ref(),
            problems: Vec::new(),
        };

        let mut predicate = match self.filter() {
            Some(filter) => v.filter(filter),
            None => Some(Predicate::And(Vec::new())),
        };

        let projection = self.projection().map(|fields| v.projection(fields));

        let mut sort = Vec::new();
        for key in self.sort() {
            if let Some(path) = v.sort_key(&key.field) {
                sort.push((path, key.direction));
            }
        }

        let pk = descriptor.primary_key();
        let mut offset = 0;
        match self.page() {
            Some(Page::Offset(n)) => offset = *n,
            Some(Page::After(key)) => {
                let path = FieldPath::top_level(pk);
                let only_pk_ascending = sort
                    .iter()
                    .all(|(p, d)| !p.is_nested() && p.top().is_primary_key() && *d == Direction::Ascending);
                if !only_pk_ascending {
                    v.problems.push(
                        QueryProblem::new(pk.name(), "keyset pagination orders by the primary key only")
                            .with_operator("after"),
                    );
                }
                if let Some(value) = v.literal(&path, "after", key) {
                    predicate = predicate.map(|p| {
                        conjoin(
                            p,
                            Predicate::Compare {
                                path,
                                op: CompareOp::Gt,
                                value,
                            },
                        )
                    });
                }
            }
            None => {}
        }

        let ordered = !sort.is_empty() || self.limit_value().is_some() || self.page().is_some();
        if ordered && !sort.iter().any(|(p, _)| !p.is_nested() && p.top().is_primary_key()) {
            sort.push((FieldPath::top_level(pk), Direction::Ascending));
        }

        if !v.problems.is_empty() {
            return Err(OdmError::InvalidQuery { problems: v.problems });
        }
        Ok(ValidatedQuery {
            descriptor: Arc::clone(descriptor),
            predicate: predicate.unwrap_or(Predicate::And(Vec::new())),
            projection: projection.flatten(),
            sort,
            limit: self.limit_value(),
            offset,
        })
    }
}

impl Update {
    /// Resolves the update against `descriptor`.
    ///
    /// # Errors
    ///
    /// Returns an invalid query error if the update is empty, touches the
    /// primary key, unknown or nested fields, assigns a mismatched value,
    /// increments a non-numeric field or appends to a non-sequence.
    pub fn validate(&self, descriptor: &Arc<EntityDescriptor>) -> OdmResult<ValidatedUpdate> {
        let mut problems = Vec::new();
        if self.is_empty() {
            problems.push(QueryProblem::new("*", "update changes no fields"));
        }

        let mut seen = HashSet::new();
        let mut target = |name: &str, op: &str, problems: &mut Vec<QueryProblem>| -> Option<FieldDescriptor> {
            let problem = |message: &str| QueryProblem::new(name, message).with_operator(op);
            let Some(field) = descriptor.field(name) else {
                if name.contains('.') {
                    problems.push(problem("updates address top-level fields only"));
                } else {
                    problems.push(problem("unknown field"));
                }
                return None;
            };
            if field.is_primary_key() {
                problems.push(problem("the primary key cannot be updated"));
                return None;
            }
            if !seen.insert(name.to_string()) {
                problems.push(problem("field is updated more than once"));
                return None;
            }
            Some(field.clone())
        };

        let mut set = Vec::new();
        for (name, value) in self.assignments() {
            if let Some(field) = target(name, "set", &mut problems) {
                let value = coerce(field.logical_type(), value);
                match field.check(&value) {
                    Ok(()) => set.push((field, value)),
                    Err(e) => problems.push(QueryProblem::new(name, conversion_message(e)).with_operator("set")),
                }
            }
        }

        let mut inc = Vec::new();
        for (name, by) in self.increments() {
            if let Some(field) = target(name, "inc", &mut problems) {
                let by = coerce(field.logical_type(), by);
                let ok = matches!(
                    (field.logical_type(), &by),
                    (LogicalType::Integer, Value::Integer(_)) | (LogicalType::Float, Value::Float(_))
                );
                if ok {
                    inc.push((field, by));
                } else if !matches!(field.logical_type(), LogicalType::Integer | LogicalType::Float) {
                    problems.push(
                        QueryProblem::new(name, format!("cannot increment a {} field", field.logical_type()))
                            .with_operator("inc"),
                    );
                } else {
                    problems.push(
                        QueryProblem::new(
                            name,
                            format!("increment must be {}, found {}", field.logical_type(), by.type_name()),
                        )
                        .with_operator("inc"),
                    );
                }
            }
        }

        let mut push = Vec::new();
        for (name, element) in self.pushes() {
            if let Some(field) = target(name, "push", &mut problems) {
                let LogicalType::Sequence(element_type) = field.logical_type() else {
                    problems.push(
                        QueryProblem::new(name, format!("cannot push onto a {} field", field.logical_type()))
                            .with_operator("push"),
                    );
                    continue;
                };
                let element = coerce(element_type, element);
                if element.is_null() {
                    problems.push(QueryProblem::new(name, "cannot push null").with_operator("push"));
                    continue;
                }
                match element_type.check(&element) {
                    Ok(()) => push.push((field, element)),
                    Err(e) => problems.push(QueryProblem::new(name, conversion_message(e)).with_operator("push")),
                }
            }
        }

        if !problems.is_empty() {
            return Err(OdmError::InvalidQuery { problems });
        }
        Ok(ValidatedUpdate { set, inc, push })
    }
}

fn conjoin(left: Predicate, right: Predicate) -> Predicate {
    match left {
        Predicate::And(mut children) => {
            children.push(right);
            Predicate::And(children)
        }
        other => Predicate::And(vec![other, right]),
    }
}

/// Widens integer literals used against float fields.
#[allow(clippy::cast_precision_loss)]
fn coerce(ty: &LogicalType, value: &Value) -> Value {
    match (ty, value) {
        (LogicalType::Float, Value::Integer(i)) => Value::Float(*i as f64),
        _ => value.clone(),
    }
}

fn conversion_message(error: CodecError) -> String {
    match error {
        CodecError::ValueConversion { message, .. } => message,
        other => other.to_string(),
    }
}

struct Validator<'a> {
    descriptor: &'a EntityDescriptor,
    problems: Vec<QueryProblem>,
}

impl Validator<'_> {
    fn resolve(&mut self, path: &str, op: Option<&str>) -> Option<FieldPath> {
        let problem = |message: String| {
            let p = QueryProblem::new(path, message);
            match op {
                Some(op) => p.with_operator(op),
                None => p,
            }
        };

        let mut names = path.split('.');
        let first = names.next().unwrap_or_default();
        let Some(top) = self.descriptor.field(first) else {
            self.problems.push(problem(format!("unknown field `{first}`")));
            return None;
        };
        let mut segments = vec![top.clone()];
        for name in names {
            let parent = &segments[segments.len() - 1];
            let next = match parent.logical_type() {
                LogicalType::Nested(shape) => shape.field(name).cloned(),
                LogicalType::Sequence(_) => {
                    self.problems.push(problem(format!(
                        "cannot address into sequence `{}`",
                        parent.name()
                    )));
                    return None;
                }
                _ => {
                    self.problems.push(problem(format!("`{}` is not a nested record", parent.name())));
                    return None;
                }
            };
            match next {
                Some(field) => segments.push(field),
                None => {
                    self.problems.push(problem(format!("unknown field `{name}`")));
                    return None;
                }
            }
        }
        Some(FieldPath { segments })
    }

    fn literal(&mut self, path: &FieldPath, op: &str, value: &Value) -> Option<Value> {
        if value.is_null() {
            self.problems.push(
                QueryProblem::new(path.name(), "null literal; use is_null or is_not_null").with_operator(op),
            );
            return None;
        }
        let ty = path.leaf().logical_type();
        let value = coerce(ty, value);
        match ty.check(&value) {
            Ok(()) => Some(value),
            Err(e) => {
                self.problems
                    .push(QueryProblem::new(path.name(), conversion_message(e)).with_operator(op));
                None
            }
        }
    }

    fn scalar(&mut self, path: &FieldPath, op: &str) -> bool {
        if path.leaf().logical_type().is_scalar() {
            true
        } else {
            self.problems.push(
                QueryProblem::new(
                    path.name(),
                    format!("cannot compare {} values", path.leaf().logical_type()),
                )
                .with_operator(op),
            );
            false
        }
    }

    fn filter(&mut self, filter: &Filter) -> Option<Predicate> {
        match filter {
            Filter::Compare { field, op, value } => {
                let path = self.resolve(field, Some(op.name()))?;
                if !self.scalar(&path, op.name()) {
                    return None;
                }
                let ty = path.leaf().logical_type();
                if op.is_range() && !ty.is_ordered() {
                    self.problems.push(
                        QueryProblem::new(field, format!("range operators need an ordered type, not {ty}"))
                            .with_operator(op.name()),
                    );
                    return None;
                }
                let value = self.literal(&path, op.name(), value)?;
                Some(Predicate::Compare { path, op: *op, value })
            }
            Filter::In { field, values } => {
                let path = self.resolve(field, Some("in"))?;
                if !self.scalar(&path, "in") {
                    return None;
                }
                let checked: Vec<Option<Value>> = values.iter().map(|v| self.literal(&path, "in", v)).collect();
                let values = checked.into_iter().collect::<Option<Vec<_>>>()?;
                Some(Predicate::In { path, values })
            }
            Filter::IsNull { field } => {
                let path = self.resolve(field, Some("is_null"))?;
                Some(Predicate::IsNull { path })
            }
            Filter::IsNotNull { field } => {
                let path = self.resolve(field, Some("is_not_null"))?;
                Some(Predicate::IsNotNull { path })
            }
            Filter::And(children) => self.children(children).map(Predicate::And),
            Filter::Or(children) => self.children(children).map(Predicate::Or),
            Filter::Not(child) => self.filter(child).map(|p| Predicate::Not(Box::new(p))),
        }
    }

    /// Validates every child so all problems are reported.
    fn children(&mut self, children: &[Filter]) -> Option<Vec<Predicate>> {
        let resolved: Vec<Option<Predicate>> = children.iter().map(|c| self.filter(c)).collect();
        resolved.into_iter().collect()
    }

    fn projection(&mut self, fields: &[String]) -> Option<Vec<FieldDescriptor>> {
        let mut out: Vec<FieldDescriptor> = Vec::new();
        let mut ok = true;
        for name in fields {
            if name.contains('.') {
                self.problems.push(
                    QueryProblem::new(name, "projections address top-level fields only").with_operator("select"),
                );
                ok = false;
                continue;
            }
            match self.descriptor.field(name) {
                Some(field) if out.iter().all(|f| f.name() != field.name()) => out.push(field.clone()),
                Some(_) => {}
                None => {
                    self.problems
                        .push(QueryProblem::new(name, format!("unknown field `{name}`")).with_operator("select"));
                    ok = false;
                }
            }
        }
        if out.is_empty() && ok {
            self.problems.push(QueryProblem::new("*", "projection selects no fields").with_operator("select"));
            ok = false;
        }
        ok.then_some(out)
    }

    fn sort_key(&mut self, field: &str) -> Option<FieldPath> {
        let path = self.resolve(field, Some("sort"))?;
        let ty = path.leaf().logical_type();
        if !ty.is_scalar() || matches!(ty, LogicalType::Binary) {
            self.problems
                .push(QueryProblem::new(field, format!("cannot sort by {ty} values")).with_operator("sort"));
            return None;
        }
        Some(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::DescriptorBuilder;
    use crate::query::{and, eq, gt, in_list, is_null, lt, ne, not, or};
    use omnidm_codec::Shape;

    fn users() -> Arc<EntityDescriptor> {
        let address = Shape::new(
            "Address",
            vec![FieldDescriptor::text("city"), FieldDescriptor::text("zip").stored_as("postcode")],
        );
        Arc::new(
            DescriptorBuilder::new("User")
                .field(FieldDescriptor::integer("id").primary_key())
                .field(FieldDescriptor::text("name"))
                .field(FieldDescriptor::integer("age").nullable())
                .field(FieldDescriptor::float("score"))
                .field(FieldDescriptor::boolean("active"))
                .field(FieldDescriptor::nested("address", address).nullable())
                .field(FieldDescriptor::sequence("tags", LogicalType::Text))
                .field(FieldDescriptor::binary("avatar").nullable())
                .build()
                .unwrap(),
        )
    }

    fn problems(result: OdmResult<ValidatedQuery>) -> Vec<QueryProblem> {
        match result {
            Err(OdmError::InvalidQuery { problems }) => problems,
            other => panic!("expected invalid query, got {other:?}"),
        }
    }

    #[test]
    fn resolves_top_level_and_nested_paths() {
        let q = Query::matching(and([gt("age", 30), eq("address.zip", "0150")]))
            .validate(&users())
            .unwrap();
        let paths = q.predicate().paths();
        assert_eq!(paths[0].name(), "age");
        assert!(paths[1].is_nested());
        assert_eq!(paths[1].storage_path(q.descriptor(), BackendKind::Document), "address.postcode");
    }

    #[test]
    fn primary_key_path_is_id_on_documents() {
        let d = users();
        let path = FieldPath::top_level(d.primary_key());
        assert_eq!(path.storage_path(&d, BackendKind::Document), "_id");
        assert_eq!(path.storage_path(&d, BackendKind::Relational), "id");
    }

    #[test]
    fn collects_every_problem() {
        let found = problems(
            Query::matching(and([
                gt("agee", 1),
                gt("active", true),
                eq("name", 5),
                eq("tags", "x"),
                eq("age", Value::Null),
            ]))
            .validate(&users()),
        );
        let fields: Vec<&str> = found.iter().map(|p| p.field.as_str()).collect();
        assert_eq!(fields, ["agee", "active", "name", "tags", "age"]);
        assert_eq!(found[1].operator.as_deref(), Some("gt"));
        assert_eq!(found[2].message, "expected text, found integer");
    }

    #[test]
    fn bad_nested_paths() {
        let found = problems(
            Query::matching(or([eq("name.first", "a"), eq("tags.0", "x"), eq("address.country", "NO")]))
                .validate(&users()),
        );
        assert_eq!(found.len(), 3);
        assert!(found[0].message.contains("not a nested record"));
        assert!(found[1].message.contains("sequence"));
        assert_eq!(found[2].message, "unknown field `country`");
    }

    #[test]
    fn integer_literals_widen_for_float_fields() {
        let q = Query::matching(gt("score", 3)).validate(&users()).unwrap();
        match q.predicate() {
            Predicate::Compare { value, .. } => assert_eq!(*value, Value::Float(3.0)),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn in_and_null_tests() {
        let q = Query::matching(and([in_list("id", [1, 2]), is_null("address"), not(ne("name", "x"))]))
            .validate(&users())
            .unwrap();
        assert_eq!(q.predicate().paths().len(), 3);
        let found = problems(Query::matching(in_list("id", [Value::Integer(1), Value::Null])).validate(&users()));
        assert_eq!(found[0].operator.as_deref(), Some("in"));
    }

    #[test]
    fn ordering_gets_a_primary_key_tiebreak() {
        let q = Query::all().sort_desc("age").validate(&users()).unwrap();
        let names: Vec<String> = q.sort().iter().map(|(p, _)| p.name()).collect();
        assert_eq!(names, ["age", "id"]);

        let q = Query::all().limit(5).validate(&users()).unwrap();
        assert_eq!(q.sort().len(), 1);
        assert_eq!(q.sort()[0].1, Direction::Ascending);

        let q = Query::all().validate(&users()).unwrap();
        assert!(q.sort().is_empty());
    }

    #[test]
    fn keyset_pagination() {
        let q = Query::matching(lt("age", 50)).after(10).limit(2).validate(&users()).unwrap();
        match q.predicate() {
            Predicate::And(children) => {
                assert_eq!(children.len(), 2);
                assert!(matches!(&children[1], Predicate::Compare { op: CompareOp::Gt, value: Value::Integer(10), .. }));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(q.offset(), 0);

        let found = problems(Query::all().sort_asc("name").after(10).validate(&users()));
        assert_eq!(found[0].operator.as_deref(), Some("after"));
        let found = problems(Query::all().after("ten").validate(&users()));
        assert_eq!(found[0].field, "id");
    }

    #[test]
    fn sort_and_projection_rules() {
        let found = problems(Query::all().sort_asc("tags").sort_asc("avatar").validate(&users()));
        assert_eq!(found.len(), 2);
        let found = problems(Query::all().select(["name", "address.city", "nope"]).validate(&users()));
        assert_eq!(found.len(), 2);
        let q = Query::all().select(["name", "name", "age"]).validate(&users()).unwrap();
        assert_eq!(q.projection().map(<[FieldDescriptor]>::len), Some(2));
        assert_eq!(q.selected_fields().len(), 2);
    }

    #[test]
    fn by_key_checks_the_key_type() {
        let d = users();
        assert!(ValidatedQuery::by_key(&d, Value::Integer(1)).is_ok());
        assert!(matches!(
            ValidatedQuery::by_key(&d, Value::Text("1".into())),
            Err(OdmError::ValueConversion { .. })
        ));
        assert!(ValidatedQuery::by_key(&d, Value::Null).is_err());
    }

    #[test]
    fn capped_limits() {
        let q = ValidatedQuery::all(&users()).capped(1);
        assert_eq!(q.limit(), Some(1));
        let q = Query::all().limit(5).validate(&users()).unwrap().capped(10);
        assert_eq!(q.limit(), Some(5));
    }

    #[test]
    fn update_validation() {
        let d = users();
        let u = Update::new().set("name", "b").inc("age", 1).inc("score", 2).validate(&d).unwrap();
        assert_eq!(u.assignments().len(), 1);
        assert_eq!(u.increments()[1].1, Value::Float(2.0));

        let err = Update::new()
            .set("id", 5)
            .set("address.city", "x")
            .set("name", Value::Null)
            .inc("active", 1)
            .inc("age", 1.5)
            .validate(&d)
            .unwrap_err();
        match err {
            OdmError::InvalidQuery { problems } => {
                let fields: Vec<&str> = problems.iter().map(|p| p.field.as_str()).collect();
                assert_eq!(fields, ["id", "address.city", "name", "active", "age"]);
            }
            other => panic!("unexpected {other:?}"),
        }

        assert!(Update::new().validate(&d).is_err());
        assert!(Update::new().set("name", "a").inc("name", 1).validate(&d).is_err());
    }

    #[test]
    fn push_targets_sequences_with_matching_elements() {
        let d = users();
        let u = Update::new().push("tags", "new").validate(&d).unwrap();
        assert_eq!(u.pushes()[0].0.name(), "tags");
        assert_eq!(u.pushes()[0].1, Value::Text("new".into()));
        assert!(!Update::new().push("tags", "x").is_empty());

        let err = Update::new()
            .push("name", "x")
            .push("tags", 3)
            .push("age", Value::Null)
            .validate(&d)
            .unwrap_err();
        let OdmError::InvalidQuery { problems } = err else {
            panic!("expected an invalid query");
        };
        let found: Vec<(&str, &str)> = problems
            .iter()
            .map(|p| (p.field.as_str(), p.operator.as_deref().unwrap_or("")))
            .collect();
        assert_eq!(found, [("name", "push"), ("tags", "push"), ("age", "push")]);

        let err = Update::new().push("tags", Value::Null).validate(&d).unwrap_err();
        assert!(err.to_string().contains("cannot push null"), "{err}");
    }

    #[test]
    fn windows_slice_within_the_limit() {
        let d = users();
        let q = Query::all().validate(&d).unwrap();
        let w = q.window(4, 2);
        assert_eq!((w.offset(), w.limit()), (4, Some(2)));
        assert_eq!(w.sort().len(), 1);
        assert!(w.sort()[0].0.top().is_primary_key());

        let q = Query::all().sort_desc("age").offset(10).limit(5).validate(&d).unwrap();
        let w = q.window(4, 3);
        assert_eq!((w.offset(), w.limit()), (14, Some(1)));
        assert_eq!(w.sort().len(), q.sort().len());
        assert_eq!(q.window(5, 3).limit(), Some(0));
    }
}
