//! Compilation of validated operations into parameterized SQL.
//!
//! Every literal is bound as a parameter; only quoted identifiers and
//! fixed keywords reach the statement text. Each predicate node is
//! parenthesized on its own.

use super::dialect::Dialect;
use crate::descriptor::EntityDescriptor;
use crate::error::{OdmError, OdmResult, QueryProblem};
use crate::query::{CompareOp, FieldPath, Predicate, ValidatedQuery, ValidatedUpdate};
use omnidm_codec::{
    encode_field, FieldCodec, FieldDescriptor, JsonCodec, LogicalType, NativeRecord, RelationalCodec, SqlValue, Value,
};

/// SQL text plus its positional parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    /// Statement text.
    pub sql: String,
    /// Bound values, in placeholder order.
    pub params: Vec<SqlValue>,
}

impl Statement {
    /// A statement binding `params` to pre-built text.
    pub fn new(sql: impl Into<String>, params: Vec<SqlValue>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }
}

struct SqlWriter {
    dialect: Dialect,
    sql: String,
    params: Vec<SqlValue>,
}

impl SqlWriter {
    fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            sql: String::with_capacity(128),
            params: Vec::new(),
        }
    }

    fn push(&mut self, text: &str) {
        self.sql.push_str(text);
    }

    fn ident(&mut self, name: &str) {
        let quoted = self.dialect.quote(name);
        self.sql.push_str(&quoted);
    }

    fn bind(&mut self, value: SqlValue) {
        self.params.push(value);
        let placeholder = self.dialect.placeholder(self.params.len());
        self.sql.push_str(&placeholder);
    }

    fn finish(self) -> Statement {
        Statement {
            sql: self.sql,
            params: self.params,
        }
    }

    fn where_clause(&mut self, predicate: &Predicate) -> OdmResult<()> {
        if !predicate.is_trivial() {
            self.push(" WHERE ");
            self.predicate(predicate)?;
        }
        Ok(())
    }

    /// Restricts a write to the query's matches, or to the match with the
    /// lowest primary key. The nested derived table keeps MySQL from
    /// rejecting a subquery on the table being written.
    fn target(&mut self, query: &ValidatedQuery, first_only: bool) -> OdmResult<()> {
        if !first_only {
            return self.where_clause(query.predicate());
        }
        let descriptor = query.descriptor();
        let pk = descriptor.primary_key().storage_name();
        self.push(" WHERE ");
        self.ident(pk);
        self.push(" IN (SELECT ");
        self.ident(pk);
        self.push(" FROM (SELECT ");
        self.ident(pk);
        self.push(" FROM ");
        self.ident(descriptor.collection());
        self.where_clause(query.predicate())?;
        self.push(" ORDER BY ");
        self.ident(pk);
        self.push(" LIMIT 1) AS ");
        self.ident("first_match");
        self.push(")");
        Ok(())
    }

    fn json_append(&mut self, column: &str, element: SqlValue) {
        let [open, middle, close] = self.dialect.json_append();
        self.push(open);
        self.ident(column);
        self.push(middle);
        self.bind(element);
        self.push(close);
    }

    fn predicate(&mut self, predicate: &Predicate) -> OdmResult<()> {
        match predicate {
            Predicate::Compare { path, op, value } => {
                let column = column(path)?;
                let native = literal(path, value)?;
                self.push("(");
                self.ident(column);
                if *op == CompareOp::Ne && path.leaf().is_nullable() {
                    self.push(" <> ");
                    self.bind(native);
                    self.push(" OR ");
                    self.ident(column);
                    self.push(" IS NULL");
                } else {
                    self.push(" ");
                    self.push(symbol(*op));
                    self.push(" ");
                    self.bind(native);
                }
                self.push(")");
            }
            Predicate::In { path, values } => {
                let column = column(path)?;
                if values.is_empty() {
                    self.push("(1 = 0)");
                    return Ok(());
                }
                self.push("(");
                self.ident(column);
                self.push(" IN (");
                for (i, value) in values.iter().enumerate() {
                    if i > 0 {
                        self.push(", ");
                    }
                    let native = literal(path, value)?;
                    self.bind(native);
                }
                self.push("))");
            }
            Predicate::IsNull { path } => {
                let column = column(path)?;
                self.push("(");
                self.ident(column);
                self.push(" IS NULL)");
            }
            Predicate::IsNotNull { path } => {
                let column = column(path)?;
                self.push("(");
                self.ident(column);
                self.push(" IS NOT NULL)");
            }
            Predicate::And(children) => self.junction(children, " AND ", "(1 = 1)")?,
            Predicate::Or(children) => self.junction(children, " OR ", "(1 = 0)")?,
            Predicate::Not(child) => {
                // A NULL comparison inside must count as false before negation.
                self.push("(NOT COALESCE(");
                self.predicate(child)?;
                self.push(", FALSE))");
            }
        }
        Ok(())
    }

    fn junction(&mut self, children: &[Predicate], separator: &str, empty: &str) -> OdmResult<()> {
        if children.is_empty() {
            self.push(empty);
            return Ok(());
        }
        self.push("(");
        for (i, child) in children.iter().enumerate() {
            if i > 0 {
                self.push(separator);
            }
            self.predicate(child)?;
        }
        self.push(")");
        Ok(())
    }

    fn order_and_page(&mut self, query: &ValidatedQuery) -> OdmResult<()> {
        if !query.sort().is_empty() {
            self.push(" ORDER BY ");
            for (i, (path, direction)) in query.sort().iter().enumerate() {
                if i > 0 {
                    self.push(", ");
                }
                self.ident(column(path)?);
                self.push(" ");
                self.push(self.dialect.order(*direction));
            }
        }
        match (query.limit(), query.offset()) {
            (Some(limit), offset) => {
                self.push(" LIMIT ");
                self.bind(count_value(limit));
                if offset > 0 {
                    self.push(" OFFSET ");
                    self.bind(count_value(offset));
                }
            }
            (None, 0) => {}
            (None, offset) => {
                if let Some(unbounded) = self.dialect.unbounded_limit() {
                    self.push(" ");
                    self.push(unbounded);
                }
                self.push(" OFFSET ");
                self.bind(count_value(offset));
            }
        }
        Ok(())
    }
}

fn symbol(op: CompareOp) -> &'static str {
    match op {
        CompareOp::Eq => "=",
        CompareOp::Ne => "<>",
        CompareOp::Gt => ">",
        CompareOp::Gte => ">=",
        CompareOp::Lt => "<",
        CompareOp::Lte => "<=",
    }
}

fn count_value(n: u64) -> SqlValue {
    SqlValue::Integer(i64::try_from(n).unwrap_or(i64::MAX))
}

/// Column for a path; nested paths have no relational column.
fn column(path: &FieldPath) -> OdmResult<&str> {
    if path.is_nested() {
        return Err(OdmError::invalid_query(QueryProblem::new(
            path.name(),
            "nested paths cannot be queried on a relational backend",
        )));
    }
    Ok(path.top().storage_name())
}

fn literal(path: &FieldPath, value: &Value) -> OdmResult<SqlValue> {
    Ok(encode_field::<RelationalCodec>(path.leaf(), value)?)
}

fn column_list(dialect: Dialect, fields: &[&FieldDescriptor]) -> String {
    fields
        .iter()
        .map(|f| dialect.quote(f.storage_name()))
        .collect::<Vec<_>>()
        .join(", ")
}

fn placeholders(dialect: Dialect, first: usize, count: usize) -> String {
    (first..first + count)
        .map(|i| dialect.placeholder(i))
        .collect::<Vec<_>>()
        .join(", ")
}

/// `CREATE TABLE IF NOT EXISTS` for the entity.
pub fn create_table(dialect: Dialect, descriptor: &EntityDescriptor) -> String {
    let columns: Vec<String> = descriptor
        .fields()
        .iter()
        .map(|field| {
            let mut column = format!("{} {}", dialect.quote(field.storage_name()), dialect.column_type(field));
            if !field.is_nullable() {
                column.push_str(" NOT NULL");
            }
            column
        })
        .collect();
    format!(
        "CREATE TABLE IF NOT EXISTS {} ({}, PRIMARY KEY ({}))",
        dialect.quote(descriptor.collection()),
        columns.join(", "),
        dialect.quote(descriptor.primary_key().storage_name())
    )
}

/// `SELECT <fields> FROM <table>`.
pub fn select_prefix(dialect: Dialect, descriptor: &EntityDescriptor, fields: &[&FieldDescriptor]) -> String {
    format!(
        "SELECT {} FROM {}",
        column_list(dialect, fields),
        dialect.quote(descriptor.collection())
    )
}

/// A full read: `prefix` must select `query.selected_fields()`.
///
/// # Errors
///
/// Returns an invalid query error for nested paths and a value conversion
/// error for literals that do not encode.
pub fn select(dialect: Dialect, query: &ValidatedQuery, prefix: &str) -> OdmResult<Statement> {
    let mut w = SqlWriter::new(dialect);
    w.push(prefix);
    w.where_clause(query.predicate())?;
    w.order_and_page(query)?;
    Ok(w.finish())
}

/// `SELECT COUNT(*)` over the query's predicate.
///
/// # Errors
///
/// See [`select`].
pub fn count(dialect: Dialect, query: &ValidatedQuery) -> OdmResult<Statement> {
    let mut w = SqlWriter::new(dialect);
    w.push("SELECT COUNT(*) FROM ");
    w.ident(query.descriptor().collection());
    w.where_clause(query.predicate())?;
    Ok(w.finish())
}

/// Statement text probing for a primary key; binds one parameter.
pub fn exists_by_key(dialect: Dialect, descriptor: &EntityDescriptor) -> String {
    format!(
        "SELECT 1 FROM {} WHERE {} = {} LIMIT 1",
        dialect.quote(descriptor.collection()),
        dialect.quote(descriptor.primary_key().storage_name()),
        dialect.placeholder(1)
    )
}

/// Single-row insert text binding every field in declaration order.
pub fn insert_one(dialect: Dialect, descriptor: &EntityDescriptor) -> String {
    let fields: Vec<&FieldDescriptor> = descriptor.fields().iter().collect();
    format!(
        "INSERT INTO {} ({}) VALUES ({})",
        dialect.quote(descriptor.collection()),
        column_list(dialect, &fields),
        placeholders(dialect, 1, fields.len())
    )
}

/// Multi-row inserts, split so no statement exceeds the dialect's
/// parameter limit. Rows must come from `to_native_record`.
pub fn insert_many(dialect: Dialect, descriptor: &EntityDescriptor, rows: Vec<NativeRecord<SqlValue>>) -> Vec<Statement> {
    let fields: Vec<&FieldDescriptor> = descriptor.fields().iter().collect();
    let width = fields.len().max(1);
    let per_statement = (dialect.max_params() / width).max(1);
    let head = format!(
        "INSERT INTO {} ({}) VALUES ",
        dialect.quote(descriptor.collection()),
        column_list(dialect, &fields)
    );

    let mut statements = Vec::new();
    let mut rows = rows.into_iter().peekable();
    while rows.peek().is_some() {
        let mut sql = head.clone();
        let mut params = Vec::with_capacity(per_statement * width);
        for (i, row) in rows.by_ref().take(per_statement).enumerate() {
            if i > 0 {
                sql.push_str(", ");
            }
            sql.push('(');
            sql.push_str(&placeholders(dialect, params.len() + 1, row.len()));
            sql.push(')');
            params.extend(row.into_iter().map(|(_, v)| v));
        }
        statements.push(Statement { sql, params });
    }
    statements
}

/// `UPDATE ... SET` of `fields` for one primary key; the key binds last.
pub fn update_by_key(dialect: Dialect, descriptor: &EntityDescriptor, fields: &[&FieldDescriptor]) -> String {
    let assignments: Vec<String> = fields
        .iter()
        .enumerate()
        .map(|(i, f)| format!("{} = {}", dialect.quote(f.storage_name()), dialect.placeholder(i + 1)))
        .collect();
    format!(
        "UPDATE {} SET {} WHERE {} = {}",
        dialect.quote(descriptor.collection()),
        assignments.join(", "),
        dialect.quote(descriptor.primary_key().storage_name()),
        dialect.placeholder(fields.len() + 1)
    )
}

/// Bulk `UPDATE` over the query's predicate.
///
/// Increments treat a NULL column as zero. Pushes append to the column's
/// JSON array, treating NULL as empty.
///
/// # Errors
///
/// See [`select`].
pub fn update_where(dialect: Dialect, query: &ValidatedQuery, update: &ValidatedUpdate) -> OdmResult<Statement> {
    update_matching(dialect, query, update, false)
}

/// Like [`update_where`], limited to the match with the lowest primary key.
///
/// # Errors
///
/// See [`select`].
pub fn update_first(dialect: Dialect, query: &ValidatedQuery, update: &ValidatedUpdate) -> OdmResult<Statement> {
    update_matching(dialect, query, update, true)
}

fn update_matching(
    dialect: Dialect,
    query: &ValidatedQuery,
    update: &ValidatedUpdate,
    first_only: bool,
) -> OdmResult<Statement> {
    let mut w = SqlWriter::new(dialect);
    w.push("UPDATE ");
    w.ident(query.descriptor().collection());
    w.push(" SET ");
    let mut first = true;
    let mut separate = |w: &mut SqlWriter| {
        if !first {
            w.push(", ");
        }
        first = false;
    };
    for (field, value) in update.assignments() {
        separate(&mut w);
        w.ident(field.storage_name());
        w.push(" = ");
        w.bind(encode_field::<RelationalCodec>(field, value)?);
    }
    for (field, by) in update.increments() {
        separate(&mut w);
        w.ident(field.storage_name());
        w.push(" = COALESCE(");
        w.ident(field.storage_name());
        w.push(", 0) + ");
        w.bind(encode_field::<RelationalCodec>(field, by)?);
    }
    for (field, element) in update.pushes() {
        let LogicalType::Sequence(element_type) = field.logical_type() else {
            return Err(OdmError::value_conversion(field.name(), "push needs a sequence field"));
        };
        let json = JsonCodec::encode(element, element_type).map_err(|e| e.at_field(field.name()))?;
        separate(&mut w);
        w.ident(field.storage_name());
        w.push(" = ");
        w.json_append(field.storage_name(), SqlValue::Text(json.to_string()));
    }
    w.target(query, first_only)?;
    Ok(w.finish())
}

/// `DELETE` over the query's predicate.
///
/// # Errors
///
/// See [`select`].
pub fn delete(dialect: Dialect, query: &ValidatedQuery) -> OdmResult<Statement> {
    delete_matching(dialect, query, false)
}

/// `DELETE` of the match with the lowest primary key.
///
/// # Errors
///
/// See [`select`].
pub fn delete_first(dialect: Dialect, query: &ValidatedQuery) -> OdmResult<Statement> {
    delete_matching(dialect, query, true)
}

fn delete_matching(dialect: Dialect, query: &ValidatedQuery, first_only: bool) -> OdmResult<Statement> {
    let mut w = SqlWriter::new(dialect);
    w.push("DELETE FROM ");
    w.ident(query.descriptor().collection());
    w.target(query, first_only)?;
    Ok(w.finish())
}
