//! SQL dialect differences: quoting, placeholders, column types, paging.

use crate::query::Direction;
use omnidm_codec::{FieldDescriptor, LogicalType};
use std::fmt;

/// The SQL flavours statements are generated for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dialect {
    /// SQLite 3.
    Sqlite,
    /// MySQL / MariaDB.
    MySql,
    /// PostgreSQL.
    Postgres,
}

impl Dialect {
    /// Lowercase name.
    pub const fn name(self) -> &'static str {
        match self {
            Dialect::Sqlite => "sqlite",
            Dialect::MySql => "mysql",
            Dialect::Postgres => "postgres",
        }
    }

    /// Quotes an identifier, doubling any embedded quote character.
    pub fn quote(self, ident: &str) -> String {
        let q = match self {
            Dialect::MySql => '`',
            Dialect::Sqlite | Dialect::Postgres => '"',
        };
        let mut out = String::with_capacity(ident.len() + 2);
        out.push(q);
        for c in ident.chars() {
            if c == q {
                out.push(q);
            }
            out.push(c);
        }
        out.push(q);
        out
    }

    /// Placeholder for the `index`th bound parameter (1-based).
    pub fn placeholder(self, index: usize) -> String {
        match self {
            Dialect::Postgres => format!("${index}"),
            Dialect::Sqlite | Dialect::MySql => "?".to_string(),
        }
    }

    /// Most parameters one statement may bind.
    pub const fn max_params(self) -> usize {
        match self {
            Dialect::Sqlite => 999,
            Dialect::MySql | Dialect::Postgres => 65_535,
        }
    }

    /// Column type for a field.
    pub fn column_type(self, field: &FieldDescriptor) -> &'static str {
        match (self, field.logical_type()) {
            (Dialect::Sqlite, LogicalType::Integer | LogicalType::Timestamp) => "INTEGER",
            (_, LogicalType::Integer | LogicalType::Timestamp) => "BIGINT",
            (Dialect::Sqlite, LogicalType::Float) => "REAL",
            (Dialect::MySql, LogicalType::Float) => "DOUBLE",
            (Dialect::Postgres, LogicalType::Float) => "DOUBLE PRECISION",
            // MySQL cannot index unbounded TEXT.
            (Dialect::MySql, LogicalType::Text) if field.is_primary_key() => "VARCHAR(255)",
            (_, LogicalType::Text) => "TEXT",
            (_, LogicalType::Boolean) => "BOOLEAN",
            (Dialect::Sqlite, LogicalType::Binary) => "BLOB",
            (Dialect::MySql, LogicalType::Binary) => "LONGBLOB",
            (Dialect::Postgres, LogicalType::Binary) => "BYTEA",
            (Dialect::Sqlite, LogicalType::Identifier) => "TEXT",
            (_, LogicalType::Identifier) => "VARCHAR(36)",
            (_, LogicalType::Nested(_) | LogicalType::Sequence(_)) => "TEXT",
        }
    }

    /// `ORDER BY` direction keyword; nulls sort lowest everywhere.
    pub(crate) const fn order(self, direction: Direction) -> &'static str {
        match (self, direction) {
            (Dialect::Postgres, Direction::Ascending) => "ASC NULLS FIRST",
            (Dialect::Postgres, Direction::Descending) => "DESC NULLS LAST",
            (_, Direction::Ascending) => "ASC",
            (_, Direction::Descending) => "DESC",
        }
    }

    /// `LIMIT` clause standing for "no limit" before an `OFFSET`, if the
    /// dialect needs one.
    pub(crate) const fn unbounded_limit(self) -> Option<&'static str> {
        match self {
            Dialect::Sqlite => Some("LIMIT -1"),
            Dialect::MySql => Some("LIMIT 18446744073709551615"),
            Dialect::Postgres => None,
        }
    }

    /// Text around a column and a bound JSON value that appends the value
    /// to the column's JSON array. A NULL column counts as empty.
    pub(crate) const fn json_append(self) -> [&'static str; 3] {
        match self {
            Dialect::Sqlite => ["json_insert(COALESCE(", ", '[]'), '$[#]', json(", "))"],
            Dialect::MySql => ["JSON_ARRAY_APPEND(COALESCE(", ", '[]'), '$', CAST(", " AS JSON))"],
            Dialect::Postgres => [
                "CAST(CAST(COALESCE(",
                ", '[]') AS JSONB) || jsonb_build_array(CAST(",
                " AS JSONB)) AS TEXT)",
            ],
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quoting_doubles_embedded_quotes() {
        assert_eq!(Dialect::Sqlite.quote("user"), "\"user\"");
        assert_eq!(Dialect::Postgres.quote("a\"b"), "\"a\"\"b\"");
        assert_eq!(Dialect::MySql.quote("a`b"), "`a``b`");
    }

    #[test]
    fn placeholders() {
        assert_eq!(Dialect::Sqlite.placeholder(3), "?");
        assert_eq!(Dialect::Postgres.placeholder(3), "$3");
    }

    #[test]
    fn column_types_follow_the_dialect() {
        let key = FieldDescriptor::text("code").primary_key();
        assert_eq!(Dialect::MySql.column_type(&key), "VARCHAR(255)");
        assert_eq!(Dialect::Sqlite.column_type(&key), "TEXT");
        let blob = FieldDescriptor::binary("data");
        assert_eq!(Dialect::Postgres.column_type(&blob), "BYTEA");
        let ts = FieldDescriptor::timestamp("at");
        assert_eq!(Dialect::Sqlite.column_type(&ts), "INTEGER");
        assert_eq!(Dialect::MySql.column_type(&ts), "BIGINT");
    }
}
