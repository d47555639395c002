//! Evaluation of MongoDB-style filter documents.

use super::ordering::{compare, equal};
use crate::error::{DriverError, DriverResult};
use bson::{Bson, Document};
use std::cmp::Ordering;

/// Resolves a dotted path (`address.city`) inside a document.
pub fn lookup<'a>(doc: &'a Document, path: &str) -> Option<&'a Bson> {
    let mut segments = path.split('.');
    let mut current = doc.get(segments.next()?)?;
    for segment in segments {
        current = match current {
            Bson::Document(inner) => inner.get(segment)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Returns whether `doc` satisfies `filter`.
///
/// # Errors
///
/// Returns a permanent error for unknown or malformed operators.
pub fn matches(doc: &Document, filter: &Document) -> DriverResult<bool> {
    for (key, condition) in filter {
        let ok = match key.as_str() {
            "$and" => clauses(condition, key)?
                .iter()
                .try_fold(true, |acc, c| Ok::<_, DriverError>(acc && matches(doc, c)?))?,
            "$or" => {
                let mut any = false;
                for clause in clauses(condition, key)? {
                    if matches(doc, clause)? {
                        any = true;
                        break;
                    }
                }
                any
            }
            "$nor" => {
                let mut none = true;
                for clause in clauses(condition, key)? {
                    if matches(doc, clause)? {
                        none = false;
                        break;
                    }
                }
                none
            }
            op if op.starts_with('$') => {
                return Err(DriverError::permanent(format!("unknown top-level operator: {op}")))
            }
            path => field_matches(lookup(doc, path), condition)?,
        };
        if !ok {
            return Ok(false);
        }
    }
    Ok(true)
}

fn clauses<'a>(condition: &'a Bson, op: &str) -> DriverResult<Vec<&'a Document>> {
    let Bson::Array(items) = condition else {
        return Err(DriverError::permanent(format!("{op} requires an array")));
    };
    items
        .iter()
        .map(|item| match item {
            Bson::Document(doc) => Ok(doc),
            _ => Err(DriverError::permanent(format!("{op} entries must be documents"))),
        })
        .collect()
}

fn is_operator_document(condition: &Bson) -> Option<&Document> {
    match condition {
        Bson::Document(doc) if !doc.is_empty() && doc.keys().all(|k| k.starts_with('$')) => Some(doc),
        _ => None,
    }
}

fn field_matches(value: Option<&Bson>, condition: &Bson) -> DriverResult<bool> {
    let Some(operators) = is_operator_document(condition) else {
        return Ok(eq(value, condition));
    };
    for (op, operand) in operators {
        let ok = match op.as_str() {
            "$eq" => eq(value, operand),
            "$ne" => !eq(value, operand),
            "$gt" => ordered(value, operand, |o| o == Ordering::Greater),
            "$gte" => ordered(value, operand, |o| o != Ordering::Less),
            "$lt" => ordered(value, operand, |o| o == Ordering::Less),
            "$lte" => ordered(value, operand, |o| o != Ordering::Greater),
            "$in" => list(operand, op)?.iter().any(|candidate| eq(value, candidate)),
            "$nin" => !list(operand, op)?.iter().any(|candidate| eq(value, candidate)),
            "$exists" => match operand {
                Bson::Boolean(expected) => value.is_some() == *expected,
                _ => return Err(DriverError::permanent("$exists requires a boolean")),
            },
            other => return Err(DriverError::permanent(format!("unknown operator: {other}"))),
        };
        if !ok {
            return Ok(false);
        }
    }
    Ok(true)
}

fn list<'a>(operand: &'a Bson, op: &str) -> DriverResult<&'a Vec<Bson>> {
    match operand {
        Bson::Array(items) => Ok(items),
        _ => Err(DriverError::permanent(format!("{op} requires an array"))),
    }
}

/// `{field: null}` matches both null and missing fields.
fn eq(value: Option<&Bson>, target: &Bson) -> bool {
    match (value, target) {
        (None, Bson::Null) => true,
        (None, _) => false,
        (Some(v), t) => equal(v, t),
    }
}

fn ordered(value: Option<&Bson>, operand: &Bson, accept: impl Fn(Ordering) -> bool) -> bool {
    value
        .and_then(|v| compare(v, operand))
        .is_some_and(accept)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    fn person() -> Document {
        doc! {
            "_id": 1_i64,
            "age": 40_i64,
            "active": true,
            "nick": Bson::Null,
            "address": { "city": "Oslo" },
        }
    }

    #[test]
    fn implicit_and_explicit_equality() {
        assert!(matches(&person(), &doc! { "age": 40_i64 }).unwrap());
        assert!(matches(&person(), &doc! { "age": { "$eq": 40 } }).unwrap());
        assert!(!matches(&person(), &doc! { "age": 41_i64 }).unwrap());
    }

    #[test]
    fn range_operators_stay_within_type() {
        assert!(matches(&person(), &doc! { "age": { "$gt": 30_i64, "$lte": 40.0 } }).unwrap());
        assert!(!matches(&person(), &doc! { "age": { "$gt": "3" } }).unwrap());
    }

    #[test]
    fn logical_combinators() {
        let filter = doc! { "$and": [ { "age": { "$gt": 30_i64 } }, { "active": true } ] };
        assert!(matches(&person(), &filter).unwrap());
        let filter = doc! { "$or": [ { "age": 1_i64 }, { "active": false } ] };
        assert!(!matches(&person(), &filter).unwrap());
        let filter = doc! { "$nor": [ { "age": 1_i64 } ] };
        assert!(matches(&person(), &filter).unwrap());
    }

    #[test]
    fn null_matches_missing_and_null() {
        assert!(matches(&person(), &doc! { "nick": Bson::Null }).unwrap());
        assert!(matches(&person(), &doc! { "missing": Bson::Null }).unwrap());
        assert!(!matches(&person(), &doc! { "age": Bson::Null }).unwrap());
        assert!(matches(&person(), &doc! { "age": { "$ne": Bson::Null } }).unwrap());
        assert!(!matches(&person(), &doc! { "nick": { "$ne": Bson::Null } }).unwrap());
    }

    #[test]
    fn membership() {
        assert!(matches(&person(), &doc! { "age": { "$in": [1_i64, 40_i64] } }).unwrap());
        assert!(!matches(&person(), &doc! { "age": { "$in": [] } }).unwrap());
        assert!(matches(&person(), &doc! { "age": { "$nin": [1_i64] } }).unwrap());
    }

    #[test]
    fn dotted_paths() {
        assert!(matches(&person(), &doc! { "address.city": "Oslo" }).unwrap());
        assert!(!matches(&person(), &doc! { "address.zip": { "$exists": true } }).unwrap());
    }

    #[test]
    fn unknown_operator_is_an_error() {
        let err = matches(&person(), &doc! { "age": { "$near": 1 } }).unwrap_err();
        assert!(matches!(err, DriverError::Permanent { .. }));
    }

    #[test]
    fn empty_filter_matches_everything() {
        assert!(matches(&person(), &doc! {}).unwrap());
    }
}
