//! Application of operator updates to stored documents.

use crate::error::{DriverError, DriverResult};
use bson::{Bson, Document};

/// Applies `$set`, `$unset`, `$inc` and `$push` from `update` to `doc`.
///
/// # Errors
///
/// Returns a permanent error for replacement-style updates, unknown
/// operators, `_id` changes, dotted paths, non-numeric increments or
/// pushes onto a non-array.
pub fn apply(doc: &mut Document, update: &Document) -> DriverResult<()> {
    if update.is_empty() {
        return Err(DriverError::permanent("update document must not be empty"));
    }
    for (op, fields) in update {
        let Bson::Document(fields) = fields else {
            return Err(DriverError::permanent(format!("{op} requires a document")));
        };
        for (path, operand) in fields {
            if path == "_id" {
                return Err(DriverError::permanent("the _id field is immutable"));
            }
            if path.contains('.') {
                return Err(DriverError::permanent(format!("dotted update path not supported: {path}")));
            }
            match op.as_str() {
                "$set" => {
                    doc.insert(path.clone(), operand.clone());
                }
                "$unset" => {
                    doc.remove(path);
                }
                "$inc" => {
                    let next = increment(doc.get(path), operand, path)?;
                    doc.insert(path.clone(), next);
                }
                "$push" => push(doc, path, operand)?,
                other if other.starts_with('$') => {
                    return Err(DriverError::permanent(format!("unknown update operator: {other}")))
                }
                _ => return Err(DriverError::permanent("update must use operators")),
            }
        }
    }
    Ok(())
}

#[allow(clippy::cast_precision_loss)]
fn increment(current: Option<&Bson>, by: &Bson, path: &str) -> DriverResult<Bson> {
    let overflow = || DriverError::permanent(format!("integer overflow incrementing {path}"));
    Ok(match (current, by) {
        (None | Some(Bson::Null), by @ (Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_))) => by.clone(),
        (Some(Bson::Int64(a)), Bson::Int64(b)) => Bson::Int64(a.checked_add(*b).ok_or_else(overflow)?),
        (Some(Bson::Int64(a)), Bson::Int32(b)) => Bson::Int64(a.checked_add(i64::from(*b)).ok_or_else(overflow)?),
        (Some(Bson::Int32(a)), Bson::Int64(b)) => Bson::Int64(i64::from(*a).checked_add(*b).ok_or_else(overflow)?),
        (Some(Bson::Int32(a)), Bson::Int32(b)) => Bson::Int64(i64::from(*a) + i64::from(*b)),
        (Some(Bson::Double(a)), Bson::Double(b)) => Bson::Double(a + b),
        (Some(Bson::Double(a)), Bson::Int64(b)) => Bson::Double(a + *b as f64),
        (Some(Bson::Double(a)), Bson::Int32(b)) => Bson::Double(a + f64::from(*b)),
        (Some(Bson::Int64(a)), Bson::Double(b)) => Bson::Double(*a as f64 + b),
        (Some(Bson::Int32(a)), Bson::Double(b)) => Bson::Double(f64::from(*a) + b),
        _ => {
            return Err(DriverError::permanent(format!(
                "cannot apply $inc to non-numeric value at {path}"
            )))
        }
    })
}

// A missing or null field becomes a one-element array.
fn push(doc: &mut Document, path: &str, element: &Bson) -> DriverResult<()> {
    if let Some(Bson::Array(items)) = doc.get_mut(path) {
        items.push(element.clone());
        return Ok(());
    }
    match doc.get(path) {
        None | Some(Bson::Null) => {
            doc.insert(path, Bson::Array(vec![element.clone()]));
            Ok(())
        }
        Some(_) => Err(DriverError::permanent(format!(
            "cannot apply $push to non-array value at {path}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn set_unset_inc() {
        let mut doc = doc! { "_id": 1_i64, "name": "a", "visits": 1_i64, "tmp": true };
        apply(
            &mut doc,
            &doc! { "$set": { "name": "b" }, "$inc": { "visits": 2_i64 }, "$unset": { "tmp": "" } },
        )
        .unwrap();
        assert_eq!(doc, doc! { "_id": 1_i64, "name": "b", "visits": 3_i64 });
    }

    #[test]
    fn inc_on_missing_field_sets_it() {
        let mut doc = doc! { "_id": 1_i64 };
        apply(&mut doc, &doc! { "$inc": { "score": 1.5 } }).unwrap();
        assert_eq!(doc.get("score"), Some(&Bson::Double(1.5)));
    }

    #[test]
    fn inc_overflow_is_rejected() {
        let mut doc = doc! { "n": i64::MAX };
        assert!(apply(&mut doc, &doc! { "$inc": { "n": 1_i64 } }).is_err());
    }

    #[test]
    fn push_appends_and_starts_missing_arrays() {
        let mut doc = doc! { "_id": 1_i64, "tags": ["a"], "none": null };
        apply(&mut doc, &doc! { "$push": { "tags": "b", "none": 1_i64, "fresh": true } }).unwrap();
        assert_eq!(doc.get_array("tags").unwrap(), &vec![Bson::from("a"), Bson::from("b")]);
        assert_eq!(doc.get_array("none").unwrap(), &vec![Bson::Int64(1)]);
        assert_eq!(doc.get_array("fresh").unwrap(), &vec![Bson::Boolean(true)]);
    }

    #[test]
    fn push_onto_scalar_is_rejected() {
        let mut doc = doc! { "_id": 1_i64, "name": "a" };
        assert!(apply(&mut doc, &doc! { "$push": { "name": "b" } }).is_err());
        assert_eq!(doc.get_str("name").unwrap(), "a");
    }

    #[test]
    fn id_is_immutable() {
        let mut doc = doc! { "_id": 1_i64 };
        assert!(apply(&mut doc, &doc! { "$set": { "_id": 2_i64 } }).is_err());
    }

    #[test]
    fn replacement_style_is_rejected() {
        let mut doc = doc! { "_id": 1_i64 };
        assert!(apply(&mut doc, &doc! { "name": "x" }).is_err());
    }
}
