//! BSON value comparison following MongoDB's type bracketing.

use bson::Bson;
use std::cmp::Ordering;

/// Rank of a value's type bracket in the cross-type sort order.
fn bracket(value: &Bson) -> u8 {
    match value {
        Bson::MinKey => 0,
        Bson::Null | Bson::Undefined => 1,
        Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_) | Bson::Decimal128(_) => 2,
        Bson::String(_) | Bson::Symbol(_) => 3,
        Bson::Document(_) => 4,
        Bson::Array(_) => 5,
        Bson::Binary(_) => 6,
        Bson::ObjectId(_) => 7,
        Bson::Boolean(_) => 8,
        Bson::DateTime(_) => 9,
        Bson::Timestamp(_) => 10,
        Bson::RegularExpression(_) => 11,
        Bson::MaxKey => 13,
        _ => 12,
    }
}

#[allow(clippy::cast_precision_loss)]
fn as_f64(value: &Bson) -> Option<f64> {
    match value {
        Bson::Int32(i) => Some(f64::from(*i)),
        Bson::Int64(i) => Some(*i as f64),
        Bson::Double(f) => Some(*f),
        _ => None,
    }
}

/// Compares two values of the same bracket; `None` across brackets.
///
/// Query operators (`$gt`, `$lt`, ...) only match within a bracket.
pub fn compare(a: &Bson, b: &Bson) -> Option<Ordering> {
    if bracket(a) != bracket(b) {
        return None;
    }
    match (a, b) {
        (Bson::Int32(x), Bson::Int32(y)) => Some(x.cmp(y)),
        (Bson::Int64(x), Bson::Int64(y)) => Some(x.cmp(y)),
        (Bson::Int32(x), Bson::Int64(y)) => Some(i64::from(*x).cmp(y)),
        (Bson::Int64(x), Bson::Int32(y)) => Some(x.cmp(&i64::from(*y))),
        (x, y) if as_f64(x).is_some() && as_f64(y).is_some() => as_f64(x)?.partial_cmp(&as_f64(y)?),
        (Bson::String(x), Bson::String(y)) => Some(x.cmp(y)),
        (Bson::Boolean(x), Bson::Boolean(y)) => Some(x.cmp(y)),
        (Bson::DateTime(x), Bson::DateTime(y)) => Some(x.timestamp_millis().cmp(&y.timestamp_millis())),
        (Bson::Binary(x), Bson::Binary(y)) => Some(
            x.bytes
                .len()
                .cmp(&y.bytes.len())
                .then_with(|| u8::from(x.subtype).cmp(&u8::from(y.subtype)))
                .then_with(|| x.bytes.cmp(&y.bytes)),
        ),
        (Bson::ObjectId(x), Bson::ObjectId(y)) => Some(x.bytes().cmp(&y.bytes())),
        (Bson::Null | Bson::Undefined, Bson::Null | Bson::Undefined) => Some(Ordering::Equal),
        (Bson::Array(x), Bson::Array(y)) => compare_sequences(x.iter(), y.iter()),
        (Bson::Document(x), Bson::Document(y)) => {
            let left: Vec<Bson> = x.iter().flat_map(|(k, v)| [Bson::String(k.clone()), v.clone()]).collect();
            let right: Vec<Bson> = y.iter().flat_map(|(k, v)| [Bson::String(k.clone()), v.clone()]).collect();
            compare_sequences(left.iter(), right.iter())
        }
        (x, y) if x == y => Some(Ordering::Equal),
        _ => None,
    }
}

fn compare_sequences<'a>(
    mut left: impl Iterator<Item = &'a Bson>,
    mut right: impl Iterator<Item = &'a Bson>,
) -> Option<Ordering> {
    loop {
        match (left.next(), right.next()) {
            (None, None) => return Some(Ordering::Equal),
            (None, Some(_)) => return Some(Ordering::Less),
            (Some(_), None) => return Some(Ordering::Greater),
            (Some(a), Some(b)) => match total_order(a, b) {
                Ordering::Equal => {}
                other => return Some(other),
            },
        }
    }
}

/// Equality as the query language sees it (numeric types compare by value).
pub fn equal(a: &Bson, b: &Bson) -> bool {
    compare(a, b) == Some(Ordering::Equal)
}

/// Total order used for sorting: bracket first, then value.
pub fn total_order(a: &Bson, b: &Bson) -> Ordering {
    bracket(a)
        .cmp(&bracket(b))
        .then_with(|| compare(a, b).unwrap_or(Ordering::Equal))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn numbers_compare_across_widths() {
        assert_eq!(compare(&Bson::Int32(3), &Bson::Int64(3)), Some(Ordering::Equal));
        assert_eq!(compare(&Bson::Int64(2), &Bson::Double(2.5)), Some(Ordering::Less));
        assert!(equal(&Bson::Double(4.0), &Bson::Int32(4)));
    }

    #[test]
    fn different_brackets_do_not_compare() {
        assert_eq!(compare(&Bson::Int64(1), &Bson::String("1".into())), None);
        assert_eq!(compare(&Bson::Boolean(true), &Bson::Int32(1)), None);
    }

    #[test]
    fn sort_order_puts_null_before_numbers_before_strings() {
        let mut values = vec![Bson::String("a".into()), Bson::Int64(5), Bson::Null];
        values.sort_by(total_order);
        assert_eq!(values, vec![Bson::Null, Bson::Int64(5), Bson::String("a".into())]);
    }

    #[test]
    fn documents_compare_field_by_field() {
        let a = Bson::Document(doc! { "x": 1, "y": 1 });
        let b = Bson::Document(doc! { "x": 1, "y": 2 });
        assert_eq!(compare(&a, &b), Some(Ordering::Less));
        assert!(equal(&a, &a.clone()));
    }

    fn scalar() -> impl proptest::strategy::Strategy<Value = Bson> {
        use proptest::prelude::*;
        prop_oneof![
            Just(Bson::Null),
            any::<i32>().prop_map(Bson::Int32),
            (-(1_i64 << 53)..(1_i64 << 53)).prop_map(Bson::Int64),
            (-1.0e6_f64..1.0e6).prop_map(Bson::Double),
            "[a-c]{0,3}".prop_map(Bson::String),
            any::<bool>().prop_map(Bson::Boolean),
        ]
    }

    proptest::proptest! {
        #[test]
        fn total_order_is_antisymmetric(a in scalar(), b in scalar()) {
            proptest::prop_assert_eq!(total_order(&a, &b), total_order(&b, &a).reverse());
        }

        #[test]
        fn sorting_is_consistent_with_compare(mut values in proptest::collection::vec(scalar(), 0..12)) {
            values.sort_by(total_order);
            for pair in values.windows(2) {
                if let Some(ordering) = compare(&pair[0], &pair[1]) {
                    proptest::prop_assert_ne!(ordering, Ordering::Greater);
                }
            }
        }
    }
}
