//! Property-based test generators using proptest.
//!
//! Provides strategies for logical types and values that every reference
//! backend can store losslessly, plus sample entities and filters.

use crate::fixtures::User;
use omnidm_codec::{Bytes, FieldDescriptor, LogicalType, Record, Shape, Timestamp, Uuid, Value};
use omnidm_core::query::{CompareOp, Filter};
use proptest::prelude::*;
use std::cmp::Ordering;

/// Strategy for scalar logical types.
pub fn scalar_type_strategy() -> impl Strategy<Value = LogicalType> {
    prop_oneof![
        Just(LogicalType::Integer),
        Just(LogicalType::Float),
        Just(LogicalType::Text),
        Just(LogicalType::Boolean),
        Just(LogicalType::Timestamp),
        Just(LogicalType::Binary),
        Just(LogicalType::Identifier),
    ]
}

/// Strategy for field names.
pub fn field_name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z][a-z0-9_]{0,11}").expect("Invalid regex")
}

/// Strategy for logical types, nesting records and sequences up to two
/// levels deep.
pub fn logical_type_strategy() -> impl Strategy<Value = LogicalType> {
    scalar_type_strategy().prop_recursive(2, 12, 4, |inner| {
        prop_oneof![
            inner.clone().prop_map(LogicalType::sequence),
            prop::collection::btree_map(field_name_strategy(), (inner, any::<bool>()), 1..4).prop_map(
                |fields| {
                    let fields = fields
                        .into_iter()
                        .map(|(name, (ty, nullable))| {
                            let field = FieldDescriptor::new(name, ty);
                            if nullable {
                                field.nullable()
                            } else {
                                field
                            }
                        })
                        .collect();
                    LogicalType::nested(Shape::new("Generated", fields))
                }
            ),
        ]
    })
}

/// Strategy for text, including non-ASCII characters.
pub fn text_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-zA-Z0-9 _\\-éü漢]{0,24}").expect("Invalid regex")
}

/// Strategy for timestamps within the range every backend can represent.
pub fn timestamp_strategy() -> impl Strategy<Value = Timestamp> {
    (-62_000_000_000_000_i64..250_000_000_000_000_i64).prop_map(Timestamp::from_millis)
}

/// Strategy for a non-null value of type `ty`.
pub fn value_strategy(ty: &LogicalType) -> BoxedStrategy<Value> {
    match ty {
        LogicalType::Integer => any::<i64>().prop_map(Value::Integer).boxed(),
        LogicalType::Float => prop_oneof![prop::num::f64::NORMAL, Just(0.0)]
            .prop_map(Value::Float)
            .boxed(),
        LogicalType::Text => text_strategy().prop_map(Value::Text).boxed(),
        LogicalType::Boolean => any::<bool>().prop_map(Value::Boolean).boxed(),
        LogicalType::Timestamp => timestamp_strategy().prop_map(Value::Timestamp).boxed(),
        LogicalType::Binary => prop::collection::vec(any::<u8>(), 0..32)
            .prop_map(|bytes| Value::Binary(Bytes::from(bytes)))
            .boxed(),
        LogicalType::Identifier => any::<[u8; 16]>()
            .prop_map(|bytes| Value::Identifier(Uuid::from_bytes(bytes)))
            .boxed(),
        LogicalType::Sequence(element) => prop::collection::vec(value_strategy(element), 0..4)
            .prop_map(Value::Sequence)
            .boxed(),
        LogicalType::Nested(shape) => record_strategy(shape.fields().to_vec())
            .prop_map(Value::Record)
            .boxed(),
    }
}

/// Strategy for a value of `field`, null included when it is nullable.
pub fn field_value_strategy(field: &FieldDescriptor) -> BoxedStrategy<Value> {
    let value = value_strategy(field.logical_type());
    if field.is_nullable() {
        prop_oneof![1 => Just(Value::Null), 3 => value].boxed()
    } else {
        value
    }
}

/// Strategy for records matching `fields`.
pub fn record_strategy(fields: Vec<FieldDescriptor>) -> BoxedStrategy<Record> {
    let names: Vec<String> = fields.iter().map(|f| f.name().to_string()).collect();
    let values: Vec<BoxedStrategy<Value>> = fields.iter().map(field_value_strategy).collect();
    values
        .prop_map(move |values| {
            names
                .iter()
                .cloned()
                .zip(values)
                .fold(Record::new(), |record, (name, value)| record.with(name, value))
        })
        .boxed()
}

/// Strategy for a logical type paired with one of its values.
pub fn typed_value_strategy() -> impl Strategy<Value = (LogicalType, Value)> {
    logical_type_strategy().prop_flat_map(|ty| {
        let values = value_strategy(&ty);
        (Just(ty), values)
    })
}

/// Strategy for a user with id in `ids`.
pub fn user_strategy(ids: std::ops::Range<i64>) -> impl Strategy<Value = User> {
    (ids, "[a-e]{1,3}", 0_i64..100, any::<bool>())
        .prop_map(|(id, name, age, active)| User::new(id, name, age, active))
}

/// Strategy for up to `max` users with distinct ids.
pub fn users_strategy(max: usize) -> impl Strategy<Value = Vec<User>> {
    prop::collection::btree_map(0_i64..1_000, user_strategy(0..1), 0..max).prop_map(|users| {
        users
            .into_iter()
            .map(|(id, user)| User { id, ..user })
            .collect()
    })
}

fn compare_op_strategy() -> impl Strategy<Value = CompareOp> {
    prop_oneof![
        Just(CompareOp::Eq),
        Just(CompareOp::Ne),
        Just(CompareOp::Gt),
        Just(CompareOp::Gte),
        Just(CompareOp::Lt),
        Just(CompareOp::Lte),
    ]
}

fn user_leaf_strategy() -> impl Strategy<Value = Filter> {
    prop_oneof![
        (compare_op_strategy(), 0_i64..100).prop_map(|(op, v)| Filter::Compare {
            field: "age".into(),
            op,
            value: Value::Integer(v),
        }),
        (compare_op_strategy(), 0_i64..1_000).prop_map(|(op, v)| Filter::Compare {
            field: "id".into(),
            op,
            value: Value::Integer(v),
        }),
        (compare_op_strategy(), "[a-e]{0,3}").prop_map(|(op, v)| Filter::Compare {
            field: "name".into(),
            op,
            value: Value::Text(v),
        }),
        any::<bool>().prop_map(|v| Filter::Compare {
            field: "active".into(),
            op: CompareOp::Eq,
            value: Value::Boolean(v),
        }),
        prop::collection::vec(0_i64..100, 0..4).prop_map(|values| Filter::In {
            field: "age".into(),
            values: values.into_iter().map(Value::Integer).collect(),
        }),
        Just(Filter::IsNotNull { field: "name".into() }),
    ]
}

/// Strategy for filters over [`User`] fields, combining leaves with
/// `and`, `or` and `not`.
pub fn user_filter_strategy() -> impl Strategy<Value = Filter> {
    user_leaf_strategy().prop_recursive(3, 16, 3, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..3).prop_map(Filter::And),
            prop::collection::vec(inner.clone(), 0..3).prop_map(Filter::Or),
            inner.prop_map(|f| Filter::Not(Box::new(f))),
        ]
    })
}

/// Strategy for filters that may name fields [`User`] does not declare.
pub fn loose_filter_strategy() -> impl Strategy<Value = Filter> {
    let leaf = (
        prop_oneof![
            Just("id".to_string()),
            Just("age".to_string()),
            Just("name".to_string()),
            field_name_strategy(),
        ],
        compare_op_strategy(),
        0_i64..100,
    )
        .prop_map(|(field, op, v)| Filter::Compare {
            field,
            op,
            value: Value::Integer(v),
        });
    leaf.prop_recursive(2, 8, 3, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..3).prop_map(Filter::And),
            prop::collection::vec(inner, 0..3).prop_map(Filter::Or),
        ]
    })
}

fn user_field(user: &User, field: &str) -> Value {
    match field {
        "id" => Value::Integer(user.id),
        "name" => Value::Text(user.name.clone()),
        "age" => Value::Integer(user.age),
        "active" => Value::Boolean(user.active),
        _ => Value::Null,
    }
}

fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Integer(a), Value::Integer(b)) => Some(a.cmp(b)),
        (Value::Text(a), Value::Text(b)) => Some(a.cmp(b)),
        (Value::Boolean(a), Value::Boolean(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

/// Evaluates `filter` against `user` in memory, as the reference the
/// backends are checked against.
pub fn user_matches(filter: &Filter, user: &User) -> bool {
    match filter {
        Filter::Compare { field, op, value } => {
            let Some(ordering) = compare(&user_field(user, field), value) else {
                return false;
            };
            match op {
                CompareOp::Eq => ordering.is_eq(),
                CompareOp::Ne => ordering.is_ne(),
                CompareOp::Gt => ordering.is_gt(),
                CompareOp::Gte => ordering.is_ge(),
                CompareOp::Lt => ordering.is_lt(),
                CompareOp::Lte => ordering.is_le(),
            }
        }
        Filter::In { field, values } => values.contains(&user_field(user, field)),
        Filter::IsNull { field } => user_field(user, field).is_null(),
        Filter::IsNotNull { field } => !user_field(user, field).is_null(),
        Filter::And(children) => children.iter().all(|f| user_matches(f, user)),
        Filter::Or(children) => children.iter().any(|f| user_matches(f, user)),
        Filter::Not(child) => !user_matches(child, user),
    }
}
