//! End-to-end behaviour, run against every reference backend.

use omnidm_codec::{Timestamp, Value};
use omnidm_core::query::{and, eq, gt, in_list, lt, ne, not, or, Query, Update};
use omnidm_core::{CallOptions, OdmError, SaveMode, SaveOutcome};
use omnidm_testkit::prelude::*;
use std::time::Duration;

#[test]
fn saved_entity_is_found_by_key() {
    with_each_backend(|backend, registry| {
        let users = registry.session::<User>(backend);
        users.save(User::new(1, "a", 20, true)).unwrap();
        assert_eq!(
            users.find_by_id(1).unwrap(),
            Some(User::new(1, "a", 20, true)),
            "{backend}"
        );
    });
}

#[test]
fn second_save_updates_instead_of_duplicating() {
    with_each_backend(|backend, registry| {
        let users = registry.session::<User>(backend);
        users.save(User::new(1, "a", 20, true)).unwrap();
        users.save(User::new(1, "b", 20, true)).unwrap();
        assert_eq!(users.find_by_id(1).unwrap().map(|u| u.name), Some("b".into()));
        assert_eq!(users.count(Query::all()).unwrap(), 1, "{backend}");
    });
}

#[test]
fn conjunction_selects_exactly_the_matching_record() {
    with_each_backend(|backend, registry| {
        let users = registry.session::<User>(backend);
        users
            .insert_many(&[
                User::new(1, "x", 25, true),
                User::new(2, "y", 40, true),
                User::new(3, "z", 40, false),
            ])
            .unwrap();
        let found: Vec<User> = users
            .find(and([gt("age", 30), eq("active", true)]))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(found, vec![User::new(2, "y", 40, true)], "{backend}");
    });
}

#[test]
fn delete_by_predicate_reports_count() {
    with_each_backend(|backend, registry| {
        let users = registry.session::<User>(backend);
        scenarios::seeded_users(&users, 5);
        assert_eq!(users.delete(in_list("id", [2_i64, 4])).unwrap(), 2, "{backend}");
        let remaining: Vec<i64> = users
            .find(Query::all().sort_asc("id"))
            .unwrap()
            .map(|u| u.unwrap().id)
            .collect();
        assert_eq!(remaining, vec![1, 3, 5], "{backend}");
    });
}

#[test]
fn unconvertible_value_leaves_nothing_behind() {
    with_each_backend(|backend, registry| {
        let readings = registry.session::<Reading>(backend);
        let err = readings
            .save(Reading {
                id: 1,
                value: Value::Text("forty".into()),
            })
            .unwrap_err();
        assert!(matches!(err, OdmError::ValueConversion { ref field, .. } if field == "value"), "{backend}: {err}");
        assert_eq!(readings.count(Query::all()).unwrap(), 0);

        let err = readings
            .insert_many(&[
                Reading { id: 2, value: Value::Integer(4) },
                Reading { id: 3, value: Value::Boolean(true) },
            ])
            .unwrap_err();
        assert!(matches!(err, OdmError::ValueConversion { .. }), "{backend}");
        assert_eq!(readings.count(Query::all()).unwrap(), 0, "{backend}");
    });
}

#[test]
fn empty_result_is_an_exhausted_cursor() {
    with_each_backend(|backend, registry| {
        let users = registry.session::<User>(backend);
        let mut cursor = users.find(gt("age", 1_000)).unwrap();
        assert!(cursor.next().is_none(), "{backend}");
        assert!(cursor.next().is_none());
        assert_eq!(users.find_one(Query::all()).unwrap(), None);
        assert!(!users.exists(Query::all()).unwrap());
    });
}

#[test]
fn unchanged_resave_keeps_one_record() {
    with_each_backend(|backend, registry| {
        let users = registry.session::<User>(backend);
        let user = User::new(7, "same", 33, false);
        users.save(user.clone()).unwrap();
        users.save(user.clone()).unwrap();
        let (_, outcome) = users.save_with_mode(user, SaveMode::Partial).unwrap();
        assert_eq!(outcome, SaveOutcome::Unchanged, "{backend}");
        assert_eq!(users.count(Query::all()).unwrap(), 1);
    });
}

#[test]
fn sort_and_pagination_agree_across_backends() {
    with_each_backend(|backend, registry| {
        let users = registry.session::<User>(backend);
        scenarios::seeded_users(&users, 9);
        let page = |query: Query| -> Vec<i64> {
            users.find(query).unwrap().map(|u| u.unwrap().id).collect()
        };

        assert_eq!(page(Query::all().sort_desc("age").limit(3)), vec![9, 8, 7], "{backend}");
        assert_eq!(page(Query::all().sort_asc("active").offset(1).limit(2)), vec![6, 9], "{backend}");
        assert_eq!(page(Query::all().after(6)), vec![7, 8, 9], "{backend}");
        assert_eq!(page(Query::all().limit(2).after(3)), vec![4, 5], "{backend}");
    });
}

#[test]
fn negation_and_disjunction() {
    with_each_backend(|backend, registry| {
        let users = registry.session::<User>(backend);
        scenarios::seeded_users(&users, 6);
        let ids = |query: Query| -> Vec<i64> {
            users.find(query.sort_asc("id")).unwrap().map(|u| u.unwrap().id).collect()
        };
        assert_eq!(ids(Query::matching(or([eq("id", 1), gt("age", 40)]))), vec![1, 6], "{backend}");
        assert_eq!(ids(Query::matching(not(lt("age", 35)))), vec![4, 5, 6], "{backend}");
        assert_eq!(ids(Query::matching(ne("active", true))), vec![3, 6], "{backend}");
        assert_eq!(ids(Query::matching(or([]))), Vec::<i64>::new(), "{backend}");
        assert_eq!(ids(Query::matching(in_list("id", Vec::<i64>::new()))), Vec::<i64>::new());
    });
}

#[test]
fn bulk_update_sets_and_increments() {
    with_each_backend(|backend, registry| {
        let users = registry.session::<User>(backend);
        scenarios::seeded_users(&users, 4);
        let matched = users
            .update_many(eq("active", true), &Update::new().inc("age", 1).set("name", "bumped"))
            .unwrap();
        assert_eq!(matched, 3, "{backend}");
        assert_eq!(users.find_by_id(2).unwrap(), Some(User::new(2, "bumped", 26, true)));
        assert_eq!(users.find_by_id(3).unwrap(), Some(User::new(3, "user3", 30, false)));
    });
}

#[test]
fn push_appends_to_sequences() {
    with_each_backend(|backend, registry| {
        let profiles = registry.session::<Profile>(backend);
        let profile = scenarios::profile(5);
        profiles.save(profile.clone()).unwrap();

        let moved = Address {
            street: "2 Oak Ave".into(),
            city: "Ogdenville".into(),
            zip: None,
        };
        let update = Update::new()
            .push("tags", "c")
            .push("previous", moved.to_record());
        assert!(profiles.update_by_id(profile.handle, &update).unwrap(), "{backend}");

        let stored = profiles.find_by_id(profile.handle).unwrap().unwrap();
        assert_eq!(stored.tags, ["a", "b", "c"], "{backend}");
        assert_eq!(stored.previous.last(), Some(&moved), "{backend}");
        assert_eq!(stored.previous.len(), 2, "{backend}");

        let err = profiles.update_by_id(profile.handle, &Update::new().push("score", 1.0)).unwrap_err();
        assert!(matches!(err, OdmError::InvalidQuery { .. }), "{backend}");
    });
}

#[test]
fn single_entity_writes_touch_one_match() {
    with_each_backend(|backend, registry| {
        let users = registry.session::<User>(backend);
        scenarios::seeded_users(&users, 5);
        assert!(users.update_one(eq("active", true), &Update::new().set("name", "one")).unwrap());
        assert_eq!(users.count(eq("name", "one")).unwrap(), 1, "{backend}");

        assert!(users.delete_one(eq("active", false)).unwrap(), "{backend}");
        assert_eq!(users.count(Query::all()).unwrap(), 4, "{backend}");
        assert!(!users.delete_one(gt("age", 1000)).unwrap(), "{backend}");
        assert!(!users.update_by_id(99, &Update::new().inc("age", 1)).unwrap(), "{backend}");
    });
}

#[test]
fn projection_returns_only_selected_fields() {
    with_each_backend(|backend, registry| {
        let users = registry.session::<User>(backend);
        scenarios::seeded_users(&users, 2);
        let records: Vec<_> = users
            .project(Query::all().select(["name"]).sort_asc("id"))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(records.len(), 2, "{backend}");
        assert_eq!(records[0].len(), 1);
        assert_eq!(records[0].get("name"), Some(&Value::Text("user1".into())));
    });
}

#[test]
fn invalid_queries_list_every_problem() {
    with_each_backend(|backend, registry| {
        let users = registry.session::<User>(backend);
        let err = users
            .find(and([eq("missing", 1), gt("age", "old"), eq("name", Value::Null)]))
            .unwrap_err();
        match err {
            OdmError::InvalidQuery { problems } => assert_eq!(problems.len(), 3, "{backend}"),
            other => panic!("{backend}: unexpected {other:?}"),
        }
    });
}

#[test]
fn nested_entities_round_trip() {
    with_each_backend(|backend, registry| {
        let profiles = registry.session::<Profile>(backend);
        let mut profile = scenarios::profile(3);
        profile.avatar = None;
        profile.previous.clear();
        profiles.save(profile.clone()).unwrap();
        profiles.save(scenarios::profile(4)).unwrap();
        assert_eq!(profiles.find_by_id(profile.handle).unwrap(), Some(profile.clone()), "{backend}");
        let recent = profiles
            .find(gt("joined", Timestamp::from_millis(1_700_000_000_003)))
            .unwrap()
            .count();
        assert_eq!(recent, 1, "{backend}");
    });
}

#[test]
fn nested_paths_are_document_only() {
    with_each_backend(|backend, registry| {
        let profiles = registry.session::<Profile>(backend);
        profiles.save(scenarios::profile(1)).unwrap();
        let result = profiles.count(eq("address.city", "Springfield"));
        if backend == DOCUMENT {
            assert_eq!(result.unwrap(), 1);
        } else {
            assert!(matches!(result, Err(OdmError::InvalidQuery { .. })));
        }
    });
}

#[test]
fn inserting_a_taken_key_is_a_constraint_violation() {
    with_each_backend(|backend, registry| {
        let users = registry.session::<User>(backend);
        users.insert(&User::new(1, "a", 1, true)).unwrap();
        let err = users.insert(&User::new(1, "b", 2, true)).unwrap_err();
        assert!(
            matches!(err, OdmError::ConstraintViolation { backend: ref name, .. } if name == backend),
            "{err}"
        );
    });
}

#[test]
fn transient_document_failures_are_retried() {
    let registry = TestRegistry::memory();
    let users = registry.session::<User>(DOCUMENT);
    registry.store().fail_next(2);
    users.save(User::new(1, "a", 1, true)).unwrap();
    registry.store().fail_next(5);
    let err = users.find_by_id(1).unwrap_err();
    assert!(matches!(err, OdmError::BackendExecution { .. }), "{err}");
}

#[test]
fn deadline_expiry_is_a_timeout() {
    let registry = TestRegistry::memory();
    let users = registry.session::<User>(DOCUMENT);
    registry.store().set_latency(Duration::from_millis(100));
    let err = users
        .count_with(Query::all(), &CallOptions::timeout(Duration::from_millis(10)))
        .unwrap_err();
    assert!(err.is_timeout(), "{err}");
}

#[test]
fn shutdown_closes_every_backend() {
    let registry = TestRegistry::memory();
    let docs = registry.session::<User>(DOCUMENT);
    let sql = registry.session::<User>(RELATIONAL);
    registry.shutdown();
    assert!(matches!(docs.count(Query::all()), Err(OdmError::RegistryClosed)));
    assert!(matches!(sql.count(Query::all()), Err(OdmError::RegistryClosed)));
}
