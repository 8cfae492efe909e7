//! Statement sequences issued by the graph operations, recorded with the
//! scripted driver.

use relgraph_core::{FieldType, Rel, Value};
use relgraph_graph::{batch_create, BatchCreateSpec, CreateSpec, EdgeSpec, FieldSpec};
use relgraph_sql::mock::Event;
use relgraph_sql::{Context, Dialect, ExecResult, MockDriver, Rows};

fn user(name: &str, pet: i64) -> CreateSpec {
    let mut spec = CreateSpec::new("users", Some(FieldSpec::new("id", FieldType::Int)));
    spec.set_field("name", FieldType::String, name);
    spec.add_edge(
        EdgeSpec::new(Rel::M2M, "user_friends", &["user_id", "friend_id"])
            .bidi(true)
            .targets(vec![Value::from(1)]),
    );
    spec.add_edge(
        EdgeSpec::new(Rel::M2M, "group_users", &["group_id", "user_id"])
            .inverse(true)
            .targets(vec![Value::from(7)]),
    );
    spec.add_edge(EdgeSpec::new(Rel::O2M, "pets", &["owner_id"]).targets(vec![Value::from(pet)]));
    spec
}

fn ints(xs: &[i64]) -> Vec<Value> {
    xs.iter().copied().map(Value::from).collect()
}

#[test]
fn batch_create_sequence_mysql() {
    let mut drv = MockDriver::new(Dialect::MySQL);
    drv.expect_exec(ExecResult {
        rows_affected: 2,
        last_insert_id: Some(10),
    })
    .expect_affected(2)
    .expect_affected(4)
    .expect_affected(1)
    .expect_affected(1);

    let spec = BatchCreateSpec::new(vec![user("a8m", 100), user("nati", 200)]);
    let ids = batch_create(&Context::background(), &mut drv, &spec).unwrap();
    assert_eq!(ids, vec![Some(Value::from(10)), Some(Value::from(11))]);

    let exec = |query: &str, args: &[i64]| Event::Exec {
        query: query.to_string(),
        args: ints(args),
    };
    assert_eq!(
        drv.events(),
        &[
            Event::Begin,
            Event::Exec {
                query: "INSERT INTO `users` (`name`) VALUES (?), (?)".into(),
                args: vec![Value::from("a8m"), Value::from("nati")],
            },
            exec(
                "INSERT INTO `group_users` (`group_id`, `user_id`) VALUES (?, ?), (?, ?) ON DUPLICATE KEY UPDATE `group_id` = `group_id`",
                &[7, 10, 7, 11],
            ),
            exec(
                "INSERT INTO `user_friends` (`user_id`, `friend_id`) VALUES (?, ?), (?, ?), (?, ?), (?, ?) ON DUPLICATE KEY UPDATE `user_id` = `user_id`",
                &[10, 1, 1, 10, 11, 1, 1, 11],
            ),
            exec(
                "UPDATE `pets` SET `owner_id` = ? WHERE `id` = ? AND `owner_id` IS NULL",
                &[10, 100],
            ),
            exec(
                "UPDATE `pets` SET `owner_id` = ? WHERE `id` = ? AND `owner_id` IS NULL",
                &[11, 200],
            ),
            Event::Commit,
        ]
    );
    assert!(drv.is_drained());
}

#[test]
fn batch_create_sequence_postgres() {
    let mut drv = MockDriver::new(Dialect::Postgres);
    drv.expect_query(Rows::new(&["id"], vec![ints(&[3]), ints(&[4])]));
    drv.expect_affected(2)
        .expect_affected(4)
        .expect_affected(1)
        .expect_affected(1);

    let spec = BatchCreateSpec::new(vec![user("a8m", 100), user("nati", 200)]);
    let ids = batch_create(&Context::background(), &mut drv, &spec).unwrap();
    assert_eq!(ids, vec![Some(Value::from(3)), Some(Value::from(4))]);
    insta::assert_debug_snapshot!(drv.statements(), @r###"
    [
        "INSERT INTO \"users\" (\"name\") VALUES ($1), ($2) RETURNING \"id\"",
        "INSERT INTO \"group_users\" (\"group_id\", \"user_id\") VALUES ($1, $2), ($3, $4) ON CONFLICT DO NOTHING",
        "INSERT INTO \"user_friends\" (\"user_id\", \"friend_id\") VALUES ($1, $2), ($3, $4), ($5, $6), ($7, $8) ON CONFLICT DO NOTHING",
        "UPDATE \"pets\" SET \"owner_id\" = $1 WHERE \"id\" = $2 AND \"owner_id\" IS NULL",
        "UPDATE \"pets\" SET \"owner_id\" = $1 WHERE \"id\" = $2 AND \"owner_id\" IS NULL",
    ]
    "###);
}

#[test]
fn batch_create_rolls_back_on_linked_pet() {
    let mut drv = MockDriver::new(Dialect::MySQL);
    drv.expect_exec(ExecResult {
        rows_affected: 2,
        last_insert_id: Some(10),
    })
    .expect_affected(2)
    .expect_affected(4)
    .expect_affected(1)
    .expect_affected(0);

    let spec = BatchCreateSpec::new(vec![user("a8m", 100), user("nati", 200)]);
    let err = batch_create(&Context::background(), &mut drv, &spec).unwrap_err();
    assert!(relgraph_graph::is_constraint_error(&err));
    assert_eq!(
        err.to_string(),
        "one of [200] is already connected to a different owner_id"
    );
    assert_eq!(drv.events().last(), Some(&Event::Rollback));
    assert!(!drv.events().contains(&Event::Commit));
}
