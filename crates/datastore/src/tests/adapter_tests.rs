//! End-to-end adapter behavior against the in-memory pool
//!
//! Every test checks that the pool ends up with no outstanding connections.

use std::sync::Arc;

use serde_json::json;

use super::mock::{record, MockPool, MockResponse};
use crate::adapter::{Adapter, Meta};
use crate::backends::{DatabaseValue, SqlDialect};
use crate::config::DatastoreConfig;
use crate::error::{CompileError, DatastoreError, DriverError, PlanError, TransactionStage};
use crate::executor::classifier::UNIQUE_VIOLATION;
use crate::join::Association;
use crate::model::{AttributeDefinition, AttributeType, ModelDefinition};
use crate::query::{Criteria, OrderDirection, WhereClause};

fn models() -> Vec<ModelDefinition> {
    vec![
        ModelDefinition::new("user", "users")
            .with_attribute(
                AttributeDefinition::new("id", AttributeType::Number)
                    .with_primary_key()
                    .with_auto_increment(),
            )
            .with_attribute(AttributeDefinition::new("name", AttributeType::String).with_required())
            .with_attribute(AttributeDefinition::new("age", AttributeType::Number)),
        ModelDefinition::new("pet", "pets")
            .with_attribute(
                AttributeDefinition::new("id", AttributeType::Number)
                    .with_primary_key()
                    .with_auto_increment(),
            )
            .with_attribute(AttributeDefinition::new("name", AttributeType::String))
            .with_attribute(AttributeDefinition::new("owner", AttributeType::Ref)),
        ModelDefinition::new("account", "accounts")
            .with_attribute(AttributeDefinition::new("id", AttributeType::Uuid).with_primary_key())
            .with_attribute(AttributeDefinition::new("score", AttributeType::Number)),
        ModelDefinition::new("device", "devices")
            .with_attribute(
                AttributeDefinition::new("id", AttributeType::Number)
                    .with_primary_key()
                    .with_auto_increment(),
            )
            .with_attribute(AttributeDefinition::new("account", AttributeType::Ref)),
    ]
}

const ACCOUNT_ID: &str = "550e8400-e29b-41d4-a716-446655440000";

fn account_id() -> DatabaseValue {
    DatabaseValue::Uuid(uuid::Uuid::parse_str(ACCOUNT_ID).unwrap())
}

async fn setup() -> (Adapter, MockPool) {
    let mock = MockPool::new();
    let registry = Arc::new(crate::registry::DatastoreRegistry::new());
    registry
        .register_pool(
            "main",
            DatastoreConfig::from_url("postgres://localhost/app"),
            &models(),
            mock.clone().into_pool(),
            SqlDialect::PostgreSQL,
        )
        .await
        .unwrap();
    (Adapter::new(registry), mock)
}

fn by_name(name: &str) -> Criteria {
    Criteria::new().with_where(WhereClause::eq("name", name))
}

#[tokio::test]
async fn test_create_returns_stored_record() {
    let (adapter, mock) = setup().await;
    mock.on(
        "INSERT",
        MockResponse::Rows(vec![record(json!({ "id": 1, "name": "ada", "age": null }))]),
    );

    let created = adapter
        .create("main", "users", &record(json!({ "name": "ada" })), Meta::new().fetch())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(created["id"], json!(1));
    let statements = mock.statements();
    assert_eq!(statements.len(), 1);
    assert_eq!(
        statements[0],
        r#"INSERT INTO "public"."users" ("name") VALUES ($1) RETURNING *"#
    );
    assert_eq!(mock.acquired(), 1);
    assert_eq!(mock.outstanding(), 0);
}

#[tokio::test]
async fn test_create_without_fetch_returns_nothing() {
    let (adapter, mock) = setup().await;

    let created = adapter
        .create("main", "users", &record(json!({ "name": "ada" })), Meta::new())
        .await
        .unwrap();

    assert!(created.is_none());
    assert!(!mock.statements()[0].contains("RETURNING"));
    assert_eq!(mock.outstanding(), 0);
}

#[tokio::test]
async fn test_create_with_explicit_key_fixes_sequence() {
    let (adapter, mock) = setup().await;

    adapter
        .create("main", "users", &record(json!({ "id": 10, "name": "ada" })), Meta::new())
        .await
        .unwrap();

    let statements = mock.statements();
    assert_eq!(statements.len(), 2);
    assert!(statements[0].starts_with("INSERT"));
    assert!(statements[1].contains("setval(pg_get_serial_sequence($1, $2)"));
    assert_eq!(
        mock.bindings()[1],
        vec![
            DatabaseValue::String(r#""public"."users""#.to_string()),
            DatabaseValue::String("id".to_string()),
        ]
    );
    assert_eq!(mock.acquired(), 1);
    assert_eq!(mock.outstanding(), 0);
}

#[tokio::test]
async fn test_create_each_inserts_one_statement() {
    let (adapter, mock) = setup().await;
    mock.on(
        "INSERT",
        MockResponse::Rows(vec![
            record(json!({ "id": 1, "name": "ada", "age": 36 })),
            record(json!({ "id": 2, "name": "bob", "age": null })),
        ]),
    );

    let created = adapter
        .create_each(
            "main",
            "users",
            &[record(json!({ "name": "ada", "age": 36 })), record(json!({ "name": "bob" }))],
            Meta::new().fetch(),
        )
        .await
        .unwrap()
        .unwrap();

    assert_eq!(created.len(), 2);
    assert_eq!(
        mock.statements()[0],
        r#"INSERT INTO "public"."users" ("age", "name") VALUES ($1, $2), (DEFAULT, $3) RETURNING *"#
    );
    assert_eq!(mock.outstanding(), 0);
}

#[tokio::test]
async fn test_create_unique_violation_is_not_unique() {
    let (adapter, mock) = setup().await;
    mock.on(
        "INSERT",
        MockResponse::Fail(
            DriverError::rejected(
                Some(UNIQUE_VIOLATION.to_string()),
                "duplicate key value violates unique constraint",
            )
            .with_detail("Key (name)=(ada) already exists."),
        ),
    );

    let err = adapter
        .create("main", "users", &record(json!({ "name": "ada" })), Meta::new())
        .await
        .unwrap_err();

    match err {
        DatastoreError::NotUnique { table, columns, .. } => {
            assert_eq!(table, "users");
            assert_eq!(columns, vec!["name".to_string()]);
        }
        other => panic!("Expected NotUnique, got {:?}", other),
    }
    assert_eq!(mock.outstanding(), 0);
}

#[tokio::test]
async fn test_invalid_input_never_takes_a_connection() {
    let (adapter, mock) = setup().await;

    let err = adapter
        .create("main", "users", &record(json!({ "age": 3 })), Meta::new())
        .await
        .unwrap_err();
    assert!(matches!(err, DatastoreError::Validation(_)));

    let err = adapter.create_each("main", "users", &[], Meta::new()).await.unwrap_err();
    assert!(matches!(err, DatastoreError::Compile(CompileError::MissingValues(_))));

    let err = adapter
        .count("main", "users", &Criteria::new().with_limit(1), Meta::new())
        .await
        .unwrap_err();
    assert!(matches!(err, DatastoreError::Compile(CompileError::InvalidCriteria(_))));

    let err = adapter
        .update("main", "users", &by_name("ada"), &record(json!({})), Meta::new())
        .await
        .unwrap_err();
    assert!(matches!(err, DatastoreError::Compile(CompileError::MissingValues(_))));

    assert_eq!(mock.acquired(), 0);
    assert!(mock.statements().is_empty());
}

#[tokio::test]
async fn test_unknown_datastore_or_table() {
    let (adapter, mock) = setup().await;

    let err = adapter
        .find("other", "users", &Criteria::new(), &[], Meta::new())
        .await
        .unwrap_err();
    assert!(matches!(err, DatastoreError::InvalidDatastore(_)));

    let err = adapter
        .destroy("main", "accounts", &Criteria::new(), Meta::new())
        .await
        .unwrap_err();
    assert!(matches!(err, DatastoreError::InvalidDatastore(_)));

    let err = adapter
        .find(
            "main",
            "users",
            &Criteria::new(),
            &[Association::many("pets", "animals", "id", "owner")],
            Meta::new(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, DatastoreError::InvalidDatastore(_)));
    assert_eq!(mock.acquired(), 0);
}

#[tokio::test]
async fn test_find_populates_to_many() {
    let (adapter, mock) = setup().await;
    mock.on(
        r#"FROM "public"."users""#,
        MockResponse::Rows(vec![
            record(json!({ "id": 1, "name": "ada" })),
            record(json!({ "id": 2, "name": "bob" })),
        ]),
    );
    mock.on(
        r#"FROM "public"."pets""#,
        MockResponse::Rows(vec![
            record(json!({ "id": 10, "name": "rex", "owner": 1 })),
            record(json!({ "id": 11, "name": "tom", "owner": 1 })),
        ]),
    );

    let users = adapter
        .find(
            "main",
            "users",
            &Criteria::new(),
            &[Association::many("pets", "pets", "id", "owner")],
            Meta::new(),
        )
        .await
        .unwrap();

    assert_eq!(users.len(), 2);
    assert_eq!(users[0]["pets"].as_array().unwrap().len(), 2);
    assert_eq!(users[0]["pets"][1]["name"], json!("tom"));
    assert_eq!(users[1]["pets"], json!([]));

    let statements = mock.statements();
    assert_eq!(statements.len(), 2);
    assert_eq!(
        statements[1],
        r#"SELECT * FROM "public"."pets" WHERE "owner" IN ($1, $2)"#
    );
    assert_eq!(mock.acquired(), 1);
    assert_eq!(mock.outstanding(), 0);
}

#[tokio::test]
async fn test_find_bounded_children_use_union() {
    let (adapter, mock) = setup().await;
    mock.on(
        r#"FROM "public"."users""#,
        MockResponse::Rows(vec![
            record(json!({ "id": 1, "name": "ada" })),
            record(json!({ "id": 2, "name": "bob" })),
        ]),
    );
    mock.on(
        r#"FROM "public"."pets""#,
        MockResponse::Rows(vec![
            record(json!({ "id": 10, "name": "rex", "owner": 1 })),
            record(json!({ "id": 12, "name": "kit", "owner": 2 })),
        ]),
    );

    let newest = Criteria::new().with_sort("id", OrderDirection::Desc).with_limit(1);
    let users = adapter
        .find(
            "main",
            "users",
            &Criteria::new(),
            &[Association::many("pets", "pets", "id", "owner").with_criteria(newest)],
            Meta::new(),
        )
        .await
        .unwrap();

    let child_sql = &mock.statements()[1];
    assert_eq!(child_sql.matches("UNION ALL").count(), 1);
    assert_eq!(child_sql.matches("LIMIT 1").count(), 2);
    assert_eq!(users[0]["pets"][0]["id"], json!(10));
    assert_eq!(users[1]["pets"][0]["id"], json!(12));
    assert_eq!(mock.outstanding(), 0);
}

#[tokio::test]
async fn test_find_inlines_to_one() {
    let (adapter, mock) = setup().await;
    mock.on(
        "LEFT JOIN",
        MockResponse::Rows(vec![
            record(json!({
                "id": 10, "name": "rex", "owner": 1,
                "owner___id": 1, "owner___name": "ada", "owner___age": 36
            })),
            record(json!({
                "id": 11, "name": "stray", "owner": null,
                "owner___id": null, "owner___name": null, "owner___age": null
            })),
        ]),
    );

    let pets = adapter
        .find(
            "main",
            "pets",
            &Criteria::new(),
            &[Association::one("owner", "users", "owner", "id")],
            Meta::new(),
        )
        .await
        .unwrap();

    assert_eq!(mock.statements().len(), 1);
    assert_eq!(pets[0]["owner"], json!({ "id": 1, "name": "ada", "age": 36 }));
    assert_eq!(pets[1]["owner"], json!({}));
    assert!(pets[0].keys().all(|k| !k.contains("___")));
    assert_eq!(mock.outstanding(), 0);
}

#[tokio::test]
async fn test_find_without_parents_skips_children() {
    let (adapter, mock) = setup().await;

    let users = adapter
        .find(
            "main",
            "users",
            &by_name("nobody"),
            &[Association::many("pets", "pets", "id", "owner")],
            Meta::new(),
        )
        .await
        .unwrap();

    assert!(users.is_empty());
    assert_eq!(mock.statements().len(), 1);
    assert_eq!(mock.outstanding(), 0);
}

#[tokio::test]
async fn test_find_rejects_bad_alias() {
    let (adapter, mock) = setup().await;

    let err = adapter
        .find(
            "main",
            "users",
            &Criteria::new(),
            &[Association::many("my___pets", "pets", "id", "owner")],
            Meta::new(),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, DatastoreError::Plan(PlanError::InvalidAssociation { .. })));
    assert_eq!(mock.acquired(), 0);
}

#[tokio::test]
async fn test_find_transport_failure_releases_connection() {
    let (adapter, mock) = setup().await;
    mock.on("SELECT", MockResponse::Fail(DriverError::transport("connection reset by peer")));

    let err = adapter
        .find("main", "users", &Criteria::new(), &[], Meta::new())
        .await
        .unwrap_err();

    assert!(matches!(err, DatastoreError::BadConnection { source: Some(_), .. }));
    assert_eq!(mock.acquired(), 1);
    assert_eq!(mock.released(), 1);
}

#[tokio::test]
async fn test_find_child_failure_aborts_the_join() {
    let (adapter, mock) = setup().await;
    mock.on(
        r#"FROM "public"."users""#,
        MockResponse::Rows(vec![record(json!({ "id": 1, "name": "ada" }))]),
    );
    let denied =
        DriverError::rejected(Some("42501".to_string()), "permission denied for table pets");
    mock.on(r#"FROM "public"."pets""#, MockResponse::Fail(denied.clone()));

    let err = adapter
        .find(
            "main",
            "users",
            &Criteria::new(),
            &[Association::many("pets", "pets", "id", "owner")],
            Meta::new(),
        )
        .await
        .unwrap_err();

    match err {
        DatastoreError::Query(source) => assert_eq!(source, denied),
        other => panic!("expected the child query error, got {:?}", other),
    }
    assert_eq!(mock.statements().len(), 2);
    assert_eq!(mock.acquired(), 1);
    assert_eq!(mock.released(), 1);
    assert_eq!(mock.outstanding(), 0);
}

#[tokio::test]
async fn test_uuid_keys_bind_as_uuids() {
    let (adapter, mock) = setup().await;
    mock.on(
        r#"FROM "public"."accounts""#,
        MockResponse::Rows(vec![record(json!({ "id": ACCOUNT_ID, "score": 3 }))]),
    );
    mock.on(
        r#"FROM "public"."devices""#,
        MockResponse::Rows(vec![record(json!({ "id": 7, "account": ACCOUNT_ID }))]),
    );

    let accounts = adapter
        .find(
            "main",
            "accounts",
            &Criteria::new().with_where(WhereClause::eq("id", ACCOUNT_ID)),
            &[Association::many("devices", "devices", "id", "account")],
            Meta::new(),
        )
        .await
        .unwrap();

    assert_eq!(accounts[0]["devices"][0]["id"], json!(7));
    let bindings = mock.bindings();
    assert_eq!(bindings[0], vec![account_id()]);
    assert_eq!(bindings[1], vec![account_id()]);
    assert_eq!(mock.outstanding(), 0);
}

#[tokio::test]
async fn test_update_refetches_uuid_keys_as_uuids() {
    let (adapter, mock) = setup().await;
    mock.on(
        r#"SELECT "id" FROM "public"."accounts""#,
        MockResponse::Rows(vec![record(json!({ "id": ACCOUNT_ID }))]),
    );
    mock.on("UPDATE", MockResponse::Affected(1));
    mock.on(
        r#"SELECT * FROM "public"."accounts""#,
        MockResponse::Rows(vec![record(json!({ "id": ACCOUNT_ID, "score": null }))]),
    );

    let by_id = Criteria::new().with_where(WhereClause::eq("id", ACCOUNT_ID));
    let updated = adapter
        .update("main", "accounts", &by_id, &record(json!({ "score": null })), Meta::new())
        .await
        .unwrap();

    assert_eq!(updated[0]["score"], json!(null));
    let statements = mock.statements();
    assert_eq!(
        statements[2],
        r#"UPDATE "public"."accounts" SET "score" = NULL WHERE "id" = $1"#
    );
    assert_eq!(
        statements[3],
        r#"SELECT * FROM "public"."accounts" WHERE "id" IN ($1)"#
    );
    let bindings = mock.bindings();
    assert_eq!(bindings[2], vec![account_id()]);
    assert_eq!(bindings[3], vec![account_id()]);
    assert_eq!(mock.outstanding(), 0);
}

#[tokio::test]
async fn test_create_each_writes_nulls_inline() {
    let (adapter, mock) = setup().await;

    adapter
        .create_each(
            "main",
            "devices",
            &[
                record(json!({ "account": null })),
                record(json!({ "account": "abc" })),
            ],
            Meta::new(),
        )
        .await
        .unwrap();

    assert_eq!(
        mock.statements()[0],
        r#"INSERT INTO "public"."devices" ("account") VALUES (NULL), ($1)"#
    );
    assert_eq!(mock.bindings()[0], vec![DatabaseValue::from("abc")]);
    assert_eq!(mock.outstanding(), 0);
}

#[tokio::test]
async fn test_acquire_failure_is_bad_connection() {
    let (adapter, mock) = setup().await;
    mock.fail_next_acquire(DriverError::transport("too many connections"));

    let err = adapter
        .count("main", "users", &Criteria::new(), Meta::new())
        .await
        .unwrap_err();

    assert!(matches!(err, DatastoreError::BadConnection { .. }));
    assert!(mock.statements().is_empty());
    assert_eq!(mock.outstanding(), 0);
}

#[tokio::test]
async fn test_update_runs_find_update_find_in_transaction() {
    let (adapter, mock) = setup().await;
    mock.on(
        r#"SELECT "id" FROM"#,
        MockResponse::Rows(vec![record(json!({ "id": 1 })), record(json!({ "id": 2 }))]),
    );
    mock.on("UPDATE", MockResponse::Affected(2));
    mock.on(
        "SELECT * FROM",
        MockResponse::Rows(vec![
            record(json!({ "id": 1, "name": "ada", "age": 40 })),
            record(json!({ "id": 2, "name": "ada", "age": 40 })),
        ]),
    );

    let updated = adapter
        .update("main", "users", &by_name("ada"), &record(json!({ "age": 40 })), Meta::new())
        .await
        .unwrap();

    assert_eq!(updated.len(), 2);
    assert_eq!(
        mock.statements(),
        vec![
            "BEGIN",
            r#"SELECT "id" FROM "public"."users" WHERE "name" = $1"#,
            r#"UPDATE "public"."users" SET "age" = $1 WHERE "name" = $2"#,
            r#"SELECT * FROM "public"."users" WHERE "id" IN ($1, $2)"#,
            "COMMIT",
        ]
    );
    assert_eq!(mock.bindings()[3], vec![DatabaseValue::Int64(1), DatabaseValue::Int64(2)]);
    assert_eq!(mock.acquired(), 1);
    assert_eq!(mock.outstanding(), 0);
}

#[tokio::test]
async fn test_update_refetches_by_new_primary_key() {
    let (adapter, mock) = setup().await;
    mock.on(r#"SELECT "id" FROM"#, MockResponse::Rows(vec![record(json!({ "id": 1 }))]));

    adapter
        .update("main", "users", &by_name("ada"), &record(json!({ "id": 7 })), Meta::new())
        .await
        .unwrap();

    assert_eq!(mock.bindings()[3], vec![DatabaseValue::Int64(7)]);
    assert_eq!(mock.outstanding(), 0);
}

#[tokio::test]
async fn test_update_failure_rolls_back() {
    let (adapter, mock) = setup().await;
    mock.on(
        "UPDATE",
        MockResponse::Fail(
            DriverError::rejected(Some(UNIQUE_VIOLATION.to_string()), "duplicate key")
                .with_detail("Key (name)=(bob) already exists."),
        ),
    );

    let err = adapter
        .update("main", "users", &by_name("ada"), &record(json!({ "name": "bob" })), Meta::new())
        .await
        .unwrap_err();

    assert!(err.is_not_unique());
    let statements = mock.statements();
    assert_eq!(statements.len(), 4);
    assert_eq!(statements[0], "BEGIN");
    assert!(statements[2].starts_with("UPDATE"));
    assert_eq!(statements[3], "ROLLBACK");
    assert_eq!(mock.outstanding(), 0);
}

#[tokio::test]
async fn test_update_commit_failure_is_reported() {
    let (adapter, mock) = setup().await;
    mock.on(
        "COMMIT",
        MockResponse::Fail(DriverError::rejected(
            Some("40001".to_string()),
            "could not serialize access",
        )),
    );

    let err = adapter
        .update("main", "users", &by_name("ada"), &record(json!({ "age": 1 })), Meta::new())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        DatastoreError::Transaction {
            stage: TransactionStage::Commit,
            ..
        }
    ));
    assert_eq!(mock.statements().last().map(String::as_str), Some("ROLLBACK"));
    assert_eq!(mock.outstanding(), 0);
}

#[tokio::test]
async fn test_update_begin_failure_releases_connection() {
    let (adapter, mock) = setup().await;
    mock.on("BEGIN", MockResponse::Fail(DriverError::transport("connection reset")));

    let err = adapter
        .update("main", "users", &by_name("ada"), &record(json!({ "age": 1 })), Meta::new())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        DatastoreError::Transaction {
            stage: TransactionStage::Begin,
            ..
        }
    ));
    assert_eq!(mock.statements(), vec!["BEGIN"]);
    assert_eq!(mock.outstanding(), 0);
}

#[tokio::test]
async fn test_leased_connection_is_left_with_caller() {
    let (adapter, mock) = setup().await;
    let mut external = mock.connect();

    adapter
        .update(
            "main",
            "users",
            &by_name("ada"),
            &record(json!({ "age": 1 })),
            Meta::new().leased(external.as_mut()),
        )
        .await
        .unwrap();
    let eve = record(json!({ "name": "eve" }));
    adapter
        .create("main", "users", &eve, Meta::new().leased(external.as_mut()))
        .await
        .unwrap();

    assert_eq!(mock.statements().len(), 6);
    assert_eq!(mock.acquired(), 0);
    assert_eq!(mock.released(), 0);
}

#[tokio::test]
async fn test_destroy_reports_count_and_records() {
    let (adapter, mock) = setup().await;
    mock.on("DELETE", MockResponse::Affected(3));

    let outcome = adapter
        .destroy("main", "users", &by_name("ada"), Meta::new())
        .await
        .unwrap();
    assert_eq!(outcome.count, 3);
    assert!(outcome.records.is_none());

    mock.on(
        "DELETE",
        MockResponse::Rows(vec![
            record(json!({ "id": 1, "name": "bob" })),
            record(json!({ "id": 2, "name": "bob" })),
        ]),
    );
    let outcome = adapter
        .destroy("main", "users", &by_name("bob"), Meta::new().fetch())
        .await
        .unwrap();
    assert_eq!(outcome.count, 2);
    assert_eq!(outcome.records.map(|r| r.len()), Some(2));
    assert_eq!(
        mock.statements()[1],
        r#"DELETE FROM "public"."users" WHERE "name" = $1 RETURNING *"#
    );
    assert_eq!(mock.outstanding(), 0);
}

#[tokio::test]
async fn test_aggregates() {
    let (adapter, mock) = setup().await;
    mock.on("COUNT(*)", MockResponse::Rows(vec![record(json!({ "count": 5 }))]));
    mock.on("SUM(", MockResponse::Rows(vec![record(json!({ "sum": 12.5 }))]));
    mock.on("AVG(", MockResponse::Rows(vec![record(json!({ "avg": null }))]));

    assert_eq!(adapter.count("main", "users", &Criteria::new(), Meta::new()).await.unwrap(), 5);
    let sum = adapter
        .sum("main", "users", &by_name("ada"), "age", Meta::new())
        .await
        .unwrap();
    assert!((sum - 12.5).abs() < f64::EPSILON);
    let avg = adapter
        .avg("main", "users", &by_name("nobody"), "age", Meta::new())
        .await
        .unwrap();
    assert!(avg.is_none());

    assert_eq!(
        mock.statements()[0],
        r#"SELECT COUNT(*) AS "count" FROM "public"."users""#
    );
    assert_eq!(mock.acquired(), 3);
    assert_eq!(mock.outstanding(), 0);
}

#[tokio::test]
async fn test_aggregate_without_rows_is_reshape_error() {
    let (adapter, mock) = setup().await;

    let err = adapter
        .count("main", "users", &Criteria::new(), Meta::new())
        .await
        .unwrap_err();

    assert!(matches!(err, DatastoreError::Reshape(_)));
    assert_eq!(mock.outstanding(), 0);
}
