//! Integration tests for the entity-addressed data layer

use deskshell::data::{
    field_i64, DataApi, DataError, EntityRegistry, QueryOptions, Record, SqliteDataApi,
};
use deskshell::record;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

const REGISTRY: &str = r#"{
    "entities": [
        {
            "name": "TaskEntity",
            "fields": [
                {"name": "title", "type": "TEXT"},
                {"name": "status", "type": "TEXT", "default": "pending"},
                {"name": "priority", "type": "INTEGER", "default": 0},
                {"name": "estimate", "type": "REAL"}
            ],
            "operations": ["read", "write"]
        },
        {
            "name": "AuditEntity",
            "table_name": "audit_log",
            "fields": [{"name": "message", "type": "TEXT"}],
            "operations": ["read", "write"]
        },
        {
            "name": "EmptyEntity",
            "fields": [],
            "operations": ["read"]
        }
    ]
}"#;

async fn store() -> SqliteDataApi {
    let registry = Arc::new(EntityRegistry::from_descriptor_str(REGISTRY));
    SqliteDataApi::in_memory(registry).await.unwrap()
}

fn text<'a>(record: &'a Record, field: &str) -> &'a str {
    record.get(field).and_then(Value::as_str).unwrap()
}

#[tokio::test]
async fn test_create_then_get_round_trips() {
    let data = store().await;
    let id = data
        .create(
            "TaskEntity",
            record! { "title" => "Write docs", "priority" => 3, "estimate" => 1.5 },
        )
        .await
        .unwrap();

    let record = data.get("TaskEntity", id).await.unwrap().unwrap();
    assert_eq!(field_i64(&record, "id"), Some(id));
    assert_eq!(text(&record, "title"), "Write docs");
    assert_eq!(field_i64(&record, "priority"), Some(3));
    assert_eq!(record.get("estimate"), Some(&json!(1.5)));
    // Declared default
    assert_eq!(text(&record, "status"), "pending");
    assert!(!text(&record, "created_at").is_empty());
    assert!(!text(&record, "updated_at").is_empty());
}

#[tokio::test]
async fn test_update_changes_only_given_fields() {
    let data = store().await;
    let id = data
        .create("TaskEntity", record! { "title" => "Draft", "priority" => 1 })
        .await
        .unwrap();
    let before = data.get("TaskEntity", id).await.unwrap().unwrap();

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(data
        .update("TaskEntity", id, record! { "status" => "done" })
        .await
        .unwrap());

    let after = data.get("TaskEntity", id).await.unwrap().unwrap();
    assert_eq!(text(&after, "status"), "done");
    assert_eq!(text(&after, "title"), "Draft");
    assert_eq!(field_i64(&after, "priority"), Some(1));
    assert_eq!(text(&after, "created_at"), text(&before, "created_at"));
    assert!(text(&after, "updated_at") > text(&before, "updated_at"));
}

#[tokio::test]
async fn test_update_missing_record_returns_false() {
    let data = store().await;
    assert!(!data
        .update("TaskEntity", 42, record! { "title" => "ghost" })
        .await
        .unwrap());
}

#[tokio::test]
async fn test_delete() {
    let data = store().await;
    let id = data
        .create("TaskEntity", record! { "title" => "Temporary" })
        .await
        .unwrap();

    assert!(data.delete("TaskEntity", id).await.unwrap());
    assert!(data.get("TaskEntity", id).await.unwrap().is_none());
    assert!(!data.delete("TaskEntity", id).await.unwrap());
}

#[tokio::test]
async fn test_query_filters_order_and_paging() {
    let data = store().await;
    for (title, priority, status) in [
        ("a", 2, "pending"),
        ("b", 5, "done"),
        ("c", 1, "pending"),
        ("d", 4, "pending"),
    ] {
        data.create(
            "TaskEntity",
            record! { "title" => title, "priority" => priority, "status" => status },
        )
        .await
        .unwrap();
    }

    let pending = data
        .query(
            "TaskEntity",
            QueryOptions::new()
                .with_filter("status", "pending")
                .with_order_by("priority DESC"),
        )
        .await
        .unwrap();
    let titles: Vec<&str> = pending.iter().map(|r| text(r, "title")).collect();
    assert_eq!(titles, vec!["d", "a", "c"]);

    let page = data
        .query(
            "TaskEntity",
            QueryOptions::new()
                .with_order_by("priority")
                .with_limit(2)
                .with_offset(1),
        )
        .await
        .unwrap();
    let titles: Vec<&str> = page.iter().map(|r| text(r, "title")).collect();
    assert_eq!(titles, vec!["a", "d"]);

    let tail = data
        .query("TaskEntity", QueryOptions::new().with_order_by("priority").with_offset(3))
        .await
        .unwrap();
    assert_eq!(tail.len(), 1);
    assert_eq!(text(&tail[0], "title"), "b");
}

#[tokio::test]
async fn test_count() {
    let data = store().await;
    assert_eq!(data.count("TaskEntity", &Record::new()).await.unwrap(), 0);

    data.create("TaskEntity", record! { "title" => "one" }).await.unwrap();
    data.create("TaskEntity", record! { "title" => "two", "status" => "done" })
        .await
        .unwrap();

    assert_eq!(data.count("TaskEntity", &Record::new()).await.unwrap(), 2);
    assert_eq!(
        data.count("TaskEntity", &record! { "status" => "done" })
            .await
            .unwrap(),
        1
    );
}

#[tokio::test]
async fn test_create_with_no_fields_uses_defaults() {
    let data = store().await;
    let id = data.create("TaskEntity", Record::new()).await.unwrap();

    let record = data.get("TaskEntity", id).await.unwrap().unwrap();
    assert_eq!(text(&record, "title"), "");
    assert_eq!(field_i64(&record, "priority"), Some(0));
}

#[tokio::test]
async fn test_table_name_resolution() {
    let data = store().await;
    assert_eq!(data.table_for("TaskEntity").await.unwrap(), "tasks");
    assert_eq!(data.table_for("AuditEntity").await.unwrap(), "audit_log");
    assert_eq!(data.table_for("UserProfile").await.unwrap(), "user_profiles");

    data.create("AuditEntity", record! { "message" => "hello" })
        .await
        .unwrap();
    assert_eq!(data.count("AuditEntity", &Record::new()).await.unwrap(), 1);
}

#[tokio::test]
async fn test_unknown_entity_is_reported() {
    let data = store().await;

    let result = data.create("MissingEntity", record! { "x" => 1 }).await;
    assert!(matches!(result, Err(DataError::UnknownEntity(name)) if name == "MissingEntity"));

    let result = data.get("EmptyEntity", 1).await;
    assert!(matches!(result, Err(DataError::UnknownEntity(_))));
}

#[tokio::test]
async fn test_invalid_identifiers_are_rejected() {
    let data = store().await;

    let result = data
        .create("TaskEntity", record! { "title; DROP TABLE tasks" => "x" })
        .await;
    assert!(matches!(result, Err(DataError::InvalidIdentifier(_))));

    let result = data
        .query("TaskEntity", QueryOptions::new().with_order_by("priority; --"))
        .await;
    assert!(matches!(result, Err(DataError::InvalidIdentifier(_))));
}

#[tokio::test]
async fn test_file_database_persists_between_opens() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("nested").join("app.db");
    let registry = Arc::new(EntityRegistry::from_descriptor_str(REGISTRY));

    let id = {
        let data = SqliteDataApi::new(&db_path, registry.clone()).await.unwrap();
        assert_eq!(data.db_path(), Some(db_path.as_path()));
        data.create("TaskEntity", record! { "title" => "Persisted" })
            .await
            .unwrap()
    };

    let data = SqliteDataApi::new(&db_path, registry).await.unwrap();
    let record = data.get("TaskEntity", id).await.unwrap().unwrap();
    assert_eq!(text(&record, "title"), "Persisted");
}
