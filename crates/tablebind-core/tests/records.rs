//! End-to-end CRUD tests against the in-memory table service.
//!
//! Tables are provisioned from the record schema through `create_table`, so
//! these tests also check that translated tables accept the payloads the
//! record mapper produces.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tablebind_core::field::{DeclaredType, FieldDescriptor, ResolvedField};
use tablebind_core::record::DynamicRecord;
use tablebind_core::schema::RecordSchema;
use tablebind_core::service::memory::{InMemoryTableService, ServiceCall};
use tablebind_core::service::{
    ListQuery, RemoteField, RemoteRecord, RemoteTableSchema, SortDirection, TableService,
};
use tablebind_core::sync::create_table;
use tablebind_core::translate::TableDefinition;
use tablebind_core::table::{Model, Table};
use tablebind_core::Error;

// ─── Fixtures ───────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct User {
    name: String,
    email: Option<String>,
    role: Option<String>,
    is_active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    age: Option<i64>,
}

impl Model for User {
    fn schema() -> tablebind_core::Result<RecordSchema> {
        RecordSchema::new(
            "Users",
            vec![
                FieldDescriptor::new("name", DeclaredType::Text)
                    .with_remote_name("Name")
                    .required(),
                FieldDescriptor::new("email", DeclaredType::Text),
                FieldDescriptor::new(
                    "role",
                    DeclaredType::Enumeration(vec!["admin".into(), "member".into()]),
                ),
                FieldDescriptor::new("is_active", DeclaredType::Boolean),
                FieldDescriptor::new("age", DeclaredType::Integer).with_default(json!(18)),
            ],
        )
    }
}

fn user(name: &str, role: &str, is_active: bool) -> User {
    User {
        name: name.to_string(),
        email: Some(format!("{}@example.com", name.to_lowercase())),
        role: Some(role.to_string()),
        is_active,
        age: None,
    }
}

async fn users_table() -> (Arc<InMemoryTableService>, Table<User>) {
    let svc = Arc::new(InMemoryTableService::new());
    create_table(svc.as_ref(), &User::schema().unwrap())
        .await
        .unwrap();
    svc.clear_calls();
    let table = Table::<User>::new(svc.clone()).unwrap();
    (svc, table)
}

// ─── Create / get ───────────────────────────────────────────────────

#[tokio::test]
async fn test_create_then_get_round_trip() {
    let (_svc, users) = users_table().await;

    let created = users
        .create(User {
            name: "Alice".into(),
            email: Some("a@example.com".into()),
            role: None,
            is_active: true,
            age: None,
        })
        .await
        .unwrap();
    let id = created.id.clone().unwrap();
    assert!(created.created_time.is_some());

    let fetched = users.get(&id).await.unwrap();
    assert_eq!(fetched.id.as_deref(), Some(id.as_str()));
    assert_eq!(fetched.created_time, created.created_time);
    assert_eq!(fetched.fields.name, "Alice");
    assert_eq!(fetched.fields.email.as_deref(), Some("a@example.com"));
}

#[tokio::test]
async fn test_defaults_applied_on_create() {
    let (svc, users) = users_table().await;
    let created = users.create(user("Bob", "member", false)).await.unwrap();
    assert_eq!(created.fields.age, Some(18));

    let stored = svc.records("Users");
    assert_eq!(stored[0]["fields"]["age"], 18);
    assert_eq!(stored[0]["fields"]["Name"], "Bob");
}

#[tokio::test]
async fn test_validation_happens_before_any_remote_call() {
    let (svc, users) = users_table().await;
    let err = users.create(user("Eve", "owner", true)).await.unwrap_err();
    assert!(matches!(err, Error::Validation { ref field, .. } if field == "role"));
    assert!(svc.calls().is_empty());
}

#[tokio::test]
async fn test_get_missing_record_is_not_found() {
    let (_svc, users) = users_table().await;
    let err = users.get("recDOESNOTEXIST").await.unwrap_err();
    assert!(matches!(err, Error::RecordNotFound { .. }));
}

// ─── Listing / find_by ──────────────────────────────────────────────

#[tokio::test]
async fn test_find_by_is_independent_of_argument_order() {
    let (svc, users) = users_table().await;
    users
        .bulk_create(vec![
            user("Ann", "admin", true),
            user("Ben", "admin", false),
            user("Cat", "member", true),
        ])
        .await
        .unwrap()
        .into_result()
        .unwrap();
    svc.clear_calls();

    let a = users
        .find_by(&[("is_active", json!(true)), ("role", json!("admin"))])
        .await
        .unwrap();
    let b = users
        .find_by(&[("role", json!("admin")), ("is_active", json!(true))])
        .await
        .unwrap();
    assert_eq!(a.records.len(), 1);
    assert_eq!(a.records[0].fields.name, "Ann");
    assert_eq!(a, b);

    let filters: Vec<Option<String>> = svc
        .calls()
        .into_iter()
        .filter_map(|c| match c {
            ServiceCall::ListRecords { filter, .. } => Some(filter),
            _ => None,
        })
        .collect();
    assert_eq!(filters.len(), 2);
    assert_eq!(filters[0], filters[1]);
    assert_eq!(
        filters[0].as_deref(),
        Some("AND({is_active} = TRUE(), {role} = 'admin')")
    );
}

#[tokio::test]
async fn test_find_by_matches_unchecked_boxes() {
    let (_svc, users) = users_table().await;
    users.create(user("Ben", "admin", false)).await.unwrap();
    let inactive = users.find_by(&[("is_active", json!(false))]).await.unwrap();
    assert_eq!(inactive.records.len(), 1);
    assert!(!inactive.records[0].fields.is_active);
}

#[tokio::test]
async fn test_empty_result_is_not_an_error() {
    let (_svc, users) = users_table().await;
    let listing = users.find_by(&[("name", json!("Nobody"))]).await.unwrap();
    assert!(listing.records.is_empty());
    assert!(users.first(&[("name", json!("Nobody"))]).await.unwrap().is_none());
}

#[tokio::test]
async fn test_first_asks_for_a_single_record() {
    let (svc, users) = users_table().await;
    users
        .bulk_create(vec![user("Ann", "admin", true), user("Ben", "admin", true)])
        .await
        .unwrap();
    svc.clear_calls();

    let found = users.first(&[("role", json!("admin"))]).await.unwrap();
    assert!(found.is_some());

    let calls = svc.calls();
    assert_eq!(calls.len(), 1);
    match &calls[0] {
        ServiceCall::ListRecords {
            filter,
            max_records,
            ..
        } => {
            assert_eq!(filter.as_deref(), Some("{role} = 'admin'"));
            assert_eq!(*max_records, Some(1));
        }
        other => panic!("expected a record listing, got {other:?}"),
    }
}

#[tokio::test]
async fn test_all_skips_and_reports_malformed_records() {
    let (svc, users) = users_table().await;
    users.create(user("Ann", "admin", true)).await.unwrap();
    svc.insert_raw_record(
        "Users",
        json!({"id": "recBAD", "createdTime": "2024-01-01T00:00:00.000Z", "fields": {"Name": 7}}),
    )
    .unwrap();
    svc.insert_raw_record("Users", json!({"id": "recNOTIME", "fields": {}}))
        .unwrap();

    let listing = users.all(&ListQuery::new()).await.unwrap();
    assert_eq!(listing.records.len(), 1);
    let bad: Vec<Option<&str>> = listing.malformed.iter().map(|m| m.id.as_deref()).collect();
    assert_eq!(bad, vec![Some("recBAD"), Some("recNOTIME")]);
    assert!(listing.strict().is_err());
}

#[tokio::test]
async fn test_query_parameters_pass_through() {
    let (_svc, users) = users_table().await;
    users
        .bulk_create(vec![
            user("Ann", "admin", true),
            user("Cat", "member", true),
            user("Ben", "admin", true),
        ])
        .await
        .unwrap();

    let query = ListQuery::new()
        .sort_by("Name", SortDirection::Asc)
        .max_records(2);
    let names: Vec<String> = users
        .all(&query)
        .await
        .unwrap()
        .records
        .into_iter()
        .map(|r| r.fields.name)
        .collect();
    assert_eq!(names, vec!["Ann", "Ben"]);
}

// ─── Bulk create ────────────────────────────────────────────────────

#[tokio::test]
async fn test_bulk_create_empty_makes_no_call() {
    let (svc, users) = users_table().await;
    let result = users.bulk_create(Vec::new()).await.unwrap();
    assert!(result.created.is_empty());
    assert!(result.failure.is_none());
    assert!(svc.calls().is_empty());
}

#[tokio::test]
async fn test_bulk_create_chunks_and_preserves_order() {
    let (svc, users) = users_table().await;
    let items: Vec<User> = (0..23).map(|i| user(&format!("U{i:02}"), "member", true)).collect();
    let created = users.bulk_create(items).await.unwrap().into_result().unwrap();

    let names: Vec<String> = created.iter().map(|r| r.fields.name.clone()).collect();
    let expected: Vec<String> = (0..23).map(|i| format!("U{i:02}")).collect();
    assert_eq!(names, expected);

    let batch_sizes: Vec<usize> = svc
        .calls()
        .into_iter()
        .filter_map(|c| match c {
            ServiceCall::CreateRecords { count, .. } => Some(count),
            _ => None,
        })
        .collect();
    assert_eq!(batch_sizes, vec![10, 10, 3]);
}

#[tokio::test]
async fn test_bulk_create_reports_partial_failure() {
    let (svc, users) = users_table().await;
    svc.fail_record_batches_after(
        1,
        Error::Api {
            status: 429,
            kind: Some("RATE_LIMIT_REACHED".into()),
            message: "slow down".into(),
        },
    );
    let items: Vec<User> = (0..15).map(|i| user(&format!("U{i}"), "member", true)).collect();
    let result = users.bulk_create(items).await.unwrap();

    assert_eq!(result.created.len(), 10);
    let failure = result.failure.clone().unwrap();
    assert_eq!(failure.not_created, (10..15).collect::<Vec<_>>());

    match result.into_result().unwrap_err() {
        Error::PartialBatch {
            created,
            not_created,
            ..
        } => {
            assert_eq!(created, 10);
            assert_eq!(not_created.len(), 5);
        }
        other => panic!("expected partial batch error, got {other}"),
    }
}

/// Delegates to the in-memory service but drops the last record of every
/// create response.
struct ShortBatches {
    inner: InMemoryTableService,
}

#[async_trait]
impl TableService for ShortBatches {
    async fn list_tables(&self) -> tablebind_core::Result<Vec<RemoteTableSchema>> {
        self.inner.list_tables().await
    }

    async fn create_table(
        &self,
        definition: &TableDefinition,
    ) -> tablebind_core::Result<RemoteTableSchema> {
        self.inner.create_table(definition).await
    }

    async fn create_field(
        &self,
        table_id: &str,
        field: &ResolvedField,
    ) -> tablebind_core::Result<RemoteField> {
        self.inner.create_field(table_id, field).await
    }

    async fn update_field(
        &self,
        table_id: &str,
        field_id: &str,
        field: &ResolvedField,
    ) -> tablebind_core::Result<RemoteField> {
        self.inner.update_field(table_id, field_id, field).await
    }

    async fn create_records(
        &self,
        table: &str,
        records: Vec<Map<String, Value>>,
    ) -> tablebind_core::Result<Vec<RemoteRecord>> {
        let mut created = self.inner.create_records(table, records).await?;
        created.pop();
        Ok(created)
    }

    async fn get_record(&self, table: &str, id: &str) -> tablebind_core::Result<RemoteRecord> {
        self.inner.get_record(table, id).await
    }

    async fn list_records(
        &self,
        table: &str,
        query: &ListQuery,
    ) -> tablebind_core::Result<Vec<Value>> {
        self.inner.list_records(table, query).await
    }

    async fn update_record(
        &self,
        table: &str,
        id: &str,
        fields: Map<String, Value>,
    ) -> tablebind_core::Result<RemoteRecord> {
        self.inner.update_record(table, id, fields).await
    }

    async fn delete_record(&self, table: &str, id: &str) -> tablebind_core::Result<String> {
        self.inner.delete_record(table, id).await
    }
}

async fn short_batch_users() -> Table<User> {
    let svc = ShortBatches {
        inner: InMemoryTableService::new(),
    };
    create_table(&svc, &User::schema().unwrap()).await.unwrap();
    Table::<User>::new(Arc::new(svc)).unwrap()
}

#[tokio::test]
async fn test_bulk_create_flags_short_batch_response() {
    let users = short_batch_users().await;
    let items = vec![
        user("Ann", "admin", true),
        user("Ben", "member", true),
        user("Cat", "member", true),
    ];
    let result = users.bulk_create(items).await.unwrap();

    let names: Vec<&str> = result.created.iter().map(|r| r.fields.name.as_str()).collect();
    assert_eq!(names, vec!["Ann", "Ben"]);
    let failure = result.failure.clone().unwrap();
    assert_eq!(failure.not_created, vec![2]);
    assert!(matches!(failure.error, Error::Decode { .. }));
    assert!(matches!(
        result.into_result(),
        Err(Error::PartialBatch { created: 2, .. })
    ));
}

#[tokio::test]
async fn test_create_without_returned_record_is_an_error() {
    let users = short_batch_users().await;
    let err = users.create(user("Ann", "admin", true)).await.unwrap_err();
    assert!(matches!(err, Error::Decode { .. }), "got {err}");
}

#[tokio::test]
async fn test_bulk_create_validates_everything_first() {
    let (svc, users) = users_table().await;
    let mut items: Vec<User> = (0..12).map(|i| user(&format!("U{i}"), "member", true)).collect();
    items[11].role = Some("root".into());
    let err = users.bulk_create(items).await.unwrap_err();
    assert!(err.to_string().contains("item 11"));
    assert!(svc.calls().is_empty());
}

// ─── Save / delete ──────────────────────────────────────────────────

#[tokio::test]
async fn test_save_clears_removed_values() {
    let (svc, users) = users_table().await;
    let mut rec = users.create(user("Ann", "admin", true)).await.unwrap();
    rec.fields.email = None;
    let saved = users.save(&rec).await.unwrap();
    assert_eq!(saved.fields.email, None);
    assert!(svc.records("Users")[0]["fields"].get("email").is_none());
}

#[tokio::test]
async fn test_delete_twice_surfaces_not_found() {
    let (_svc, users) = users_table().await;
    let rec = users.create(user("Ann", "admin", true)).await.unwrap();
    let id = users.delete(&rec).await.unwrap();
    assert_eq!(Some(id), rec.id);
    assert!(users.delete(&rec).await.unwrap_err().is_not_found());
}

// ─── Dynamic records ────────────────────────────────────────────────

#[tokio::test]
async fn test_dynamic_records_ignore_unmodelled_remote_columns() {
    let svc = Arc::new(InMemoryTableService::new());
    let schema = RecordSchema::new(
        "Notes",
        vec![
            FieldDescriptor::new("title", DeclaredType::Text).required(),
            FieldDescriptor::new("pinned", DeclaredType::Boolean),
        ],
    )
    .unwrap();
    create_table(svc.as_ref(), &schema).await.unwrap();
    svc.insert_raw_record(
        "Notes",
        json!({
            "id": "rec1",
            "createdTime": "2024-01-01T00:00:00.000Z",
            "fields": {"title": "hello", "Rollup": 3}
        }),
    )
    .unwrap();

    let notes: Table<DynamicRecord> = Table::with_schema(svc.clone(), schema);
    let rec = notes.get("rec1").await.unwrap();
    assert_eq!(Value::Object(rec.fields), json!({"title": "hello", "pinned": false}));

    let mut extra = DynamicRecord::new();
    extra.insert("title".into(), json!("x"));
    extra.insert("colour".into(), json!("red"));
    assert!(matches!(
        notes.create(extra).await,
        Err(Error::Validation { .. })
    ));
}
