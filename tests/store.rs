//! Store-level behavior: schema self-healing, replace-on-conflict
//! idempotence, and cursor recovery.

use agendex::config::StoreConfig;
use agendex::error::StoreError;
use agendex::models::{AgendaItem, Body, Event};
use agendex::store::Store;
use chrono::NaiveDate;
use sqlx::Row;
use tempfile::TempDir;

async fn open_store(tmp: &TempDir) -> Store {
    let config = StoreConfig {
        data_dir: tmp.path().to_path_buf(),
    };
    Store::open(&config, "testville").await.unwrap()
}

fn event(id: i64, body_id: i64, minutes_status: Option<i64>) -> Event {
    Event {
        id,
        body_id,
        meeting_time: NaiveDate::from_ymd_opt(2023, 5, 9)
            .unwrap()
            .and_hms_opt(18, 30, 0),
        agenda_url: format!("https://example.test/agenda/{id}.pdf"),
        minutes_url: None,
        minutes_status,
        insite_url: None,
    }
}

fn item(id: i64, event_id: i64, label: &str, title: &str) -> AgendaItem {
    AgendaItem {
        id,
        event_id,
        agenda_number: label.to_string(),
        action_text: None,
        title: Some(title.to_string()),
        full_text_lower: format!("{label}\n{title}").to_lowercase(),
        matter_id: None,
        matter_attachments: "{}".to_string(),
        matter_status: None,
        matter_type: None,
        matter_text: None,
    }
}

#[tokio::test]
async fn read_before_bootstrap_reports_schema_missing() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;

    let err = store.max_event_id().await.unwrap_err();
    assert!(matches!(err, StoreError::SchemaMissing(_)), "got {err:?}");
}

#[tokio::test]
async fn ensure_schema_is_idempotent() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;

    store.ensure_schema().await.unwrap();
    store.ensure_schema().await.unwrap();
    assert_eq!(store.max_event_id().await.unwrap(), None);
}

#[tokio::test]
async fn upsert_event_replaces_prior_row() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;
    store.ensure_schema().await.unwrap();

    store.upsert_event(&event(1, 10, None)).await.unwrap();
    store.upsert_event(&event(1, 20, Some(10))).await.unwrap();

    let row = sqlx::query("SELECT body_id, minutes_status FROM events WHERE id = 1")
        .fetch_one(store.pool())
        .await
        .unwrap();
    assert_eq!(row.get::<i64, _>("body_id"), 20);
    assert_eq!(row.get::<Option<i64>, _>("minutes_status"), Some(10));

    let count: i64 = sqlx::query_scalar("SELECT count(*) FROM events")
        .fetch_one(store.pool())
        .await
        .unwrap();
    assert_eq!(count, 1);
}

#[tokio::test]
async fn upsert_items_replaces_prior_rows() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;
    store.ensure_schema().await.unwrap();
    store.upsert_event(&event(1, 10, None)).await.unwrap();

    store
        .upsert_items(1, &[item(7, 1, "3.1", "first wording")])
        .await
        .unwrap();
    store
        .upsert_items(1, &[item(7, 1, "3.1", "amended wording")])
        .await
        .unwrap();

    let rows = sqlx::query("SELECT title FROM items WHERE event_id = 1")
        .fetch_all(store.pool())
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get::<String, _>("title"), "amended wording");
}

#[tokio::test]
async fn empty_item_write_is_a_silent_noop() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;

    // Works even before the schema exists: nothing is touched.
    store.upsert_items(1, &[]).await.unwrap();
}

#[tokio::test]
async fn max_event_id_never_decreases() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;
    store.ensure_schema().await.unwrap();

    store.upsert_event(&event(3, 10, None)).await.unwrap();
    store.upsert_event(&event(8, 10, None)).await.unwrap();
    assert_eq!(store.max_event_id().await.unwrap(), Some(8));

    // Re-ingesting an older event leaves the cursor alone.
    store.upsert_event(&event(3, 11, None)).await.unwrap();
    assert_eq!(store.max_event_id().await.unwrap(), Some(8));
}

#[tokio::test]
async fn nonfinal_ids_exclude_final_minutes() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;
    store.ensure_schema().await.unwrap();

    store.upsert_event(&event(1, 10, Some(10))).await.unwrap();
    store.upsert_event(&event(2, 10, Some(2))).await.unwrap();
    store.upsert_event(&event(3, 10, None)).await.unwrap();

    assert_eq!(store.nonfinal_event_ids().await.unwrap(), vec![2, 3]);
}

#[tokio::test]
async fn replace_bodies_overwrites_names() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;
    store.ensure_schema().await.unwrap();

    store
        .replace_bodies(&[Body {
            id: 138,
            name: "City Counsil".to_string(),
        }])
        .await
        .unwrap();
    store
        .replace_bodies(&[Body {
            id: 138,
            name: "City Council".to_string(),
        }])
        .await
        .unwrap();

    let bodies = agendex::query::list_bodies(store.pool()).await.unwrap();
    assert_eq!(bodies.len(), 1);
    assert_eq!(bodies[0].name, "City Council");
}

#[tokio::test]
async fn recreate_drops_all_data() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;
    store.ensure_schema().await.unwrap();
    store.upsert_event(&event(1, 10, None)).await.unwrap();
    store
        .upsert_items(1, &[item(7, 1, "3.1", "anything")])
        .await
        .unwrap();

    store.recreate().await.unwrap();

    assert_eq!(store.max_event_id().await.unwrap(), None);
    let count: i64 = sqlx::query_scalar("SELECT count(*) FROM items")
        .fetch_one(store.pool())
        .await
        .unwrap();
    assert_eq!(count, 0);
}

#[tokio::test]
async fn repeated_ingestion_yields_identical_state() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;
    store.ensure_schema().await.unwrap();

    for _ in 0..2 {
        store.upsert_event(&event(1, 10, None)).await.unwrap();
        store.upsert_event(&event(2, 11, Some(10))).await.unwrap();
        store
            .upsert_items(1, &[item(7, 1, "3.1", "a"), item(8, 1, "3.2", "b")])
            .await
            .unwrap();
    }

    let events: i64 = sqlx::query_scalar("SELECT count(*) FROM events")
        .fetch_one(store.pool())
        .await
        .unwrap();
    let items: i64 = sqlx::query_scalar("SELECT count(*) FROM items")
        .fetch_one(store.pool())
        .await
        .unwrap();
    assert_eq!((events, items), (2, 2));
}
