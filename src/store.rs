//! Relational persistence: schema, idempotent upserts, cursor recovery.
//!
//! One SQLite database per namespace at `<data_dir>/<namespace>.db`.
//! Re-inserting a record with an id already present fully overwrites the
//! prior row, so ingestion can re-run or resume from any point without
//! existence checks in application code.

use std::str::FromStr;

use chrono::NaiveDateTime;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;

use crate::config::StoreConfig;
use crate::error::StoreError;
use crate::models::{AgendaItem, Body, Event};

/// Minutes-status code marking a meeting's minutes as final. Meetings below
/// this status are revisited by refetch-nonfinal runs.
pub const FINAL_MINUTES_STATUS: i64 = 10;

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Open (creating if needed) the database file for one namespace.
    pub async fn open(config: &StoreConfig, namespace: &str) -> anyhow::Result<Self> {
        let db_path = config.store_path(namespace);

        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path.display()))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        Ok(Self { pool })
    }

    /// Wrap an existing pool. Used by tests and by callers that already
    /// hold a connection for read-only queries.
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(self) {
        self.pool.close().await;
    }

    /// Drop and recreate all three tables. Destructive; only the explicit
    /// reset command calls this.
    pub async fn recreate(&self) -> Result<(), StoreError> {
        for table in ["items", "events", "bodies"] {
            sqlx::query(&format!("DROP TABLE IF EXISTS {table}"))
                .execute(&self.pool)
                .await
                .map_err(StoreError::classify)?;
        }
        self.ensure_schema().await
    }

    /// Create any missing tables. Idempotent; the orchestrator calls this
    /// once when a read first reports the schema missing.
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS events (
                id INTEGER PRIMARY KEY,
                body_id INTEGER NOT NULL,
                meeting_time TEXT,
                agenda_url TEXT NOT NULL DEFAULT '',
                minutes_url TEXT,
                minutes_status INTEGER,
                insite_url TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(StoreError::classify)?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS items (
                id INTEGER PRIMARY KEY,
                event_id INTEGER NOT NULL,
                agenda_number TEXT NOT NULL,
                action_text TEXT,
                title TEXT,
                full_text_lower TEXT NOT NULL,
                matter_id INTEGER,
                matter_attachments TEXT,
                matter_status TEXT,
                matter_type TEXT,
                matter_text TEXT,
                FOREIGN KEY (event_id) REFERENCES events(id)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(StoreError::classify)?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS bodies (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(StoreError::classify)?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_items_event_id ON items(event_id)")
            .execute(&self.pool)
            .await
            .map_err(StoreError::classify)?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_events_body_id ON events(body_id)")
            .execute(&self.pool)
            .await
            .map_err(StoreError::classify)?;

        Ok(())
    }

    /// The resumption cursor: the highest event id persisted so far.
    pub async fn max_event_id(&self) -> Result<Option<i64>, StoreError> {
        sqlx::query_scalar("SELECT max(id) FROM events")
            .fetch_one(&self.pool)
            .await
            .map_err(StoreError::classify)
    }

    /// Every event whose minutes are not yet final, ascending. The
    /// alternate cursor source for refetch-nonfinal runs.
    pub async fn nonfinal_event_ids(&self) -> Result<Vec<i64>, StoreError> {
        sqlx::query_scalar(
            "SELECT id FROM events WHERE minutes_status IS NULL OR minutes_status != ? ORDER BY id",
        )
        .bind(FINAL_MINUTES_STATUS)
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::classify)
    }

    pub async fn upsert_event(&self, event: &Event) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO events (id, body_id, meeting_time, agenda_url, minutes_url, minutes_status, insite_url)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                body_id = excluded.body_id,
                meeting_time = excluded.meeting_time,
                agenda_url = excluded.agenda_url,
                minutes_url = excluded.minutes_url,
                minutes_status = excluded.minutes_status,
                insite_url = excluded.insite_url
            "#,
        )
        .bind(event.id)
        .bind(event.body_id)
        .bind(format_time(event.meeting_time))
        .bind(&event.agenda_url)
        .bind(&event.minutes_url)
        .bind(event.minutes_status)
        .bind(&event.insite_url)
        .execute(&self.pool)
        .await
        .map_err(StoreError::classify)?;

        Ok(())
    }

    /// Write one meeting's items transactionally. An empty slice is a
    /// silent no-op, not an error.
    pub async fn upsert_items(
        &self,
        event_id: i64,
        items: &[AgendaItem],
    ) -> Result<(), StoreError> {
        if items.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await.map_err(StoreError::classify)?;
        for item in items {
            sqlx::query(
                r#"
                INSERT INTO items (id, event_id, agenda_number, action_text, title,
                                   full_text_lower, matter_id, matter_attachments,
                                   matter_status, matter_type, matter_text)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(id) DO UPDATE SET
                    event_id = excluded.event_id,
                    agenda_number = excluded.agenda_number,
                    action_text = excluded.action_text,
                    title = excluded.title,
                    full_text_lower = excluded.full_text_lower,
                    matter_id = excluded.matter_id,
                    matter_attachments = excluded.matter_attachments,
                    matter_status = excluded.matter_status,
                    matter_type = excluded.matter_type,
                    matter_text = excluded.matter_text
                "#,
            )
            .bind(item.id)
            .bind(event_id)
            .bind(&item.agenda_number)
            .bind(&item.action_text)
            .bind(&item.title)
            .bind(&item.full_text_lower)
            .bind(item.matter_id)
            .bind(&item.matter_attachments)
            .bind(&item.matter_status)
            .bind(&item.matter_type)
            .bind(&item.matter_text)
            .execute(&mut *tx)
            .await
            .map_err(StoreError::classify)?;
        }
        tx.commit().await.map_err(StoreError::classify)?;

        Ok(())
    }

    /// Bulk replace of the owning bodies.
    pub async fn replace_bodies(&self, bodies: &[Body]) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(StoreError::classify)?;
        for body in bodies {
            sqlx::query(
                r#"
                INSERT INTO bodies (id, name) VALUES (?, ?)
                ON CONFLICT(id) DO UPDATE SET name = excluded.name
                "#,
            )
            .bind(body.id)
            .bind(&body.name)
            .execute(&mut *tx)
            .await
            .map_err(StoreError::classify)?;
        }
        tx.commit().await.map_err(StoreError::classify)?;

        Ok(())
    }
}

pub(crate) fn format_time(time: Option<NaiveDateTime>) -> Option<String> {
    time.map(|t| t.format(TIME_FORMAT).to_string())
}

pub(crate) fn parse_time(row: &sqlx::sqlite::SqliteRow, column: &str) -> Option<NaiveDateTime> {
    let raw: Option<String> = row.get(column);
    raw.and_then(|s| NaiveDateTime::parse_from_str(&s, TIME_FORMAT).ok())
}
