//! Read-only search and listing over persisted records.
//!
//! Substring search matches the lowercased query against the derived
//! `full_text_lower` field; no ranking, just containment. Reads never
//! mutate and may run concurrently with an ingestion on a different
//! cursor window.

use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use crate::error::StoreError;
use crate::models::{Body, SearchHit};
use crate::store::parse_time;

/// Filters for [`search`]. All optional; an empty filter returns every row.
#[derive(Debug, Clone, Default)]
pub struct SearchFilter {
    /// Case-insensitive substring to look for in the search field.
    pub text: Option<String>,
    /// Restrict to one owning body.
    pub body_id: Option<i64>,
    /// Restrict to meetings in one calendar year.
    pub year: Option<i32>,
}

const HIT_COLUMNS: &str = "i.id AS item_id, i.event_id, e.body_id, e.meeting_time, \
     i.agenda_number, i.title, i.action_text, i.matter_id, i.matter_status, \
     i.matter_type, e.agenda_url, e.insite_url";

/// Agenda items joined with their meetings, filtered and ordered by
/// meeting time then item id.
pub async fn search(pool: &SqlitePool, filter: &SearchFilter) -> Result<Vec<SearchHit>, StoreError> {
    let mut sql = format!(
        "SELECT {HIT_COLUMNS} FROM items i JOIN events e ON i.event_id = e.id WHERE 1 = 1"
    );
    if filter.text.is_some() {
        sql.push_str(" AND instr(i.full_text_lower, ?) > 0");
    }
    if filter.body_id.is_some() {
        sql.push_str(" AND e.body_id = ?");
    }
    if filter.year.is_some() {
        sql.push_str(" AND strftime('%Y', e.meeting_time) = ?");
    }
    sql.push_str(" ORDER BY e.meeting_time, i.id");

    let mut query = sqlx::query(&sql);
    if let Some(text) = &filter.text {
        query = query.bind(text.to_lowercase());
    }
    if let Some(body_id) = filter.body_id {
        query = query.bind(body_id);
    }
    if let Some(year) = filter.year {
        query = query.bind(format!("{year:04}"));
    }

    let rows = query
        .fetch_all(pool)
        .await
        .map_err(StoreError::classify)?;

    Ok(rows.iter().map(hit_from_row).collect())
}

/// All agenda items for one body in chronological order. Feeds
/// chronological reports and the calendar renderer.
pub async fn list_by_body(pool: &SqlitePool, body_id: i64) -> Result<Vec<SearchHit>, StoreError> {
    search(
        pool,
        &SearchFilter {
            body_id: Some(body_id),
            ..SearchFilter::default()
        },
    )
    .await
}

/// The stored owning bodies, ascending by id.
pub async fn list_bodies(pool: &SqlitePool) -> Result<Vec<Body>, StoreError> {
    let rows = sqlx::query("SELECT id, name FROM bodies ORDER BY id")
        .fetch_all(pool)
        .await
        .map_err(StoreError::classify)?;

    Ok(rows
        .iter()
        .map(|row| Body {
            id: row.get("id"),
            name: row.get("name"),
        })
        .collect())
}

fn hit_from_row(row: &SqliteRow) -> SearchHit {
    SearchHit {
        item_id: row.get("item_id"),
        event_id: row.get("event_id"),
        body_id: row.get("body_id"),
        meeting_time: parse_time(row, "meeting_time"),
        agenda_number: row.get("agenda_number"),
        title: row.get("title"),
        action_text: row.get("action_text"),
        matter_id: row.get("matter_id"),
        matter_status: row.get("matter_status"),
        matter_type: row.get("matter_type"),
        agenda_url: row.get("agenda_url"),
        insite_url: row.get("insite_url"),
    }
}
