//! Core data types flowing through the ingestion and query pipeline.
//!
//! Raw types mirror the upstream Legistar payloads field-for-field and are
//! deliberately loose (everything optional): upstream schema drift and the
//! occasional malformed row are absorbed here instead of leaking into the
//! rest of the pipeline. The normalized types are what the store persists.

use chrono::NaiveDateTime;
use serde::Deserialize;

/// One meeting ("Event") as delivered by the upstream API.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawEvent {
    #[serde(rename = "EventId")]
    pub id: Option<i64>,
    #[serde(rename = "EventBodyId")]
    pub body_id: Option<i64>,
    #[serde(rename = "EventDate")]
    pub date: Option<String>,
    #[serde(rename = "EventTime")]
    pub time: Option<String>,
    #[serde(rename = "EventAgendaFile")]
    pub agenda_file: Option<String>,
    #[serde(rename = "EventMinutesFile")]
    pub minutes_file: Option<String>,
    #[serde(rename = "EventMinutesStatusId")]
    pub minutes_status: Option<i64>,
    #[serde(rename = "EventInSiteURL")]
    pub insite_url: Option<String>,
}

impl RawEvent {
    /// Whether this meeting declares an agenda document. Meetings without
    /// one have no agenda items worth fetching.
    pub fn has_agenda(&self) -> bool {
        self.agenda_file.as_deref().is_some_and(|f| !f.is_empty())
    }
}

/// One flat agenda row ("EventItem") as delivered by the upstream API.
///
/// Rows with an empty `agenda_number` are continuations of the previous
/// labeled row; rows whose label is a bare section number are headers.
/// Neither survives reconciliation as-is.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawItem {
    #[serde(rename = "EventItemId")]
    pub id: Option<i64>,
    #[serde(rename = "EventItemAgendaNumber")]
    pub agenda_number: Option<String>,
    #[serde(rename = "EventItemActionText")]
    pub action_text: Option<String>,
    #[serde(rename = "EventItemTitle")]
    pub title: Option<String>,
    #[serde(rename = "EventItemMatterId")]
    pub matter_id: Option<i64>,
    #[serde(rename = "EventItemMatterAttachments", default)]
    pub attachments: Vec<RawAttachment>,
    #[serde(rename = "EventItemMatterStatus")]
    pub matter_status: Option<String>,
    #[serde(rename = "EventItemMatterType")]
    pub matter_type: Option<String>,
}

/// One attachment link, expanded inline on the item payload.
#[derive(Debug, Clone, Deserialize)]
pub struct RawAttachment {
    #[serde(rename = "MatterAttachmentName")]
    pub name: Option<String>,
    #[serde(rename = "MatterAttachmentHyperlink")]
    pub hyperlink: Option<String>,
}

/// One owning body (city council, planning commission, ...).
#[derive(Debug, Clone, Deserialize)]
pub struct RawBody {
    #[serde(rename = "BodyId")]
    pub id: Option<i64>,
    #[serde(rename = "BodyName")]
    pub name: Option<String>,
}

/// One version entry of a legislative matter.
#[derive(Debug, Clone, Deserialize)]
pub struct RawMatterVersion {
    #[serde(rename = "Key")]
    pub key: serde_json::Value,
}

/// The plain-text payload of one matter version.
#[derive(Debug, Clone, Deserialize)]
pub struct RawMatterText {
    #[serde(rename = "MatterTextPlain")]
    pub plain: Option<String>,
}

/// A normalized meeting, ready for persistence.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub id: i64,
    pub body_id: i64,
    /// Combined meeting date and time-of-day. `None` when the upstream date
    /// failed to parse; the event is persisted anyway so the anomaly stays
    /// visible in listings.
    pub meeting_time: Option<NaiveDateTime>,
    pub agenda_url: String,
    pub minutes_url: Option<String>,
    pub minutes_status: Option<i64>,
    pub insite_url: Option<String>,
}

/// A normalized agenda line item belonging to one [`Event`].
///
/// Invariant: `agenda_number` is never empty; continuation rows were merged
/// into their predecessor and header rows were dropped during
/// reconciliation.
#[derive(Debug, Clone, PartialEq)]
pub struct AgendaItem {
    pub id: i64,
    pub event_id: i64,
    pub agenda_number: String,
    pub action_text: Option<String>,
    pub title: Option<String>,
    /// Lowercase concatenation of matter type, agenda number, title, and
    /// action text; the substring-search field.
    pub full_text_lower: String,
    pub matter_id: Option<i64>,
    /// Attachment name → hyperlink, serialized as one JSON object.
    pub matter_attachments: String,
    pub matter_status: Option<String>,
    pub matter_type: Option<String>,
    /// Plain matter text, populated only by the extra-detail fetch.
    pub matter_text: Option<String>,
}

/// A normalized owning body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Body {
    pub id: i64,
    pub name: String,
}

/// One row of search/report output: an agenda item joined with its meeting.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub item_id: i64,
    pub event_id: i64,
    pub body_id: i64,
    pub meeting_time: Option<NaiveDateTime>,
    pub agenda_number: String,
    pub title: Option<String>,
    pub action_text: Option<String>,
    pub matter_id: Option<i64>,
    pub matter_status: Option<String>,
    pub matter_type: Option<String>,
    pub agenda_url: String,
    pub insite_url: Option<String>,
}
