//! Agenda reconstruction.
//!
//! The upstream feed delivers one flat row stream per meeting: real agenda
//! items, untitled continuation rows amending the item just above them, and
//! section-header rows that are document structure rather than business.
//! This module folds that stream into the normalized item set the store
//! persists, and resolves the meeting's combined date-time.
//!
//! The fold is pure (no I/O), so every edge case is unit-tested here.

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

use crate::error::MalformedRecord;
use crate::models::{AgendaItem, Event, RawAttachment, RawEvent, RawItem};

/// Normalize one meeting and its raw agenda rows.
///
/// Continuation rows (empty label) inherit the most recent label and merge
/// their text into that item; section-header rows are dropped; rows with no
/// id are logged and skipped. An empty row list is valid and yields zero
/// items. Output preserves first-seen label order.
pub fn reconcile(
    raw_event: &RawEvent,
    raw_items: &[RawItem],
) -> Result<(Event, Vec<AgendaItem>), MalformedRecord> {
    let event_id = raw_event
        .id
        .ok_or_else(|| MalformedRecord::new("event", "missing EventId"))?;
    let body_id = raw_event
        .body_id
        .ok_or_else(|| MalformedRecord::new("event", format!("event {event_id}: missing EventBodyId")))?;

    let mut order: Vec<String> = Vec::new();
    let mut by_label: HashMap<String, AgendaItem> = HashMap::new();
    let mut last_label = String::new();

    for raw in raw_items {
        let Some(item_id) = raw.id else {
            tracing::warn!(event_id, "agenda row with no EventItemId, skipping");
            continue;
        };

        match raw.agenda_number.as_deref() {
            Some(label) if !label.is_empty() => last_label = label.to_string(),
            // Continuation row: inherits the label of the item it amends.
            _ => {}
        }
        if last_label.is_empty() {
            // Continuation before any labeled item; nothing to attach to.
            continue;
        }
        if is_section_header(&last_label) {
            continue;
        }

        match by_label.entry(last_label.clone()) {
            Entry::Occupied(mut slot) => merge_into(slot.get_mut(), raw),
            Entry::Vacant(slot) => {
                order.push(last_label.clone());
                slot.insert(new_item(item_id, event_id, &last_label, raw));
            }
        }
    }

    let items = order
        .into_iter()
        .map(|label| {
            let mut item = by_label.remove(&label).expect("label tracked in order");
            item.full_text_lower = search_text(&item);
            item
        })
        .collect();

    let event = Event {
        id: event_id,
        body_id,
        meeting_time: resolve_meeting_time(
            event_id,
            raw_event.date.as_deref(),
            raw_event.time.as_deref(),
        ),
        agenda_url: raw_event.agenda_file.clone().unwrap_or_default(),
        minutes_url: raw_event.minutes_file.clone(),
        minutes_status: raw_event.minutes_status,
        insite_url: raw_event.insite_url.clone(),
    };

    Ok((event, items))
}

/// Section headers come in two historical shapes, both kept: a label with a
/// trailing separator ("3."), and a bare top-level number with no
/// sub-number ("3", or any single character).
fn is_section_header(label: &str) -> bool {
    label.ends_with('.') || label.len() == 1 || !label.contains('.')
}

fn new_item(id: i64, event_id: i64, label: &str, raw: &RawItem) -> AgendaItem {
    AgendaItem {
        id,
        event_id,
        agenda_number: label.to_string(),
        action_text: none_if_empty(raw.action_text.clone()),
        title: none_if_empty(raw.title.clone()),
        full_text_lower: String::new(),
        matter_id: raw.matter_id,
        matter_attachments: serialize_attachments(&raw.attachments),
        matter_status: none_if_empty(raw.matter_status.clone()),
        matter_type: none_if_empty(raw.matter_type.clone()),
        matter_text: None,
    }
}

/// Accumulate a continuation (or duplicate-label) row into an existing
/// item: title and action fragments append to the action text, blank-line
/// separated, so disjoint fragments pile up instead of clobbering.
fn merge_into(existing: &mut AgendaItem, raw: &RawItem) {
    let merged: Vec<&str> = [
        existing.action_text.as_deref(),
        raw.title.as_deref(),
        raw.action_text.as_deref(),
    ]
    .into_iter()
    .flatten()
    .filter(|s| !s.is_empty())
    .collect();
    existing.action_text = none_if_empty(Some(merged.join("\n\n")));
}

fn serialize_attachments(attachments: &[RawAttachment]) -> String {
    let map: serde_json::Map<String, serde_json::Value> = attachments
        .iter()
        .filter_map(|a| {
            let name = a.name.clone()?;
            let link = a
                .hyperlink
                .clone()
                .map_or(serde_json::Value::Null, serde_json::Value::String);
            Some((name, link))
        })
        .collect();
    serde_json::Value::Object(map).to_string()
}

/// The derived search field: matter type, agenda number, title, and action
/// text, skipping empty components, newline-joined, lowercased.
fn search_text(item: &AgendaItem) -> String {
    [
        item.matter_type.as_deref(),
        Some(item.agenda_number.as_str()),
        item.title.as_deref(),
        item.action_text.as_deref(),
    ]
    .into_iter()
    .flatten()
    .filter(|s| !s.is_empty())
    .collect::<Vec<_>>()
    .join("\n")
    .to_lowercase()
}

/// Combine the meeting's date and time-of-day. The time is frequently
/// missing or free-form; it falls back to noon. A date that fails to parse
/// leaves the meeting time absent entirely; the event is still persisted
/// so downstream listings surface the anomaly.
fn resolve_meeting_time(
    event_id: i64,
    date: Option<&str>,
    time: Option<&str>,
) -> Option<NaiveDateTime> {
    let raw_date = date.unwrap_or("");
    let parsed_date = NaiveDateTime::parse_from_str(raw_date, "%Y-%m-%dT%H:%M:%S")
        .map(|dt| dt.date())
        .or_else(|_| NaiveDate::parse_from_str(raw_date, "%Y-%m-%d"));
    let date = match parsed_date {
        Ok(d) => d,
        Err(err) => {
            tracing::warn!(event_id, raw_date, error = %err, "unparseable meeting date");
            return None;
        }
    };

    let noon = NaiveTime::from_hms_opt(12, 0, 0).expect("valid time");
    let time_of_day = match time {
        Some(raw) if !raw.is_empty() => match NaiveTime::parse_from_str(raw, "%I:%M %p") {
            Ok(t) => t,
            Err(err) => {
                tracing::warn!(event_id, raw, error = %err, "unparseable meeting time, using noon");
                noon
            }
        },
        _ => noon,
    };

    Some(date.and_time(time_of_day))
}

pub(crate) fn none_if_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(id: i64) -> RawEvent {
        RawEvent {
            id: Some(id),
            body_id: Some(138),
            date: Some("2023-05-09T00:00:00".to_string()),
            time: Some("6:30 PM".to_string()),
            agenda_file: Some("https://example.test/agenda.pdf".to_string()),
            ..RawEvent::default()
        }
    }

    fn item(id: i64, label: &str, title: &str, action: &str) -> RawItem {
        RawItem {
            id: Some(id),
            agenda_number: Some(label.to_string()),
            title: none_if_empty(Some(title.to_string())),
            action_text: none_if_empty(Some(action.to_string())),
            ..RawItem::default()
        }
    }

    #[test]
    fn continuation_merges_into_previous_item() {
        let rows = vec![item(1, "3.1", "A", ""), item(2, "", "", "B")];
        let (_, items) = reconcile(&event(10), &rows).unwrap();

        assert_eq!(items.len(), 1);
        assert_eq!(items[0].agenda_number, "3.1");
        assert_eq!(items[0].title.as_deref(), Some("A"));
        assert_eq!(items[0].action_text.as_deref(), Some("B"));
    }

    #[test]
    fn continuation_fragments_accumulate() {
        let rows = vec![
            item(1, "3.1", "Title", "moved by X"),
            item(2, "", "carried", "5-0"),
        ];
        let (_, items) = reconcile(&event(10), &rows).unwrap();

        assert_eq!(items[0].action_text.as_deref(), Some("moved by X\n\ncarried\n\n5-0"));
        assert_eq!(items[0].title.as_deref(), Some("Title"));
    }

    #[test]
    fn section_headers_dropped() {
        for header in ["3.", "3", "7", "CLOSED SESSION"] {
            let rows = vec![item(1, header, "ignored", "ignored")];
            let (_, items) = reconcile(&event(10), &rows).unwrap();
            assert!(items.is_empty(), "label {header:?} should be a header");
        }
    }

    #[test]
    fn dotted_labels_kept() {
        let rows = vec![item(1, "3.2", "Zoning text amendment", "")];
        let (_, items) = reconcile(&event(10), &rows).unwrap();
        assert_eq!(items.len(), 1);
    }

    #[test]
    fn continuation_after_header_dropped() {
        // The inherited label is the header's, so the row stays structure.
        let rows = vec![item(1, "3.", "Section", ""), item(2, "", "stray text", "")];
        let (_, items) = reconcile(&event(10), &rows).unwrap();
        assert!(items.is_empty());
    }

    #[test]
    fn continuation_before_any_item_dropped() {
        let rows = vec![item(1, "", "orphan", "text")];
        let (_, items) = reconcile(&event(10), &rows).unwrap();
        assert!(items.is_empty());
    }

    #[test]
    fn row_without_id_skipped() {
        let mut orphan = item(0, "4.1", "kept?", "");
        orphan.id = None;
        let rows = vec![orphan, item(2, "4.2", "kept", "")];
        let (_, items) = reconcile(&event(10), &rows).unwrap();

        assert_eq!(items.len(), 1);
        assert_eq!(items[0].agenda_number, "4.2");
    }

    #[test]
    fn duplicate_label_merges_into_first_seen() {
        let rows = vec![
            item(1, "5.1", "first", ""),
            item(2, "5.2", "other", ""),
            item(3, "5.1", "again", "late addition"),
        ];
        let (_, items) = reconcile(&event(10), &rows).unwrap();

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].id, 1);
        assert_eq!(items[0].agenda_number, "5.1");
        assert_eq!(items[0].action_text.as_deref(), Some("again\n\nlate addition"));
        assert_eq!(items[1].agenda_number, "5.2");
    }

    #[test]
    fn empty_row_list_is_valid() {
        let (ev, items) = reconcile(&event(10), &[]).unwrap();
        assert_eq!(ev.id, 10);
        assert!(items.is_empty());
    }

    #[test]
    fn search_field_is_lowercase_concatenation() {
        let mut row = item(1, "3.2", "Rezoning of Main St", "Approved");
        row.matter_type = Some("Ordinance".to_string());
        let (_, items) = reconcile(&event(10), &[row]).unwrap();

        assert_eq!(
            items[0].full_text_lower,
            "ordinance\n3.2\nrezoning of main st\napproved"
        );
    }

    #[test]
    fn search_field_skips_empty_components() {
        let rows = vec![item(1, "3.2", "", "Adopted")];
        let (_, items) = reconcile(&event(10), &rows).unwrap();
        assert_eq!(items[0].full_text_lower, "3.2\nadopted");
    }

    #[test]
    fn search_field_reflects_merged_continuations() {
        let rows = vec![item(1, "3.1", "A", ""), item(2, "", "", "B")];
        let (_, items) = reconcile(&event(10), &rows).unwrap();
        assert!(items[0].full_text_lower.contains("b"));
    }

    #[test]
    fn attachments_serialize_to_json_object() {
        let mut row = item(1, "6.1", "t", "");
        row.attachments = vec![
            RawAttachment {
                name: Some("Staff Report".to_string()),
                hyperlink: Some("https://example.test/report.pdf".to_string()),
            },
            RawAttachment {
                name: None,
                hyperlink: Some("https://example.test/ignored.pdf".to_string()),
            },
        ];
        let (_, items) = reconcile(&event(10), &[row]).unwrap();

        let parsed: serde_json::Value = serde_json::from_str(&items[0].matter_attachments).unwrap();
        assert_eq!(
            parsed["Staff Report"],
            serde_json::Value::String("https://example.test/report.pdf".to_string())
        );
        assert_eq!(parsed.as_object().unwrap().len(), 1);
    }

    #[test]
    fn meeting_time_combines_date_and_time() {
        let (ev, _) = reconcile(&event(10), &[]).unwrap();
        assert_eq!(
            ev.meeting_time.unwrap().to_string(),
            "2023-05-09 18:30:00"
        );
    }

    #[test]
    fn missing_time_defaults_to_noon() {
        let mut raw = event(10);
        raw.time = None;
        let (ev, _) = reconcile(&raw, &[]).unwrap();
        assert_eq!(ev.meeting_time.unwrap().to_string(), "2023-05-09 12:00:00");
    }

    #[test]
    fn unparseable_time_defaults_to_noon() {
        let mut raw = event(10);
        raw.time = Some("to be determined".to_string());
        let (ev, _) = reconcile(&raw, &[]).unwrap();
        assert_eq!(ev.meeting_time.unwrap().to_string(), "2023-05-09 12:00:00");
    }

    #[test]
    fn unparseable_date_leaves_meeting_time_absent() {
        let mut raw = event(10);
        raw.date = Some("sometime in May".to_string());
        let (ev, _) = reconcile(&raw, &[]).unwrap();
        assert!(ev.meeting_time.is_none());
    }

    #[test]
    fn event_without_id_is_malformed() {
        let mut raw = event(10);
        raw.id = None;
        assert!(reconcile(&raw, &[]).is_err());
    }

    #[test]
    fn event_without_agenda_keeps_empty_url() {
        let mut raw = event(10);
        raw.agenda_file = None;
        let (ev, _) = reconcile(&raw, &[]).unwrap();
        assert_eq!(ev.agenda_url, "");
    }
}
