//! Upstream API client.
//!
//! Issues paginated, filtered list requests and per-meeting detail requests
//! against a Legistar-style OData v3 endpoint. The API only accepts GETs;
//! responses are JSON arrays of flat objects. This module has no
//! persistence knowledge; it returns raw payloads for the reconciler.
//!
//! # Retry Strategy
//!
//! GETs are idempotent, so transport failures (network error, timeout) are
//! retried a bounded number of times with exponential backoff before
//! surfacing [`ApiError::Transport`]. Non-success statuses and undecodable
//! payloads are upstream faults and are never retried.

use std::time::Duration;

use futures::future::try_join_all;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::config::ApiConfig;
use crate::error::ApiError;
use crate::models::{RawBody, RawEvent, RawItem, RawMatterText, RawMatterVersion};

/// The provider caps one page at 1000 records; `$top` above that is ignored.
pub const MAX_PAGE_SIZE: u64 = 1000;

const EVENT_FIELDS: &[&str] = &[
    "EventId",
    "EventBodyId",
    "EventDate",
    "EventTime",
    "EventAgendaFile",
    "EventMinutesFile",
    "EventMinutesStatusId",
    "EventInSiteURL",
];

// The attachment sub-fields ride along with `$expand` so no per-attachment
// fetch is needed.
const ITEM_FIELDS: &[&str] = &[
    "EventItemId",
    "EventItemAgendaNumber",
    "EventItemActionText",
    "EventItemTitle",
    "EventItemMatterId",
    "EventItemMatterAttachments/MatterAttachmentName",
    "EventItemMatterAttachments/MatterAttachmentHyperlink",
    "EventItemMatterStatus",
    "EventItemMatterType",
];

pub struct LegistarClient {
    http: reqwest::Client,
    base_url: String,
    max_retries: u32,
}

impl LegistarClient {
    pub fn new(config: &ApiConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            max_retries: config.max_retries,
        })
    }

    /// One page of meetings in ascending id order, excluding meetings with
    /// no agenda document, starting strictly after `after_id`.
    ///
    /// May return fewer than `page_limit` records, or none at all when the
    /// feed is exhausted.
    pub async fn list_events(
        &self,
        namespace: &str,
        after_id: i64,
        page_limit: u64,
    ) -> Result<Vec<RawEvent>, ApiError> {
        let url = format!("{}/{}/events", self.base_url, namespace);
        self.get_json(&url, &events_query(after_id, page_limit))
            .await
    }

    /// The flat, API-ordered agenda row list for one meeting. The observed
    /// order key is the minutes sequence, which is sometimes null, with the
    /// agenda sequence as tiebreaker.
    pub async fn list_event_items(
        &self,
        namespace: &str,
        event_id: i64,
    ) -> Result<Vec<RawItem>, ApiError> {
        let url = format!("{}/{}/events/{}/eventitems", self.base_url, namespace, event_id);
        self.get_json(&url, &items_query()).await
    }

    /// One-shot fetch of all owning bodies. City council is 138, etc.
    pub async fn list_bodies(&self, namespace: &str) -> Result<Vec<RawBody>, ApiError> {
        let url = format!("{}/{}/bodies", self.base_url, namespace);
        self.get_json(&url, &[("$select", "BodyId,BodyName".to_string())])
            .await
    }

    /// Plain text of a matter, concatenated across its versions. Slow (one
    /// request per version plus the version listing), so callers gate this
    /// behind the extra-detail flag.
    pub async fn fetch_matter_text(
        &self,
        namespace: &str,
        matter_id: i64,
    ) -> Result<String, ApiError> {
        let base = format!("{}/{}/matters/{}", self.base_url, namespace, matter_id);
        let versions: Vec<RawMatterVersion> =
            self.get_json(&format!("{base}/versions"), &[]).await?;

        let mut text = String::new();
        for version in versions {
            let key = match &version.key {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            let payload: RawMatterText =
                self.get_json(&format!("{base}/texts/{key}"), &[]).await?;
            if let Some(plain) = payload.plain {
                text.push_str(&plain);
            }
        }
        Ok(text)
    }

    /// Fetch the agenda rows for one page of meetings, one concurrent
    /// request per meeting that declares an agenda document (so in-flight
    /// requests are bounded by the page size). Meetings without an agenda
    /// document skip the request and pair with an empty list. All requests
    /// are joined before results are returned, in page order.
    pub async fn fetch_page_items(
        &self,
        namespace: &str,
        events: &[RawEvent],
    ) -> Result<Vec<Vec<RawItem>>, ApiError> {
        try_join_all(events.iter().map(|event| async move {
            match event.id {
                Some(id) if event.has_agenda() => self.list_event_items(namespace, id).await,
                _ => Ok(Vec::new()),
            }
        }))
        .await
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        params: &[(&str, String)],
    ) -> Result<T, ApiError> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let response = match self.http.get(url).query(params).send().await {
                Ok(response) => response,
                Err(err) => {
                    if attempt <= self.max_retries {
                        // 250ms, 500ms, 1s, ... capped at 4s.
                        let delay = Duration::from_millis(250 << (attempt - 1).min(4));
                        tracing::warn!(url, attempt, error = %err, "transport failure, retrying");
                        tokio::time::sleep(delay).await;
                        continue;
                    }
                    return Err(ApiError::Transport {
                        url: url.to_string(),
                        attempts: attempt,
                        source: err,
                    });
                }
            };

            let status = response.status();
            if !status.is_success() {
                return Err(ApiError::Status {
                    status,
                    url: url.to_string(),
                });
            }

            return response.json::<T>().await.map_err(|source| ApiError::Decode {
                url: url.to_string(),
                source,
            });
        }
    }
}

fn events_query(after_id: i64, page_limit: u64) -> Vec<(&'static str, String)> {
    // Relies on event ids never decreasing in the feed's natural order.
    let mut filter = String::from("EventAgendaFile ne null");
    if after_id > 0 {
        filter.push_str(&format!(" and EventId gt {after_id}"));
    }

    let mut params = vec![
        ("$orderby", "EventId".to_string()),
        ("$select", EVENT_FIELDS.join(",")),
        ("$filter", filter),
    ];
    if page_limit > 0 && page_limit < MAX_PAGE_SIZE {
        params.push(("$top", page_limit.to_string()));
    }
    params
}

fn items_query() -> Vec<(&'static str, String)> {
    // `$expand` only works when the expanded relation also appears in
    // `$select`, hence the attachment sub-fields in ITEM_FIELDS.
    vec![
        ("AgendaNote", "1".to_string()),
        ("MinutesNote", "1".to_string()),
        ("Attachments", "1".to_string()),
        ("$expand", "EventItemMatterAttachments".to_string()),
        ("$select", ITEM_FIELDS.join(",")),
        (
            "$orderby",
            "EventItemMinutesSequence,EventItemAgendaSequence".to_string(),
        ),
    ]
}
