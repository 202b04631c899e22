//! Ingestion pipeline orchestration.
//!
//! Drives the fetch → reconcile → persist loop for one namespace: resumes
//! from the stored cursor (bootstrapping the schema on first run), pages
//! through the upstream feed with bounded per-page fan-out, and reports
//! progress. Per-record anomalies are logged and skipped; transport and
//! page-level failures abort the run with the attempted cursor in the
//! error context so a retry resumes safely.

use std::io::Write;

use anyhow::{Context, Result};

use crate::client::{LegistarClient, MAX_PAGE_SIZE};
use crate::config::Config;
use crate::error::StoreError;
use crate::models::{AgendaItem, Body, RawBody};
use crate::reconcile::reconcile;
use crate::store::Store;

#[derive(Debug, Clone, Copy)]
pub struct FetchOptions {
    /// Maximum number of meetings to ingest this run.
    pub limit: u64,
    /// Revisit meetings whose minutes are not yet final instead of only
    /// fetching past the maximum stored id.
    pub refetch_nonfinal: bool,
    /// Also fetch and persist plain matter text (slow; one or more extra
    /// requests per matter).
    pub matter_text: bool,
}

/// Fetch up to `opts.limit` meetings past the resumption cursor and
/// persist them. Returns the number of meetings ingested.
pub async fn run_fetch(config: &Config, namespace: &str, opts: FetchOptions) -> Result<u64> {
    let store = Store::open(&config.store, namespace)
        .await
        .with_context(|| format!("opening store for {namespace}"))?;
    let client = LegistarClient::new(&config.api)?;

    let mut cursor = resume_cursor(&store, opts.refetch_nonfinal).await?;
    println!(
        "fetching up to {} {} events, cursor {}",
        opts.limit, namespace, cursor
    );

    let mut remaining = opts.limit;
    let mut ingested = 0u64;

    while remaining > 0 {
        let page_limit = remaining.min(MAX_PAGE_SIZE);
        let page = client
            .list_events(namespace, cursor, page_limit)
            .await
            .with_context(|| format!("listing {namespace} events after id {cursor}"))?;
        if page.is_empty() {
            // Caught up with the feed.
            break;
        }

        let item_lists = client
            .fetch_page_items(namespace, &page)
            .await
            .with_context(|| format!("fetching agenda items for {namespace} page after id {cursor}"))?;

        let mut page_max = cursor;
        for (raw_event, raw_items) in page.iter().zip(&item_lists) {
            let (event, mut items) = match reconcile(raw_event, raw_items) {
                Ok(pair) => pair,
                Err(err) => {
                    tracing::warn!(error = %err, "skipping unreconcilable event record");
                    continue;
                }
            };

            if opts.matter_text {
                attach_matter_text(&client, namespace, &mut items).await;
            }

            // Persist the event before its items, and only advance the
            // cursor past records that are durably written.
            store
                .upsert_event(&event)
                .await
                .with_context(|| format!("persisting event {}", event.id))?;
            store
                .upsert_items(event.id, &items)
                .await
                .with_context(|| format!("persisting items of event {}", event.id))?;

            page_max = page_max.max(event.id);
            ingested += 1;
            if ingested % 5 == 0 {
                eprint!("\r#{ingested}: {}   ", event.id);
                let _ = std::io::stderr().flush();
            }
        }

        remaining = remaining.saturating_sub(page.len() as u64);
        if page_max <= cursor {
            // Stall guard: the feed echoed a page we already hold.
            break;
        }
        cursor = page_max;
    }

    if ingested >= 5 {
        eprintln!();
    }
    if ingested > 0 {
        println!("recorded {ingested} events");
    } else {
        println!("no more events to fetch");
    }

    store.close().await;
    Ok(ingested)
}

/// Determine the starting cursor for a run.
///
/// Normally the maximum stored event id. In refetch-nonfinal mode, one
/// below the oldest event whose minutes are not final, so that event is
/// fetched again and overwritten in place.
///
/// A missing schema on this first read triggers a one-shot bootstrap and a
/// single retry; a second failure propagates.
pub async fn resume_cursor(store: &Store, refetch_nonfinal: bool) -> Result<i64> {
    match cursor_read(store, refetch_nonfinal).await {
        Ok(cursor) => Ok(cursor),
        Err(StoreError::SchemaMissing(_)) => {
            println!("store schema missing, creating it");
            store.ensure_schema().await?;
            Ok(cursor_read(store, refetch_nonfinal).await?)
        }
        Err(err) => Err(err.into()),
    }
}

async fn cursor_read(store: &Store, refetch_nonfinal: bool) -> Result<i64, StoreError> {
    if refetch_nonfinal {
        let ids = store.nonfinal_event_ids().await?;
        if let Some(min) = ids.first() {
            return Ok((min - 1).max(0));
        }
    }
    Ok(store.max_event_id().await?.unwrap_or(0))
}

async fn attach_matter_text(client: &LegistarClient, namespace: &str, items: &mut [AgendaItem]) {
    for item in items {
        let Some(matter_id) = item.matter_id else {
            continue;
        };
        match client.fetch_matter_text(namespace, matter_id).await {
            Ok(text) if !text.is_empty() => item.matter_text = Some(text),
            Ok(_) => {}
            Err(err) => {
                // Optional enrichment; a failure here never costs the item.
                tracing::warn!(matter_id, error = %err, "matter text fetch failed");
            }
        }
    }
}

/// Wipe and recreate the store, then fetch and cache the owning bodies.
pub async fn run_reset(config: &Config, namespace: &str) -> Result<()> {
    let store = Store::open(&config.store, namespace)
        .await
        .with_context(|| format!("opening store for {namespace}"))?;
    store.recreate().await?;

    let client = LegistarClient::new(&config.api)?;
    let count = refresh_bodies(&client, &store, namespace).await?;
    println!("reset {namespace}: schema recreated, {count} bodies cached");

    store.close().await;
    Ok(())
}

/// Fetch all owning bodies from the API and replace the cached set.
pub async fn refresh_bodies(
    client: &LegistarClient,
    store: &Store,
    namespace: &str,
) -> Result<usize> {
    let raw = client
        .list_bodies(namespace)
        .await
        .with_context(|| format!("listing {namespace} bodies"))?;
    let bodies = convert_bodies(raw);
    store.replace_bodies(&bodies).await?;
    Ok(bodies.len())
}

fn convert_bodies(raw: Vec<RawBody>) -> Vec<Body> {
    raw.into_iter()
        .filter_map(|body| match (body.id, body.name) {
            (Some(id), Some(name)) => Some(Body { id, name }),
            (id, _) => {
                tracing::warn!(body_id = ?id, "malformed body record, skipping");
                None
            }
        })
        .collect()
}
