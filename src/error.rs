//! Failure taxonomy for the pipeline seams where callers branch on the
//! failure class. Orchestration and CLI layers wrap these in `anyhow`.

use thiserror::Error;

/// Failures surfaced by the upstream API client.
///
/// `Transport` is only returned once the bounded retries are exhausted;
/// `Status` and `Decode` are upstream faults and are never retried.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("request to {url} failed after {attempts} attempts: {source}")]
    Transport {
        url: String,
        attempts: u32,
        #[source]
        source: reqwest::Error,
    },
    #[error("upstream returned {status} for {url}")]
    Status {
        status: reqwest::StatusCode,
        url: String,
    },
    #[error("undecodable payload from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

/// Failures surfaced by the persistence layer.
///
/// `SchemaMissing` is distinguishable so the orchestrator can bootstrap the
/// schema exactly once and retry; everything else passes through.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("schema missing: {0}")]
    SchemaMissing(#[source] sqlx::Error),
    #[error(transparent)]
    Db(sqlx::Error),
}

impl StoreError {
    /// Classify a raw sqlx error. SQLite reports reads against absent
    /// tables as "no such table"; that is the self-healing trigger.
    pub fn classify(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db) = &err {
            if db.message().contains("no such table") {
                return StoreError::SchemaMissing(err);
            }
        }
        StoreError::Db(err)
    }
}

/// A single record that cannot be minimally parsed. Logged and skipped by
/// the orchestrator; never aborts a page.
#[derive(Debug, Error)]
#[error("malformed {entity} record: {reason}")]
pub struct MalformedRecord {
    pub entity: &'static str,
    pub reason: String,
}

impl MalformedRecord {
    pub fn new(entity: &'static str, reason: impl Into<String>) -> Self {
        Self {
            entity,
            reason: reason.into(),
        }
    }
}
