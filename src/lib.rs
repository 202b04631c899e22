//! # agendex
//!
//! An incremental scraper and substring-search index for municipal meeting
//! records served by a Legistar-style OData API.
//!
//! One namespace = one municipality's API subdomain and one SQLite
//! database. Ingestion resumes from the highest meeting id already stored,
//! reconstructs logical agenda items from the flat row stream the API
//! delivers, and persists everything replace-on-conflict so re-running or
//! resuming is always safe.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   ┌────────────┐   ┌───────────┐
//! │ API Client │──▶│ Reconciler │──▶│  SQLite   │
//! │ events/    │   │ merge/drop │   │ events    │
//! │ eventitems │   │ rows, time │   │ items     │
//! │ bodies     │   │ resolution │   │ bodies    │
//! └────────────┘   └────────────┘   └─────┬─────┘
//!        ▲                                │
//!        └── cursor = max stored id ──────┤
//!                                         ▼
//!                                   ┌───────────┐
//!                                   │    CLI    │
//!                                   │ (agendex) │
//!                                   └───────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`client`] | Paginated, filtered requests against the upstream API |
//! | [`reconcile`] | Flat row stream → normalized agenda items |
//! | [`store`] | Schema, idempotent upserts, cursor recovery |
//! | [`ingest`] | The fetch → reconcile → persist loop |
//! | [`query`] | Read-only substring search and chronological listing |
//! | [`config`] | TOML configuration |
//! | [`models`] | Raw payloads and normalized records |
//! | [`error`] | Client/store failure taxonomy |

pub mod client;
pub mod config;
pub mod error;
pub mod ingest;
pub mod models;
pub mod query;
pub mod reconcile;
pub mod store;
