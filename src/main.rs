//! # agendex CLI
//!
//! Scrapes a Legistar-style municipal meeting API into a per-namespace
//! SQLite database and searches it.
//!
//! ```bash
//! agendex fetch -n mountainview -l 100   # ingest the next 100 meetings
//! agendex search "zoning" -n mountainview
//! agendex bodies --refresh               # cache the owning bodies
//! agendex reset                          # wipe and recreate the database
//! ```
//!
//! Every command accepts `--config` (default `./agendex.toml`); a missing
//! config file falls back to built-in defaults.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use agendex::config;
use agendex::ingest::{self, FetchOptions};
use agendex::query::{self, SearchFilter};
use agendex::store::Store;

/// Legistar scraper and agenda search.
#[derive(Parser)]
#[command(
    name = "agendex",
    about = "Incremental scraper and search index for municipal meeting records",
    version
)]
struct Cli {
    /// Path to configuration file (TOML). Missing file = defaults.
    #[arg(long, global = true, default_value = "./agendex.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database schema. Idempotent.
    Init {
        /// Legistar API subdomain and database name.
        #[arg(short, long)]
        namespace: Option<String>,
    },

    /// Fetch new meetings from the upstream API.
    ///
    /// Resumes after the highest meeting id already stored. Safe to re-run;
    /// records are replaced on conflict.
    Fetch {
        #[arg(short, long)]
        namespace: Option<String>,

        /// Max number of meetings to fetch.
        #[arg(short, long, default_value_t = 50)]
        limit: u64,

        /// Re-fetch meetings whose minutes were not yet final.
        #[arg(long)]
        refetch_nonfinal: bool,

        /// Also fetch plain matter text (slow).
        #[arg(long)]
        matter_text: bool,
    },

    /// Wipe and re-create the database, then cache the owning bodies.
    Reset {
        #[arg(short, long)]
        namespace: Option<String>,
    },

    /// Search previously fetched meetings and agenda items.
    Search {
        /// Substring to search for (case-insensitive).
        query: String,

        #[arg(short, long)]
        namespace: Option<String>,

        /// Restrict to one owning body id.
        #[arg(long)]
        body: Option<i64>,

        /// Restrict to one calendar year.
        #[arg(long)]
        year: Option<i32>,
    },

    /// List the owning bodies (city council, commissions, ...).
    Bodies {
        #[arg(short, long)]
        namespace: Option<String>,

        /// Re-fetch the body list from the API first.
        #[arg(long)]
        refresh: bool,
    },

    /// Chronological agenda report for one body.
    Report {
        #[arg(short, long)]
        namespace: Option<String>,

        /// Owning body id.
        #[arg(long)]
        body: i64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("agendex=warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init { namespace } => {
            let ns = config.namespace(namespace.as_deref());
            let store = Store::open(&config.store, ns).await?;
            store.ensure_schema().await?;
            store.close().await;
            println!("store for {ns} initialized");
        }
        Commands::Fetch {
            namespace,
            limit,
            refetch_nonfinal,
            matter_text,
        } => {
            let ns = config.namespace(namespace.as_deref());
            ingest::run_fetch(
                &config,
                ns,
                FetchOptions {
                    limit,
                    refetch_nonfinal,
                    matter_text,
                },
            )
            .await
            .with_context(|| format!("failed to run fetch for {ns} with limit {limit}"))?;
        }
        Commands::Reset { namespace } => {
            let ns = config.namespace(namespace.as_deref());
            ingest::run_reset(&config, ns)
                .await
                .with_context(|| format!("failed to run reset for {ns}"))?;
        }
        Commands::Search {
            query,
            namespace,
            body,
            year,
        } => {
            let ns = config.namespace(namespace.as_deref());
            let store = Store::open(&config.store, ns).await?;
            let hits = query::search(
                store.pool(),
                &SearchFilter {
                    text: Some(query.clone()),
                    body_id: body,
                    year,
                },
            )
            .await
            .with_context(|| format!("failed to run search for {ns} with query {query:?}"))?;
            print_hits(&hits);
            store.close().await;
        }
        Commands::Bodies { namespace, refresh } => {
            let ns = config.namespace(namespace.as_deref());
            let store = Store::open(&config.store, ns).await?;
            if refresh {
                store.ensure_schema().await?;
                let client = agendex::client::LegistarClient::new(&config.api)?;
                let count = ingest::refresh_bodies(&client, &store, ns)
                    .await
                    .with_context(|| format!("failed to refresh bodies for {ns}"))?;
                println!("cached {count} bodies");
            }
            for body in query::list_bodies(store.pool()).await? {
                println!("{:>6}  {}", body.id, body.name);
            }
            store.close().await;
        }
        Commands::Report { namespace, body } => {
            let ns = config.namespace(namespace.as_deref());
            let store = Store::open(&config.store, ns).await?;
            let hits = query::list_by_body(store.pool(), body)
                .await
                .with_context(|| format!("failed to run report for {ns} body {body}"))?;
            for hit in &hits {
                println!(
                    "{}  {:<8} {}",
                    format_time(&hit.meeting_time),
                    hit.agenda_number,
                    hit.title.as_deref().unwrap_or("")
                );
            }
            store.close().await;
        }
    }

    Ok(())
}

fn print_hits(hits: &[agendex::models::SearchHit]) {
    println!("body_id|meeting_time|matter_type|agenda_number|title|action_text");
    for hit in hits {
        println!(
            "{}|{}|{}|{}|{}|{}",
            hit.body_id,
            format_time(&hit.meeting_time),
            hit.matter_type.as_deref().unwrap_or(""),
            hit.agenda_number,
            hit.title.as_deref().unwrap_or(""),
            hit.action_text.as_deref().unwrap_or("")
        );
    }
}

fn format_time(time: &Option<chrono::NaiveDateTime>) -> String {
    time.map(|t| t.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_default()
}
