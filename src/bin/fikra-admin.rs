use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use fikra::analytics::{Aggregator, Interval, Range};
use fikra::clock::SystemClock;
use fikra::config::Config;
use fikra::models::{DomainId, EventRecord, Field};
use fikra::storage::{self, StorageError};

#[derive(Parser)]
#[command(name = "fikra-admin")]
#[command(about = "Fikra analytics admin CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the event schema
    Init,
    /// Insert records from a newline-delimited JSON file
    Ingest {
        /// One JSON event record per line
        file: PathBuf,
    },
    /// Count active sessions
    Active {
        domain: DomainId,
        /// Reference instant (RFC 3339, default: now)
        #[arg(long)]
        at: Option<DateTime<Utc>>,
    },
    /// Average visit duration per bucket
    Durations {
        domain: DomainId,
        #[arg(long, default_value = "daily")]
        interval: Interval,
        #[arg(long, default_value_t = 14)]
        count: usize,
        #[arg(long)]
        at: Option<DateTime<Utc>>,
    },
    /// Newest first-seen values
    New {
        domain: DomainId,
        /// Comma-separated field names, e.g. siteReferrer
        fields: String,
    },
    /// Number of values first seen inside a range, per field
    NewCounts {
        domain: DomainId,
        fields: String,
        #[arg(long, default_value = "last7days")]
        range: Range,
        #[arg(long)]
        at: Option<DateTime<Utc>>,
    },
    /// Every record flagged as new or seen
    Classify { domain: DomainId, fields: String },
    /// Latest distinct values
    Recent { domain: DomainId, fields: String },
    /// Most frequent values
    Top {
        domain: DomainId,
        fields: String,
        #[arg(long, default_value = "last7days")]
        range: Range,
        #[arg(long)]
        limit: Option<usize>,
        #[arg(long)]
        at: Option<DateTime<Utc>>,
    },
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn fields(raw: &str) -> Result<Vec<Field>> {
    Ok(Field::parse_list(raw)?)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?;

    let store = storage::connect(&config.database).await?;

    // Ensure database is initialized
    store.init().await.context("failed to initialize the event store")?;

    let aggregator = Aggregator::new(Arc::clone(&store), Arc::new(SystemClock), config.aggregation);
    let cancel = CancellationToken::new();
    let now = aggregator.now();

    match cli.command {
        Commands::Init => {
            println!("✓ Event schema ready");
        }
        Commands::Ingest { file } => {
            let content = tokio::fs::read_to_string(&file)
                .await
                .with_context(|| format!("failed to read {}", file.display()))?;

            let mut inserted = 0usize;
            let mut duplicates = 0usize;
            for (line_no, line) in content.lines().enumerate() {
                if line.trim().is_empty() {
                    continue;
                }
                let record: EventRecord = serde_json::from_str(line)
                    .with_context(|| format!("line {}: invalid event record", line_no + 1))?;
                match store.insert(&record).await {
                    Ok(()) => inserted += 1,
                    Err(StorageError::Conflict) => duplicates += 1,
                    Err(e) => return Err(e).context(format!("line {}: insert failed", line_no + 1)),
                }
            }

            println!("✓ Inserted {} records ({} duplicates skipped)", inserted, duplicates);
        }
        Commands::Active { domain, at } => {
            print_json(&aggregator.active_visitors(&domain, at.unwrap_or(now), &cancel).await?)?;
        }
        Commands::Durations {
            domain,
            interval,
            count,
            at,
        } => {
            print_json(
                &aggregator
                    .durations(&domain, interval, count, at.unwrap_or(now), &cancel)
                    .await?,
            )?;
        }
        Commands::New { domain, fields: raw } => {
            print_json(&aggregator.new_records(&domain, &fields(&raw)?, &cancel).await?)?;
        }
        Commands::NewCounts {
            domain,
            fields: raw,
            range,
            at,
        } => {
            print_json(
                &aggregator
                    .new_value_counts(&domain, &fields(&raw)?, range, at.unwrap_or(now), &cancel)
                    .await?,
            )?;
        }
        Commands::Classify { domain, fields: raw } => {
            print_json(&aggregator.classify_new(&domain, &fields(&raw)?, &cancel).await?)?;
        }
        Commands::Recent { domain, fields: raw } => {
            print_json(&aggregator.recent_records(&domain, &fields(&raw)?, &cancel).await?)?;
        }
        Commands::Top {
            domain,
            fields: raw,
            range,
            limit,
            at,
        } => {
            print_json(
                &aggregator
                    .top_records(&domain, &fields(&raw)?, range, limit, at.unwrap_or(now), &cancel)
                    .await?,
            )?;
        }
    }

    Ok(())
}
