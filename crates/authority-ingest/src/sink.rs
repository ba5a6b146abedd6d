//! The append-only store contributions are loaded into.
//!
//! The sink answers two questions: "what is the newest record already
//! persisted for partition P" and "persist this batch". Duplicate natural
//! keys (`guid`, `type`, `scraper_id`) are tolerated at the storage layer
//! rather than deduplicated client-side, so overlapping runs and partial
//! retries cannot corrupt data.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, QueryBuilder};
use std::time::Duration;
use tracing::{debug, info};

use authority_common::watermark::sentinel_min;
use authority_common::{Contribution, ContributionType};

use crate::config::SinkConfig;
use crate::error::Result;
use crate::sources::ContributionStream;

/// Rows per INSERT statement.
const INSERT_CHUNK_SIZE: usize = 500;

/// Equality filter for watermark lookups.
///
/// Any subset of the recognized fields may be set; unset fields do not
/// constrain the query. Sources typically filter on their
/// `(type, scraper_id)` partition.
#[derive(Debug, Clone, Default)]
pub struct WatermarkFilter {
    pub kind: Option<ContributionType>,
    pub scraper_id: Option<String>,
    pub unit: Option<String>,
    pub author: Option<String>,
}

impl WatermarkFilter {
    /// Filter for one source's watermark partition.
    pub fn partition(kind: ContributionType, scraper_id: &str) -> Self {
        Self {
            kind: Some(kind),
            scraper_id: Some(scraper_id.to_string()),
            ..Self::default()
        }
    }

    /// Whether a contribution satisfies every set field.
    pub fn matches(&self, contribution: &Contribution) -> bool {
        self.kind.is_none_or(|k| contribution.kind == k)
            && self
                .scraper_id
                .as_deref()
                .is_none_or(|s| contribution.scraper_id == s)
            && self
                .unit
                .as_deref()
                .is_none_or(|u| contribution.unit.as_deref() == Some(u))
            && self
                .author
                .as_deref()
                .is_none_or(|a| contribution.author == a)
    }
}

/// Durable home for contributions.
#[async_trait]
pub trait Sink: Send + Sync {
    /// The maximum persisted `date` satisfying the filter, UTC-normalized;
    /// the sentinel minimum instant when nothing matches.
    async fn latest_entry(&self, filter: &WatermarkFilter) -> Result<DateTime<Utc>>;

    /// Drains the lazy stream (realizing every upstream fetch), persists
    /// the batch, and returns the number of records drained.
    ///
    /// An empty batch is a successful no-op. Any stream item error or
    /// write error propagates to the caller; nothing is swallowed.
    async fn load<'a>(&self, records: ContributionStream<'a>) -> Result<u64>;
}

/// Postgres-backed sink.
pub struct PostgresSink {
    pool: PgPool,
}

impl PostgresSink {
    /// Connects a pool and makes sure the contributions table exists.
    pub async fn connect(config: &SinkConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
            .connect(&config.url)
            .await?;

        let sink = Self { pool };
        sink.ensure_table().await?;

        info!(
            max_connections = config.max_connections,
            "contribution sink connected"
        );
        Ok(sink)
    }

    /// Wraps an existing pool; the table is still created when absent.
    pub async fn from_pool(pool: PgPool) -> Result<Self> {
        let sink = Self { pool };
        sink.ensure_table().await?;
        Ok(sink)
    }

    async fn ensure_table(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS contributions (
                guid        TEXT NOT NULL,
                author      TEXT NOT NULL,
                title       TEXT NOT NULL,
                date        TIMESTAMPTZ NOT NULL,
                unit        TEXT,
                type        TEXT NOT NULL,
                scraper_id  TEXT NOT NULL,
                url         TEXT,
                UNIQUE (guid, type, scraper_id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn insert_chunk(&self, chunk: &[Contribution]) -> Result<()> {
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
            "INSERT INTO contributions (guid, author, title, date, unit, type, scraper_id, url) ",
        );
        builder.push_values(chunk, |mut row, c| {
            row.push_bind(&c.guid)
                .push_bind(&c.author)
                .push_bind(&c.title)
                .push_bind(c.date)
                .push_bind(c.unit.as_deref())
                .push_bind(c.kind.as_str())
                .push_bind(&c.scraper_id)
                .push_bind(c.url.as_deref());
        });
        // Duplicate natural keys from overlapping runs are expected and
        // must not fail the batch.
        builder.push(" ON CONFLICT (guid, type, scraper_id) DO NOTHING");

        let result = builder.build().execute(&self.pool).await?;
        debug!(
            batch = chunk.len(),
            inserted = result.rows_affected(),
            "inserted contribution chunk"
        );
        Ok(())
    }
}

#[async_trait]
impl Sink for PostgresSink {
    async fn latest_entry(&self, filter: &WatermarkFilter) -> Result<DateTime<Utc>> {
        let mut builder: QueryBuilder<Postgres> =
            QueryBuilder::new("SELECT max(date) FROM contributions");

        let mut prefix = " WHERE ";
        if let Some(kind) = filter.kind {
            builder.push(prefix).push("type = ").push_bind(kind.as_str());
            prefix = " AND ";
        }
        if let Some(scraper_id) = &filter.scraper_id {
            builder
                .push(prefix)
                .push("scraper_id = ")
                .push_bind(scraper_id);
            prefix = " AND ";
        }
        if let Some(unit) = &filter.unit {
            builder.push(prefix).push("unit = ").push_bind(unit);
            prefix = " AND ";
        }
        if let Some(author) = &filter.author {
            builder.push(prefix).push("author = ").push_bind(author);
        }

        let row: (Option<DateTime<Utc>>,) =
            builder.build_query_as().fetch_one(&self.pool).await?;
        Ok(row.0.unwrap_or_else(sentinel_min))
    }

    async fn load<'a>(&self, mut records: ContributionStream<'a>) -> Result<u64> {
        let mut batch: Vec<Contribution> = Vec::new();
        while let Some(contribution) = records.try_next().await? {
            batch.push(contribution);
        }

        if batch.is_empty() {
            debug!("empty batch, nothing to load");
            return Ok(0);
        }

        for chunk in batch.chunks(INSERT_CHUNK_SIZE) {
            self.insert_chunk(chunk).await?;
        }
        Ok(batch.len() as u64)
    }
}
