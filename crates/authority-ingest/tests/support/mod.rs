//! Shared test fixtures.

#![allow(dead_code)]

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::TryStreamExt;

use authority_common::watermark::sentinel_min;
use authority_common::{Contribution, ContributionType};
use authority_ingest::error::Result;
use authority_ingest::sink::{Sink, WatermarkFilter};
use authority_ingest::sources::ContributionStream;

/// In-memory sink with the same observable behavior as the Postgres one:
/// watermark per filter, duplicate natural keys silently dropped, and the
/// drained count returned regardless of how many rows were actually new.
#[derive(Default)]
pub struct MemorySink {
    rows: Mutex<Vec<Contribution>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn preloaded(rows: Vec<Contribution>) -> Self {
        Self {
            rows: Mutex::new(rows),
        }
    }

    pub fn rows(&self) -> Vec<Contribution> {
        self.rows.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl Sink for MemorySink {
    async fn latest_entry(&self, filter: &WatermarkFilter) -> Result<DateTime<Utc>> {
        let rows = self.rows.lock().unwrap_or_else(|e| e.into_inner());
        Ok(rows
            .iter()
            .filter(|c| filter.matches(c))
            .map(|c| c.date)
            .max()
            .unwrap_or_else(sentinel_min))
    }

    async fn load<'a>(&self, mut records: ContributionStream<'a>) -> Result<u64> {
        let mut batch = Vec::new();
        while let Some(contribution) = records.try_next().await? {
            batch.push(contribution);
        }
        let drained = batch.len() as u64;

        let mut rows = self.rows.lock().unwrap_or_else(|e| e.into_inner());
        for c in batch {
            let duplicate = rows
                .iter()
                .any(|r| r.guid == c.guid && r.kind == c.kind && r.scraper_id == c.scraper_id);
            if !duplicate {
                rows.push(c);
            }
        }
        Ok(drained)
    }
}

pub fn contribution(
    guid: &str,
    author: &str,
    date: DateTime<Utc>,
    kind: ContributionType,
    scraper_id: &str,
) -> Contribution {
    Contribution {
        guid: guid.to_string(),
        author: author.to_string(),
        title: format!("title of {guid}"),
        date,
        unit: None,
        kind,
        scraper_id: scraper_id.to_string(),
        url: None,
    }
}
