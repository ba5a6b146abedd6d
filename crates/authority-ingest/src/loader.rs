//! Orchestration of one ingestion run.
//!
//! Sources run sequentially, each against the shared sink. A failing
//! source never aborts the run: its error is logged, a zero-count outcome
//! is recorded, and the next source runs. Records already persisted by
//! earlier sources stay persisted. The run as a whole fails if any source
//! failed, carrying the outcomes gathered so far.

use std::sync::Arc;

use tracing::{error, info};

use crate::error::IngestError;
use crate::sink::Sink;
use crate::sources::Source;

/// Per-source result of one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceOutcome {
    pub name: String,
    pub count: u64,
}

/// A run in which at least one source failed.
///
/// Outcomes for every source, including the failed ones, are carried so a
/// caller can still report what was loaded.
#[derive(Debug, thiserror::Error)]
#[error("ingestion run failed: {last}")]
pub struct RunError {
    pub last: IngestError,
    pub outcomes: Vec<SourceOutcome>,
}

/// Runs every source against the sink, in order.
pub struct Loader {
    sink: Arc<dyn Sink>,
    sources: Vec<Box<dyn Source>>,
}

impl Loader {
    pub fn new(sink: Arc<dyn Sink>, sources: Vec<Box<dyn Source>>) -> Self {
        Self { sink, sources }
    }

    /// Feeds each source into the sink. Returns all outcomes on success,
    /// or a [`RunError`] carrying them when any source failed.
    pub async fn run(&self) -> Result<Vec<SourceOutcome>, RunError> {
        let mut outcomes = Vec::with_capacity(self.sources.len());
        let mut last_error = None;

        for source in &self.sources {
            let name = source.name();
            info!(source = %name, "ingesting");

            match self.sink.load(source.feed(self.sink.as_ref())).await {
                Ok(count) => {
                    if count > 0 {
                        info!(source = %name, count, "added new contributions");
                    } else {
                        info!(source = %name, "no new contributions");
                    }
                    outcomes.push(SourceOutcome { name, count });
                }
                Err(err) => {
                    error!(source = %name, error = %err, "source failed");
                    outcomes.push(SourceOutcome { name, count: 0 });
                    last_error = Some(err);
                }
            }
        }

        match last_error {
            None => Ok(outcomes),
            Some(last) => Err(RunError { last, outcomes }),
        }
    }
}
