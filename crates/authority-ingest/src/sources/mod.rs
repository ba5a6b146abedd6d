//! Source contract and the concrete source implementations.
//!
//! A source encapsulates one external origin of contributions. Its feed is
//! a finite, single-pass stream: consuming it computes the watermark via
//! the sink, fetches upstream data only for the window strictly after the
//! watermark and strictly before "now", and skips structurally invalid
//! upstream entries with a logged warning. Restarting a feed means calling
//! `feed` again.
//!
//! Laziness is page-granular: feeds are built from `try_unfold` page state
//! machines flattened into single contributions, so page N+1 is not fetched
//! before page N has been consumed.

use futures::stream::{self, BoxStream, Stream};
use futures::TryStreamExt;

use authority_common::{Contribution, ContributionType};

use crate::error::IngestError;
use crate::sink::Sink;

pub mod articles;
pub mod github;
pub mod rss;
pub mod sessions;
pub mod wordpress;
pub mod youtube;

/// A finite, single-pass stream of valid contributions.
pub type ContributionStream<'a> = BoxStream<'a, Result<Contribution, IngestError>>;

/// One external origin of contributions.
pub trait Source: Send + Sync {
    /// Human-readable identifier for logging.
    fn name(&self) -> String;

    /// Stable machine identifier; the watermark partition key. Distinct
    /// across all concrete sources.
    fn scraper_id(&self) -> &'static str;

    /// The `type` stamped on every record this source emits.
    fn contribution_type(&self) -> ContributionType;

    /// The lazy feed of new contributions since this source's watermark.
    fn feed<'a>(&'a self, sink: &'a dyn Sink) -> ContributionStream<'a>;
}

/// Flattens a stream of per-page contribution batches into single records.
pub(crate) fn flatten_batches<'a, S>(pages: S) -> ContributionStream<'a>
where
    S: Stream<Item = Result<Vec<Contribution>, IngestError>> + Send + 'a,
{
    Box::pin(
        pages
            .map_ok(|batch| stream::iter(batch.into_iter().map(Ok)))
            .try_flatten(),
    )
}
