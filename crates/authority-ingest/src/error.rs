//! Error types for the ingestion core.

use thiserror::Error;

/// Errors raised while ingesting contributions.
///
/// The taxonomy mirrors how failures are handled:
///
/// - transport and definitive upstream errors are fatal to the owning
///   source's pass, but not to other sources
/// - a throttle signal is retried internally by the rate-limited client and
///   only surfaces as [`IngestError::RateLimitExhausted`] once the retry
///   budget is spent
/// - structural defects in individual upstream records are *not* errors;
///   sources skip those with a logged warning
#[derive(Error, Debug)]
pub enum IngestError {
    /// Transport-level HTTP failure (connect, timeout, body decode)
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Definitive non-2xx response from an upstream API
    #[error("upstream returned {status} for {url}: {body}")]
    Upstream {
        status: reqwest::StatusCode,
        url: String,
        body: String,
    },

    /// Missing or malformed pagination metadata
    #[error("pagination error: {0}")]
    Pagination(String),

    /// Throttled and the retry budget is spent, or the quota signal is
    /// inconsistent (reset in the past while still throttled)
    #[error("rate limit retry budget exhausted for {url}")]
    RateLimitExhausted { url: String },

    /// Unparsable payload (JSON/XML shape, date formats)
    #[error("payload error: {0}")]
    Payload(String),

    /// Sink read or write failure
    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),

    /// Invalid or missing configuration
    #[error("configuration error: {0}")]
    Config(String),

    /// A source registered twice under the same scraper id
    #[error("duplicate source registration for scraper id '{0}'")]
    DuplicateSource(String),
}

pub type Result<T> = std::result::Result<T, IngestError>;
