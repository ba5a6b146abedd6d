//! Rate-limited, paginated HTTP fetching.
//!
//! Turns a paged, quota-limited JSON API (the GitHub REST API shape) into a
//! flat sequence of page payloads. Throttling (HTTP 403 combined with a
//! zero `X-RateLimit-Remaining` header) is the only condition that is
//! retried anywhere in the ingestion core; the wait is computed from the
//! `X-RateLimit-Reset` header and the total time spent waiting is capped by
//! a retry budget. Every other non-2xx response is definitive.

use std::time::Duration;

use chrono::Utc;
use reqwest::header::{HeaderMap, AUTHORIZATION, LINK};
use serde_json::Value;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::error::{IngestError, Result};

/// HTTP client with quota-reset retry behavior.
pub struct RateLimitedClient {
    client: reqwest::Client,
    token: Option<String>,
    retry_budget: Duration,
}

impl RateLimitedClient {
    /// Builds a client with a mandatory per-request timeout.
    pub fn new(timeout: Duration, token: Option<String>, retry_budget: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            token,
            retry_budget,
        })
    }

    /// Performs one GET, retrying while the upstream signals quota
    /// exhaustion.
    ///
    /// The wait per retry is `reset - now + 1` seconds, floored at one
    /// second. A reset timestamp in the past (clock skew) is treated as a
    /// zero wait and retried once; if the upstream is still throttling
    /// after that, the call fails loudly. The accumulated wait never
    /// exceeds the retry budget.
    pub async fn fetch(&self, url: &str, params: &[(String, String)]) -> Result<(Value, HeaderMap)> {
        let deadline = Instant::now() + self.retry_budget;
        let mut retried_zero_wait = false;

        loop {
            let mut request = self.client.get(url);
            if !params.is_empty() {
                request = request.query(params);
            }
            if let Some(token) = &self.token {
                request = request.header(AUTHORIZATION, format!("Token {token}"));
            }

            let response = request.send().await?;
            let status = response.status();

            if status.is_success() {
                let headers = response.headers().clone();
                let payload = response.json().await?;
                return Ok((payload, headers));
            }

            let quota_exhausted = status == reqwest::StatusCode::FORBIDDEN
                && header_str(response.headers(), "X-RateLimit-Remaining") == Some("0");
            if !quota_exhausted {
                let body = response.text().await.unwrap_or_default();
                return Err(IngestError::Upstream {
                    status,
                    url: url.to_string(),
                    body,
                });
            }

            let reset = header_str(response.headers(), "X-RateLimit-Reset")
                .and_then(|v| v.parse::<i64>().ok())
                .ok_or_else(|| {
                    IngestError::Payload(
                        "throttled response without a parsable X-RateLimit-Reset header".to_string(),
                    )
                })?;

            let wait_secs = reset - Utc::now().timestamp() + 1;
            if wait_secs <= 0 {
                // Reset already passed: clock skew, or a stale header.
                if retried_zero_wait {
                    return Err(IngestError::RateLimitExhausted {
                        url: url.to_string(),
                    });
                }
                debug!(url, "quota reset in the past, retrying once without waiting");
                retried_zero_wait = true;
                continue;
            }

            let wait = Duration::from_secs(wait_secs.unsigned_abs().max(1));
            if Instant::now() + wait > deadline {
                return Err(IngestError::RateLimitExhausted {
                    url: url.to_string(),
                });
            }

            info!(wait_secs, url, "rate limited, sleeping until quota reset");
            tokio::time::sleep(wait).await;
        }
    }

    /// Starts a page cursor at `url`; subsequent pages follow the
    /// `rel="next"` relation of the `Link` response header.
    pub fn paginate(&self, url: String, params: Vec<(String, String)>) -> PageCursor<'_> {
        PageCursor {
            client: self,
            next: Some(PageRequest::First { url, params }),
        }
    }
}

enum PageRequest {
    First {
        url: String,
        params: Vec<(String, String)>,
    },
    Follow {
        url: String,
    },
}

/// Step-based page iterator: one payload per call, `None` once the
/// upstream stops advertising a next page.
pub struct PageCursor<'a> {
    client: &'a RateLimitedClient,
    next: Option<PageRequest>,
}

impl PageCursor<'_> {
    pub async fn next_page(&mut self) -> Result<Option<Value>> {
        let Some(request) = self.next.take() else {
            return Ok(None);
        };

        let (payload, headers) = match &request {
            PageRequest::First { url, params } => self.client.fetch(url, params).await?,
            PageRequest::Follow { url } => self.client.fetch(url, &[]).await?,
        };

        self.next = next_link(&headers)?.map(|url| PageRequest::Follow { url });
        Ok(Some(payload))
    }
}

/// Extracts the `rel="next"` target from a structured `Link` header.
///
/// An absent or empty header means "no next page"; a header that is
/// present but malformed is a definitive pagination error.
pub(crate) fn next_link(headers: &HeaderMap) -> Result<Option<String>> {
    let Some(raw) = headers.get(LINK) else {
        return Ok(None);
    };
    let raw = raw
        .to_str()
        .map_err(|_| IngestError::Pagination("link header is not valid UTF-8".to_string()))?;
    if raw.trim().is_empty() {
        return Ok(None);
    }

    for part in raw.split(',') {
        let mut segments = part.trim().split(';');
        let target = segments.next().unwrap_or("").trim();
        if !(target.starts_with('<') && target.ends_with('>')) {
            return Err(IngestError::Pagination(format!(
                "malformed link header segment: {part}"
            )));
        }
        let url = &target[1..target.len() - 1];
        if segments
            .map(str::trim)
            .any(|param| param == "rel=\"next\"" || param == "rel=next")
        {
            return Ok(Some(url.to_string()));
        }
    }

    Ok(None)
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}
