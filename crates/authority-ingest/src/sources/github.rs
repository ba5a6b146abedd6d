//! Merged pull requests of organization members, via the GitHub REST API.
//!
//! Enumerates the organization's members, then walks the issue search API
//! per member with the query
//! `is:pr is:merged closed:>{watermark} author:{login}`. Both listings are
//! paginated through the `Link` response header and subject to the shared
//! rate-limit quota, so all requests go through [`RateLimitedClient`].
//!
//! Two exclusions apply on top of the search query:
//!
//! - pull requests on a repository owned by their own author are not
//!   counted as contributions
//! - pull requests closed on the current UTC day are left for the next run,
//!   since their closure may not be fully indexed upstream yet

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use futures::stream::{self, TryStreamExt};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use authority_common::{Contribution, ContributionType, IngestWindow};

use crate::config::IngestConfig;
use crate::error::{IngestError, Result};
use crate::pagination::{PageCursor, RateLimitedClient};
use crate::sink::{Sink, WatermarkFilter};
use crate::sources::{flatten_batches, ContributionStream, Source};

pub const SCRAPER_ID: &str = "github.com/binxio";

#[derive(Debug, Deserialize)]
struct Member {
    login: String,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    url: String,
    title: String,
    closed_at: Option<String>,
}

/// GitHub pull request scraper.
pub struct GithubPullRequests {
    client: RateLimitedClient,
    api_url: String,
    org: String,
    // Display names per login, valid for one process lifetime.
    user_names: Mutex<HashMap<String, String>>,
}

struct ActiveSearch<'a> {
    login: String,
    author: String,
    cursor: PageCursor<'a>,
}

struct FeedState<'a> {
    members: PageCursor<'a>,
    queue: VecDeque<String>,
    active: Option<ActiveSearch<'a>>,
}

impl GithubPullRequests {
    pub fn new(config: &IngestConfig) -> Result<Self> {
        let client = RateLimitedClient::new(
            Duration::from_secs(config.http_timeout_secs),
            config.github_token.clone(),
            Duration::from_secs(config.rate_limit_budget_secs),
        )?;
        Ok(Self {
            client,
            api_url: config.github_api_url.trim_end_matches('/').to_string(),
            org: config.github_org.clone(),
            user_names: Mutex::new(HashMap::new()),
        })
    }

    /// Earliest watermark ever considered. An empty sink must not trigger
    /// a full-history scan of the search API.
    fn watermark_floor() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2018, 1, 1, 0, 0, 0)
            .single()
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    async fn open<'a>(&'a self, sink: &'a dyn Sink) -> Result<ContributionStream<'a>> {
        let mut latest = sink
            .latest_entry(&WatermarkFilter::partition(
                ContributionType::PullRequest,
                SCRAPER_ID,
            ))
            .await?;
        if latest < Self::watermark_floor() {
            latest = Self::watermark_floor();
        }
        info!(since = %latest, org = %self.org, "reading merged pull requests");

        let window = IngestWindow::until_now(latest);
        let today = Utc::now().date_naive();

        let members = self.client.paginate(
            format!("{}/orgs/{}/members", self.api_url, self.org),
            vec![("per_page".to_string(), "100".to_string())],
        );
        let state = FeedState {
            members,
            queue: VecDeque::new(),
            active: None,
        };

        let pages = stream::try_unfold(state, move |mut state| async move {
            loop {
                if let Some(active) = state.active.as_mut() {
                    match active.cursor.next_page().await? {
                        Some(payload) => {
                            let batch = self.process_search_page(
                                &payload,
                                &active.login,
                                &active.author,
                                window,
                                today,
                            )?;
                            return Ok(Some((batch, state)));
                        }
                        None => {
                            state.active = None;
                            continue;
                        }
                    }
                }

                if let Some(login) = state.queue.pop_front() {
                    let author = self.display_name(&login).await?;
                    let query = format!(
                        "is:pr is:merged closed:>{} author:{}",
                        window.after.date_naive(),
                        login
                    );
                    let cursor = self.client.paginate(
                        format!("{}/search/issues", self.api_url),
                        vec![("q".to_string(), query)],
                    );
                    state.active = Some(ActiveSearch {
                        login,
                        author,
                        cursor,
                    });
                    continue;
                }

                match state.members.next_page().await? {
                    Some(payload) => {
                        let members: Vec<Member> = serde_json::from_value(payload)
                            .map_err(|e| {
                                IngestError::Payload(format!("unexpected members payload: {e}"))
                            })?;
                        state.queue.extend(members.into_iter().map(|m| m.login));
                    }
                    None => return Ok(None),
                }
            }
        });

        Ok(flatten_batches(pages))
    }

    fn process_search_page(
        &self,
        payload: &Value,
        login: &str,
        author: &str,
        window: IngestWindow,
        today: NaiveDate,
    ) -> Result<Vec<Contribution>> {
        let items: Vec<SearchItem> = serde_json::from_value(
            payload
                .get("items")
                .cloned()
                .unwrap_or_else(|| Value::Array(Vec::new())),
        )
        .map_err(|e| IngestError::Payload(format!("unexpected search payload: {e}")))?;

        let mut batch = Vec::new();
        for pr in items {
            let Ok(api_url) = reqwest::Url::parse(&pr.url) else {
                warn!(url = %pr.url, "pull request with unparsable url, skipping");
                continue;
            };
            if api_url.path().starts_with(&format!("/repos/{login}/")) {
                // PRs on your own repo? unfortunately they are not counted.
                debug!(url = %pr.url, "skipping pull request on author's own repository");
                continue;
            }

            let Some(closed_at) = pr
                .closed_at
                .as_deref()
                .and_then(|d| DateTime::parse_from_rfc3339(d).ok())
                .map(|d| d.with_timezone(&Utc))
            else {
                warn!(url = %pr.url, "pull request without parsable closed_at, skipping");
                continue;
            };
            if closed_at.date_naive() == today {
                // Closure may not be fully indexed upstream yet.
                continue;
            }
            if !window.contains(closed_at) {
                continue;
            }

            let repository = api_url
                .path()
                .trim_start_matches('/')
                .split('/')
                .skip(1)
                .take(2)
                .collect::<Vec<_>>()
                .join("/");

            let contribution = Contribution {
                guid: pr.url.clone(),
                author: author.to_string(),
                title: format!("{} - {}", repository, pr.title),
                date: closed_at,
                unit: Some("cloud".to_string()),
                kind: ContributionType::PullRequest,
                scraper_id: SCRAPER_ID.to_string(),
                url: Some(pr.url),
            };
            if contribution.is_valid() {
                batch.push(contribution);
            } else {
                warn!(guid = %contribution.guid, "structurally invalid pull request, skipping");
            }
        }
        Ok(batch)
    }

    async fn display_name(&self, login: &str) -> Result<String> {
        {
            let cache = self
                .user_names
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            if let Some(name) = cache.get(login) {
                return Ok(name.clone());
            }
        }

        let (payload, _) = self
            .client
            .fetch(&format!("{}/users/{}", self.api_url, login), &[])
            .await?;
        let name = match payload.get("name").and_then(Value::as_str) {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => {
                info!(login, "no display name, falling back to login");
                login.to_string()
            }
        };

        self.user_names
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(login.to_string(), name.clone());
        Ok(name)
    }
}

impl Source for GithubPullRequests {
    fn name(&self) -> String {
        "github-pull-requests".to_string()
    }

    fn scraper_id(&self) -> &'static str {
        SCRAPER_ID
    }

    fn contribution_type(&self) -> ContributionType {
        ContributionType::PullRequest
    }

    fn feed<'a>(&'a self, sink: &'a dyn Sink) -> ContributionStream<'a> {
        Box::pin(stream::once(self.open(sink)).try_flatten())
    }
}
