//! Blog posts from a WordPress REST API.
//!
//! Pages through `/wp-json/wp/v2/posts` in ascending date order, bounded by
//! the `X-WP-TotalPages` response header. The `after` query parameter
//! pushes the watermark down to the server; the window is still enforced
//! client-side so the strict-boundary policy does not depend on upstream
//! interpretation.

use std::time::Duration;

use chrono::NaiveDateTime;
use futures::stream::{self, TryStreamExt};
use reqwest::header::{ACCEPT, USER_AGENT};
use serde::Deserialize;
use tracing::{error, info, warn};

use authority_common::{Contribution, ContributionType, IngestWindow};

use crate::config::IngestConfig;
use crate::error::{IngestError, Result};
use crate::sink::{Sink, WatermarkFilter};
use crate::sources::{flatten_batches, ContributionStream, Source};

pub const SCRAPER_ID: &str = "xebia.com/blog";

const PER_PAGE: u32 = 50;

// Every field optional: a single malformed post must not fail the page.
#[derive(Debug, Deserialize)]
struct WpPost {
    guid: Option<Rendered>,
    title: Option<Rendered>,
    link: Option<String>,
    date_gmt: Option<String>,
    author: Option<u64>,
    #[serde(rename = "_embedded")]
    embedded: Option<WpEmbedded>,
}

#[derive(Debug, Deserialize)]
struct Rendered {
    #[serde(default)]
    rendered: String,
}

#[derive(Debug, Deserialize)]
struct WpEmbedded {
    #[serde(default)]
    author: Vec<WpUser>,
}

#[derive(Debug, Deserialize)]
struct WpUser {
    id: Option<u64>,
    name: Option<String>,
}

/// WordPress blog scraper.
pub struct WordpressSource {
    client: reqwest::Client,
    base_url: String,
    username: Option<String>,
    password: Option<String>,
}

impl WordpressSource {
    pub fn new(config: &IngestConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.http_timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: config.wordpress_base_url.trim_end_matches('/').to_string(),
            username: config.wordpress_username.clone(),
            password: config.wordpress_password.clone(),
        })
    }

    async fn open<'a>(&'a self, sink: &'a dyn Sink) -> Result<ContributionStream<'a>> {
        let latest = sink
            .latest_entry(&WatermarkFilter::partition(ContributionType::Blog, SCRAPER_ID))
            .await?;
        info!(since = %latest, url = %self.base_url, "reading new blog posts");

        let window = IngestWindow::until_now(latest);
        let after = latest.naive_utc().format("%Y-%m-%dT%H:%M:%S").to_string();

        let pages = stream::try_unfold((1u32, 1u32), move |(page, total_pages)| {
            let after = after.clone();
            async move {
                if page > total_pages {
                    return Ok(None);
                }
                let (posts, total_pages) = self.fetch_page(page, &after).await?;
                let mut batch = Vec::new();
                for post in posts {
                    self.process_post(post, window, &mut batch).await?;
                }
                Ok(Some((batch, (page + 1, total_pages))))
            }
        });

        Ok(flatten_batches(pages))
    }

    async fn fetch_page(&self, page: u32, after: &str) -> Result<(Vec<WpPost>, u32)> {
        let url = format!("{}/wp-json/wp/v2/posts", self.base_url);
        let mut request = self
            .client
            .get(&url)
            .query(&[
                ("page", page.to_string()),
                ("per_page", PER_PAGE.to_string()),
                ("order", "asc".to_string()),
                ("orderby", "date".to_string()),
                ("after", after.to_string()),
                ("_embed", "author".to_string()),
            ])
            .header(USER_AGENT, "curl")
            .header(ACCEPT, "application/json");
        if let (Some(user), Some(password)) = (&self.username, &self.password) {
            request = request.basic_auth(user, Some(password));
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(IngestError::Upstream { status, url, body });
        }

        let total_pages = response
            .headers()
            .get("X-WP-TotalPages")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u32>().ok())
            .ok_or_else(|| {
                IngestError::Pagination("missing or malformed X-WP-TotalPages header".to_string())
            })?;

        let posts: Vec<WpPost> = response.json().await?;
        Ok((posts, total_pages))
    }

    async fn process_post(
        &self,
        post: WpPost,
        window: IngestWindow,
        batch: &mut Vec<Contribution>,
    ) -> Result<()> {
        let link = post.link.clone().unwrap_or_default();
        let Some(published) = post
            .date_gmt
            .as_deref()
            .and_then(|d| NaiveDateTime::parse_from_str(d, "%Y-%m-%dT%H:%M:%S").ok())
            .map(|d| d.and_utc())
        else {
            warn!(link = %link, "blog post without parsable date_gmt, skipping");
            return Ok(());
        };
        if !window.contains(published) {
            return Ok(());
        }

        let mut authors: Vec<String> = post
            .embedded
            .as_ref()
            .map(|e| e.author.iter().filter_map(|a| a.name.clone()).collect())
            .unwrap_or_default();
        if authors.is_empty() {
            if let Some(author_id) = post.author {
                authors = self.author_names_by_id(author_id).await?;
            }
        }
        if authors.is_empty() {
            warn!(link = %link, "blog post without author, skipping");
            return Ok(());
        }

        let guid = post.guid.map(|g| g.rendered).unwrap_or_default();
        let title = post.title.map(|t| t.rendered).unwrap_or_default();
        for author in authors {
            let contribution = Contribution {
                guid: guid.clone(),
                author,
                title: title.clone(),
                date: published,
                unit: None,
                kind: ContributionType::Blog,
                scraper_id: SCRAPER_ID.to_string(),
                url: post.link.clone(),
            };
            if contribution.is_valid() {
                batch.push(contribution);
            } else {
                warn!(link = %link, "structurally invalid blog post, skipping");
            }
        }
        Ok(())
    }

    /// Resolves an author display name via the users endpoint when a post
    /// carries no embedded author. Lookup failures are not fatal; the post
    /// is skipped instead.
    async fn author_names_by_id(&self, author_id: u64) -> Result<Vec<String>> {
        let url = format!("{}/wp-json/wp/v2/users", self.base_url);
        let mut request = self
            .client
            .get(&url)
            .query(&[("search", author_id.to_string())])
            .header(USER_AGENT, "curl")
            .header(ACCEPT, "application/json");
        if let (Some(user), Some(password)) = (&self.username, &self.password) {
            request = request.basic_auth(user, Some(password));
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            error!(author_id, status = %response.status(), "could not get author by id");
            return Ok(Vec::new());
        }

        let users: Vec<WpUser> = response.json().await?;
        Ok(users
            .into_iter()
            .filter(|u| u.id == Some(author_id))
            .filter_map(|u| u.name)
            .collect())
    }
}

impl Source for WordpressSource {
    fn name(&self) -> String {
        "xebia.com".to_string()
    }

    fn scraper_id(&self) -> &'static str {
        SCRAPER_ID
    }

    fn contribution_type(&self) -> ContributionType {
        ContributionType::Blog
    }

    fn feed<'a>(&'a self, sink: &'a dyn Sink) -> ContributionStream<'a> {
        Box::pin(stream::once(self.open(sink)).try_flatten())
    }
}
