//! Blog posts from a syndication feed.
//!
//! One fetch, one XML document; the window filter on `pubDate` does the
//! incremental work. Items missing a date, guid, title or author are
//! structural defects and are skipped with a warning.

use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::stream::{self, TryStreamExt};
use serde::Deserialize;
use tracing::{info, warn};

use authority_common::{Contribution, ContributionType, IngestWindow};

use crate::config::IngestConfig;
use crate::error::{IngestError, Result};
use crate::sink::{Sink, WatermarkFilter};
use crate::sources::{ContributionStream, Source};

pub const SCRAPER_ID: &str = "binx.io/blog";

#[derive(Debug, Deserialize)]
pub(crate) struct Rss {
    pub(crate) channel: RssChannel,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RssChannel {
    #[serde(rename = "item", default)]
    pub(crate) items: Vec<RssItem>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RssItem {
    pub(crate) title: Option<String>,
    pub(crate) link: Option<String>,
    pub(crate) guid: Option<RssGuid>,
    #[serde(rename = "pubDate")]
    pub(crate) pub_date: Option<String>,
    #[serde(rename = "creator", default)]
    pub(crate) creators: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RssGuid {
    #[serde(rename = "$text")]
    pub(crate) value: Option<String>,
}

/// Syndication feed scraper.
pub struct RssSource {
    client: reqwest::Client,
    feed_url: String,
}

impl RssSource {
    pub fn new(config: &IngestConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.http_timeout_secs))
            .build()?;
        Ok(Self {
            client,
            feed_url: config.rss_feed_url.clone(),
        })
    }

    async fn open<'a>(&'a self, sink: &'a dyn Sink) -> Result<ContributionStream<'a>> {
        let latest = sink
            .latest_entry(&WatermarkFilter::partition(ContributionType::Blog, SCRAPER_ID))
            .await?;
        info!(since = %latest, url = %self.feed_url, "reading new blog posts from feed");
        let window = IngestWindow::until_now(latest);

        let response = self.client.get(&self.feed_url).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(IngestError::Upstream {
                status,
                url: self.feed_url.clone(),
                body,
            });
        }
        let xml = response.text().await?;

        let contributions = parse_feed(&xml, window)?;
        Ok(Box::pin(stream::iter(contributions.into_iter().map(Ok))))
    }
}

fn parse_feed(xml: &str, window: IngestWindow) -> Result<Vec<Contribution>> {
    let rss: Rss = quick_xml::de::from_str(xml)
        .map_err(|e| IngestError::Payload(format!("parsing rss feed: {e}")))?;

    let mut contributions = Vec::new();
    for item in rss.channel.items {
        let link = item.link.clone().unwrap_or_default();

        let Some(published) = item
            .pub_date
            .as_deref()
            .and_then(|d| DateTime::parse_from_rfc2822(d).ok())
            .map(|d| d.with_timezone(&Utc))
        else {
            warn!(link = %link, "feed item without parsable pubDate, skipping");
            continue;
        };
        if !window.contains(published) {
            continue;
        }

        let guid = item.guid.and_then(|g| g.value).unwrap_or_default();
        let title = item.title.unwrap_or_default();
        if item.creators.is_empty() {
            warn!(link = %link, "feed item without author, skipping");
            continue;
        }

        for author in &item.creators {
            let contribution = Contribution {
                guid: guid.clone(),
                author: author.clone(),
                title: title.clone(),
                date: published,
                unit: None,
                kind: ContributionType::Blog,
                scraper_id: SCRAPER_ID.to_string(),
                url: item.link.clone(),
            };
            if contribution.is_valid() {
                contributions.push(contribution);
            } else {
                warn!(link = %link, "structurally invalid feed item, skipping");
            }
        }
    }
    Ok(contributions)
}

impl Source for RssSource {
    fn name(&self) -> String {
        "binx.io/blog".to_string()
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
