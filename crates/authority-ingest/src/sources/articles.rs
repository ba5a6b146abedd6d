//! Articles from the xebia.com articles feed.
//!
//! Same wire format as the blog feed, with two differences: items are
//! emitted in ascending publish order regardless of feed order, and a
//! nameless author entry skips only that author, not the whole item.

use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::stream::{self, TryStreamExt};
use tracing::{info, warn};

use authority_common::{Contribution, ContributionType, IngestWindow};

use crate::config::IngestConfig;
use crate::error::{IngestError, Result};
use crate::sink::{Sink, WatermarkFilter};
use crate::sources::rss::{Rss, RssItem};
use crate::sources::{ContributionStream, Source};

pub const SCRAPER_ID: &str = "articles.xebia.com";

/// Articles feed scraper.
pub struct ArticleSource {
    client: reqwest::Client,
    feed_url: String,
}

impl ArticleSource {
    pub fn new(config: &IngestConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.http_timeout_secs))
            .build()?;
        Ok(Self {
            client,
            feed_url: config.articles_feed_url.clone(),
        })
    }

    async fn open<'a>(&'a self, sink: &'a dyn Sink) -> Result<ContributionStream<'a>> {
        let latest = sink
            .latest_entry(&WatermarkFilter::partition(ContributionType::Blog, SCRAPER_ID))
            .await?;
        info!(since = %latest, url = %self.feed_url, "reading new articles from feed");
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

        let contributions = parse_articles(&xml, window)?;
        Ok(Box::pin(stream::iter(contributions.into_iter().map(Ok))))
    }
}

fn parse_articles(xml: &str, window: IngestWindow) -> Result<Vec<Contribution>> {
    let rss: Rss = quick_xml::de::from_str(xml)
        .map_err(|e| IngestError::Payload(format!("parsing articles feed: {e}")))?;

    let mut dated: Vec<(DateTime<Utc>, RssItem)> = Vec::new();
    for item in rss.channel.items {
        let Some(published) = item
            .pub_date
            .as_deref()
            .and_then(|d| DateTime::parse_from_rfc2822(d).ok())
            .map(|d| d.with_timezone(&Utc))
        else {
            let link = item.link.as_deref().unwrap_or_default();
            warn!(link, "article without parsable pubDate, skipping");
            continue;
        };
        dated.push((published, item));
    }
    // The feed carries newest-first; the watermark expects ascending dates.
    dated.sort_by_key(|(published, _)| *published);

    let mut contributions = Vec::new();
    for (published, item) in dated {
        if !window.contains(published) {
            continue;
        }

        let guid = item.guid.and_then(|g| g.value).unwrap_or_default();
        let title = item.title.unwrap_or_default();
        for author in &item.creators {
            if author.is_empty() {
                warn!(guid = %guid, "article author without a name, skipping");
                continue;
            }
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
                warn!(guid = %guid, "structurally invalid article, skipping");
            }
        }
    }
    Ok(contributions)
}

impl Source for ArticleSource {
    fn name(&self) -> String {
        "articles.xebia.com".to_string()
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

#[cfg(test)]
mod tests {
    use super::*;
    use authority_common::watermark::sentinel_min;

    const FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0" xmlns:dc="http://purl.org/dc/elements/1.1/">
  <channel>
    <title>xebia articles</title>
    <item>
      <title>Newest article</title>
      <link>https://articles.xebia.com/newest</link>
      <guid>https://articles.xebia.com/newest</guid>
      <pubDate>Sun, 03 Mar 2024 10:00:00 +0000</pubDate>
      <dc:creator>Jane Doe</dc:creator>
    </item>
    <item>
      <title>Older article</title>
      <link>https://articles.xebia.com/older</link>
      <guid>https://articles.xebia.com/older</guid>
      <pubDate>Fri, 01 Mar 2024 10:00:00 +0000</pubDate>
      <dc:creator>John Roe</dc:creator>
    </item>
    <item>
      <title>Half credited</title>
      <link>https://articles.xebia.com/half</link>
      <guid>https://articles.xebia.com/half</guid>
      <pubDate>Sat, 02 Mar 2024 10:00:00 +0000</pubDate>
      <dc:creator></dc:creator>
      <dc:creator>Jane Doe</dc:creator>
    </item>
  </channel>
</rss>"#;

    #[test]
    fn articles_are_emitted_in_ascending_date_order() {
        let window = IngestWindow::until_now(sentinel_min());
        let contributions = parse_articles(FEED, window).unwrap();
        assert_eq!(contributions.len(), 3);
        assert_eq!(contributions[0].guid, "https://articles.xebia.com/older");
        assert_eq!(contributions[1].guid, "https://articles.xebia.com/half");
        assert_eq!(contributions[2].guid, "https://articles.xebia.com/newest");
        assert!(contributions.windows(2).all(|w| w[0].date <= w[1].date));
    }

    #[test]
    fn nameless_author_skips_only_that_author() {
        let window = IngestWindow::until_now(sentinel_min());
        let contributions = parse_articles(FEED, window).unwrap();
        let half: Vec<_> = contributions
            .iter()
            .filter(|c| c.guid.ends_with("/half"))
            .collect();
        assert_eq!(half.len(), 1);
        assert_eq!(half[0].author, "Jane Doe");
    }

    #[test]
    fn watermark_cuts_older_articles() {
        let window = IngestWindow {
            after: DateTime::parse_from_rfc2822("Sat, 02 Mar 2024 10:00:00 +0000")
                .unwrap()
                .with_timezone(&Utc),
            before: Utc::now(),
        };
        let contributions = parse_articles(FEED, window).unwrap();
        assert_eq!(contributions.len(), 1);
        assert_eq!(contributions[0].guid, "https://articles.xebia.com/newest");
    }
}
