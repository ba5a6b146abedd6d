//! Loader orchestration behavior.

mod support;

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use futures::stream;
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use authority_common::{Contribution, ContributionType};
use authority_ingest::config::IngestConfig;
use authority_ingest::error::IngestError;
use authority_ingest::loader::Loader;
use authority_ingest::sink::Sink;
use authority_ingest::sources::rss::RssSource;
use authority_ingest::sources::wordpress::WordpressSource;
use authority_ingest::sources::{ContributionStream, Source};

use support::{contribution, MemorySink};

/// Emits a fixed set of rows, ignoring the watermark.
struct StaticSource {
    name: &'static str,
    scraper_id: &'static str,
    rows: Vec<Contribution>,
}

impl Source for StaticSource {
    fn name(&self) -> String {
        self.name.to_string()
    }

    fn scraper_id(&self) -> &'static str {
        self.scraper_id
    }

    fn contribution_type(&self) -> ContributionType {
        ContributionType::Blog
    }

    fn feed<'a>(&'a self, _sink: &'a dyn Sink) -> ContributionStream<'a> {
        Box::pin(stream::iter(self.rows.clone().into_iter().map(Ok)))
    }
}

/// Fails while its stream is being drained.
struct FailingSource;

impl Source for FailingSource {
    fn name(&self) -> String {
        "broken".to_string()
    }

    fn scraper_id(&self) -> &'static str {
        "broken.example.com"
    }

    fn contribution_type(&self) -> ContributionType {
        ContributionType::Blog
    }

    fn feed<'a>(&'a self, _sink: &'a dyn Sink) -> ContributionStream<'a> {
        Box::pin(stream::iter(vec![Err(IngestError::Payload(
            "upstream fell over".to_string(),
        ))]))
    }
}

fn static_source(
    name: &'static str,
    scraper_id: &'static str,
    guids: &[&str],
) -> Box<dyn Source> {
    let date = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
    Box::new(StaticSource {
        name,
        scraper_id,
        rows: guids
            .iter()
            .map(|g| contribution(g, "Jane Doe", date, ContributionType::Blog, scraper_id))
            .collect(),
    })
}

#[tokio::test]
async fn clean_run_reports_all_outcomes() {
    let sink = Arc::new(MemorySink::new());
    let sources: Vec<Box<dyn Source>> = vec![
        static_source("alpha", "alpha.example.com", &["a1", "a2"]),
        static_source("beta", "beta.example.com", &["b1"]),
    ];

    let outcomes = Loader::new(sink.clone(), sources).run().await.unwrap();

    assert_eq!(outcomes.len(), 2);
    assert_eq!((outcomes[0].name.as_str(), outcomes[0].count), ("alpha", 2));
    assert_eq!((outcomes[1].name.as_str(), outcomes[1].count), ("beta", 1));
    assert_eq!(sink.rows().len(), 3);
}

#[tokio::test]
async fn failing_source_does_not_abort_the_run() {
    let sink = Arc::new(MemorySink::new());
    let sources: Vec<Box<dyn Source>> = vec![
        static_source("alpha", "alpha.example.com", &["a1", "a2"]),
        Box::new(FailingSource),
        static_source("beta", "beta.example.com", &["b1"]),
    ];

    let err = Loader::new(sink.clone(), sources).run().await.unwrap_err();

    // Every source ran; the failure is reported once, with a zero count.
    assert_eq!(err.outcomes.len(), 3);
    assert_eq!((err.outcomes[0].name.as_str(), err.outcomes[0].count), ("alpha", 2));
    assert_eq!((err.outcomes[1].name.as_str(), err.outcomes[1].count), ("broken", 0));
    assert_eq!((err.outcomes[2].name.as_str(), err.outcomes[2].count), ("beta", 1));
    assert!(matches!(err.last, IngestError::Payload(_)));

    // Rows from the sources around the failure are persisted.
    assert_eq!(sink.rows().len(), 3);
}

const FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0" xmlns:dc="http://purl.org/dc/elements/1.1/">
  <channel>
    <title>feed</title>
    <item>
      <title>Feed post</title>
      <link>https://feed.example.com/post</link>
      <guid>https://feed.example.com/post</guid>
      <pubDate>Fri, 01 Mar 2024 10:00:00 +0000</pubDate>
      <dc:creator>John Roe</dc:creator>
    </item>
  </channel>
</rss>"#;

#[tokio::test]
async fn second_run_against_unchanged_upstreams_counts_zero() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/wp-json/wp/v2/posts"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([
                    {
                        "guid": {"rendered": "p1"},
                        "title": {"rendered": "First"},
                        "link": "https://blog.example.com/p1",
                        "date_gmt": "2024-03-01T10:00:00",
                        "_embedded": {"author": [{"id": 7, "name": "Jane Doe"}]}
                    },
                    {
                        "guid": {"rendered": "p2"},
                        "title": {"rendered": "Second"},
                        "link": "https://blog.example.com/p2",
                        "date_gmt": "2024-03-02T10:00:00",
                        "_embedded": {"author": [{"id": 7, "name": "Jane Doe"}]}
                    }
                ]))
                .insert_header("X-WP-TotalPages", "1"),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/feed.xml"))
        .respond_with(ResponseTemplate::new(200).set_body_string(FEED))
        .mount(&server)
        .await;

    let config = IngestConfig {
        wordpress_base_url: server.uri(),
        rss_feed_url: format!("{}/feed.xml", server.uri()),
        ..IngestConfig::default()
    };
    let sources: Vec<Box<dyn Source>> = vec![
        Box::new(WordpressSource::new(&config).unwrap()),
        Box::new(RssSource::new(&config).unwrap()),
    ];
    let sink = Arc::new(MemorySink::new());
    let loader = Loader::new(sink.clone(), sources);

    let first = loader.run().await.unwrap();
    assert_eq!(first.iter().map(|o| o.count).collect::<Vec<_>>(), vec![2, 1]);

    // Nothing changed upstream: every watermark now sits on the newest
    // record, so the second run drains nothing.
    let second = loader.run().await.unwrap();
    assert!(second.iter().all(|o| o.count == 0));
    assert_eq!(sink.rows().len(), 3);
}

#[tokio::test]
async fn empty_feed_is_a_successful_noop() {
    let sink = Arc::new(MemorySink::new());
    let sources: Vec<Box<dyn Source>> = vec![static_source("alpha", "alpha.example.com", &[])];

    let outcomes = Loader::new(sink.clone(), sources).run().await.unwrap();

    assert_eq!(outcomes[0].count, 0);
    assert!(sink.rows().is_empty());
}
