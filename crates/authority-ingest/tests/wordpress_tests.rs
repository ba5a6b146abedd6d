//! WordPress source behavior against a mock REST API.

mod support;

use chrono::{TimeZone, Utc};
use serde_json::json;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use authority_common::ContributionType;
use authority_ingest::config::IngestConfig;
use authority_ingest::sink::Sink;
use authority_ingest::sources::wordpress::WordpressSource;
use authority_ingest::sources::Source;

use support::{contribution, MemorySink};

fn wp_post(guid: &str, date_gmt: &str, author_name: Option<&str>) -> serde_json::Value {
    let mut post = json!({
        "guid": {"rendered": guid},
        "title": {"rendered": format!("post {guid}")},
        "link": format!("https://blog.example.com/{guid}"),
        "date_gmt": date_gmt,
        "author": 7
    });
    if let Some(name) = author_name {
        post["_embedded"] = json!({"author": [{"id": 7, "name": name}]});
    }
    post
}

fn config_for(server: &MockServer) -> IngestConfig {
    IngestConfig {
        wordpress_base_url: server.uri(),
        ..IngestConfig::default()
    }
}

#[tokio::test]
async fn pages_until_total_pages() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/wp-json/wp/v2/posts"))
        .and(query_param("page", "1"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([
                    wp_post("p1", "2024-03-01T10:00:00", Some("Jane Doe")),
                    wp_post("p2", "2024-03-02T10:00:00", Some("Jane Doe")),
                ]))
                .insert_header("X-WP-TotalPages", "2"),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/wp-json/wp/v2/posts"))
        .and(query_param("page", "2"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([wp_post("p3", "2024-03-03T10:00:00", Some("John Roe"))]))
                .insert_header("X-WP-TotalPages", "2"),
        )
        .mount(&server)
        .await;

    let source = WordpressSource::new(&config_for(&server)).unwrap();
    let sink = MemorySink::new();

    let count = sink.load(source.feed(&sink)).await.unwrap();

    assert_eq!(count, 3);
    let rows = sink.rows();
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[2].author, "John Roe");
    assert_eq!(rows[0].kind, ContributionType::Blog);
    assert_eq!(rows[0].scraper_id, "xebia.com/blog");
}

#[tokio::test]
async fn watermark_cuts_already_seen_posts() {
    let server = MockServer::start().await;

    // One post exactly on the watermark, one newer.
    Mock::given(method("GET"))
        .and(path("/wp-json/wp/v2/posts"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([
                    wp_post("seen", "2024-03-01T10:00:00", Some("Jane Doe")),
                    wp_post("new", "2024-03-01T11:00:00", Some("Jane Doe")),
                ]))
                .insert_header("X-WP-TotalPages", "1"),
        )
        .mount(&server)
        .await;

    let watermark = Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap();
    let sink = MemorySink::preloaded(vec![contribution(
        "seen",
        "Jane Doe",
        watermark,
        ContributionType::Blog,
        "xebia.com/blog",
    )]);

    let source = WordpressSource::new(&config_for(&server)).unwrap();
    let count = sink.load(source.feed(&sink)).await.unwrap();

    // Strict boundary: the post on the watermark is not re-ingested.
    assert_eq!(count, 1);
    assert_eq!(sink.rows().len(), 2);

    // The watermark is also pushed down to the server.
    let requests = server.received_requests().await.unwrap();
    assert!(requests.iter().any(|r| {
        r.url
            .query_pairs()
            .any(|(k, v)| k == "after" && v == "2024-03-01T10:00:00")
    }));
}

#[tokio::test]
async fn author_is_resolved_via_users_endpoint_when_not_embedded() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/wp-json/wp/v2/posts"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([wp_post("p1", "2024-03-01T10:00:00", None)]))
                .insert_header("X-WP-TotalPages", "1"),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/wp-json/wp/v2/users"))
        .and(query_param("search", "7"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!([{"id": 7, "name": "Jane Doe"}])),
        )
        .mount(&server)
        .await;

    let source = WordpressSource::new(&config_for(&server)).unwrap();
    let sink = MemorySink::new();

    let count = sink.load(source.feed(&sink)).await.unwrap();

    assert_eq!(count, 1);
    assert_eq!(sink.rows()[0].author, "Jane Doe");
}

#[tokio::test]
async fn malformed_post_is_skipped_not_fatal() {
    let server = MockServer::start().await;

    // One healthy post, one with no date_gmt at all, one with garbage in it.
    let mut undated = wp_post("undated", "", Some("Jane Doe"));
    undated.as_object_mut().unwrap().remove("date_gmt");
    let page = json!([
        wp_post("good", "2024-03-01T10:00:00", Some("Jane Doe")),
        undated,
        wp_post("garbled", "not a date", Some("Jane Doe")),
    ]);
    Mock::given(method("GET"))
        .and(path("/wp-json/wp/v2/posts"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(page)
                .insert_header("X-WP-TotalPages", "1"),
        )
        .mount(&server)
        .await;

    let source = WordpressSource::new(&config_for(&server)).unwrap();
    let sink = MemorySink::new();

    // The broken posts are dropped with a warning; the healthy one loads.
    let count = sink.load(source.feed(&sink)).await.unwrap();

    assert_eq!(count, 1);
    assert_eq!(sink.rows()[0].guid, "good");
}

#[tokio::test]
async fn second_run_loads_nothing_new() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/wp-json/wp/v2/posts"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([
                    wp_post("p1", "2024-03-01T10:00:00", Some("Jane Doe")),
                    wp_post("p2", "2024-03-02T10:00:00", Some("Jane Doe")),
                ]))
                .insert_header("X-WP-TotalPages", "1"),
        )
        .mount(&server)
        .await;

    let source = WordpressSource::new(&config_for(&server)).unwrap();
    let sink = MemorySink::new();

    let first = sink.load(source.feed(&sink)).await.unwrap();
    let second = sink.load(source.feed(&sink)).await.unwrap();

    assert_eq!(first, 2);
    assert_eq!(second, 0);
    assert_eq!(sink.rows().len(), 2);
}
