//! Vlogs from a fixed set of YouTube channels, via the Data API.
//!
//! Each channel's uploads playlist is resolved through the `channels`
//! endpoint and read through `playlistItems`, newest first. Records are
//! stamped and watermarked per channel (`youtube.com/{username}`), so
//! adding a channel never disturbs the others' watermarks; the registry
//! identity for the whole source stays `youtube.com`.

use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::stream;
use serde::Deserialize;
use tracing::{info, warn};

use authority_common::{Contribution, ContributionType, IngestWindow};

use crate::config::IngestConfig;
use crate::error::{IngestError, Result};
use crate::sink::{Sink, WatermarkFilter};
use crate::sources::{flatten_batches, ContributionStream, Source};

pub const SCRAPER_ID: &str = "youtube.com";

const PAGE_SIZE: u32 = 50;

struct ChannelEntry {
    username: &'static str,
    author: &'static str,
    channel_id: &'static str,
}

static CHANNELS: &[ChannelEntry] = &[ChannelEntry {
    username: "@martinperez9665",
    author: "Martín Pérez Rodríguez",
    channel_id: "UC0-IFu7XWoeT-QehlXxNmiw",
}];

#[derive(Debug, Deserialize)]
struct ChannelListResponse {
    #[serde(default)]
    items: Vec<ChannelResource>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChannelResource {
    content_details: ChannelContentDetails,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChannelContentDetails {
    related_playlists: RelatedPlaylists,
}

#[derive(Debug, Deserialize)]
struct RelatedPlaylists {
    uploads: String,
}

#[derive(Debug, Deserialize)]
struct PlaylistItemsResponse {
    #[serde(default)]
    items: Vec<PlaylistItem>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlaylistItem {
    snippet: Snippet,
    content_details: ItemContentDetails,
}

#[derive(Debug, Deserialize)]
struct Snippet {
    title: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ItemContentDetails {
    video_id: String,
    video_published_at: Option<String>,
}

/// YouTube channel scraper.
pub struct YoutubeSource {
    client: reqwest::Client,
    api_url: String,
    api_key: Option<String>,
}

impl YoutubeSource {
    pub fn new(config: &IngestConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.http_timeout_secs))
            .build()?;
        Ok(Self {
            client,
            api_url: config.youtube_api_url.trim_end_matches('/').to_string(),
            api_key: config.youtube_api_key.clone(),
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: String,
        mut params: Vec<(String, String)>,
    ) -> Result<T> {
        if let Some(key) = &self.api_key {
            params.push(("key".to_string(), key.clone()));
        }
        let response = self.client.get(&url).query(&params).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(IngestError::Upstream { status, url, body });
        }
        Ok(response.json().await?)
    }

    async fn uploads_playlist(&self, channel_id: &str) -> Result<String> {
        let listing: ChannelListResponse = self
            .get_json(
                format!("{}/channels", self.api_url),
                vec![
                    ("part".to_string(), "contentDetails".to_string()),
                    ("id".to_string(), channel_id.to_string()),
                ],
            )
            .await?;
        listing
            .items
            .into_iter()
            .next()
            .map(|c| c.content_details.related_playlists.uploads)
            .ok_or_else(|| IngestError::Payload(format!("unknown channel id {channel_id}")))
    }

    async fn channel_vlogs(
        &self,
        channel: &ChannelEntry,
        sink: &dyn Sink,
    ) -> Result<Vec<Contribution>> {
        let channel_scraper_id = format!("{}/{}", SCRAPER_ID, channel.username);
        let latest = sink
            .latest_entry(&WatermarkFilter::partition(
                ContributionType::Blog,
                &channel_scraper_id,
            ))
            .await?;
        info!(since = %latest, channel = channel.username, "reading new vlogs");
        let window = IngestWindow::until_now(latest);

        let playlist_id = self.uploads_playlist(channel.channel_id).await?;
        let uploads: PlaylistItemsResponse = self
            .get_json(
                format!("{}/playlistItems", self.api_url),
                vec![
                    ("part".to_string(), "snippet,contentDetails".to_string()),
                    ("playlistId".to_string(), playlist_id),
                    ("maxResults".to_string(), PAGE_SIZE.to_string()),
                ],
            )
            .await?;

        let mut batch = Vec::new();
        for item in uploads.items {
            let Some(published) = item
                .content_details
                .video_published_at
                .as_deref()
                .and_then(|d| DateTime::parse_from_rfc3339(d).ok())
                .map(|d| d.with_timezone(&Utc))
            else {
                warn!(video = %item.content_details.video_id, "video without parsable publish date, skipping");
                continue;
            };
            if !window.contains(published) {
                continue;
            }

            let url = format!(
                "https://www.youtube.com/watch?v={}",
                item.content_details.video_id
            );
            let contribution = Contribution {
                guid: url.clone(),
                author: channel.author.to_string(),
                title: item.snippet.title,
                date: published,
                unit: None,
                kind: ContributionType::Blog,
                scraper_id: channel_scraper_id.clone(),
                url: Some(url),
            };
            if contribution.is_valid() {
                batch.push(contribution);
            } else {
                warn!(guid = %contribution.guid, "structurally invalid video, skipping");
            }
        }
        Ok(batch)
    }
}

impl Source for YoutubeSource {
    fn name(&self) -> String {
        "youtube.com".to_string()
    }

    fn scraper_id(&self) -> &'static str {
        SCRAPER_ID
    }

    fn contribution_type(&self) -> ContributionType {
        ContributionType::Blog
    }

    fn feed<'a>(&'a self, sink: &'a dyn Sink) -> ContributionStream<'a> {
        let pages = stream::try_unfold(CHANNELS.iter(), move |mut channels| async move {
            let Some(channel) = channels.next() else {
                return Ok(None);
            };
            let batch = self.channel_vlogs(channel, sink).await?;
            Ok(Some((batch, channels)))
        });
        flatten_batches(pages)
    }
}
