//! Talks and attendance from the session store.
//!
//! The store exposes an events/sessions hierarchy over REST: events are
//! listed since a start instant, each event has a `sessions-public`
//! collection, and attendance lives under `sessions-private`. Two sources
//! read it: [`SessionSource`] turns public sessions into talks,
//! [`AttendeeSource`] turns their attendance lists into attendance records.
//!
//! Events are prefiltered from the start of the watermark day, since the
//! store filters events, not sessions. Sessions earlier on that day are cut
//! by the window filter.

use std::collections::VecDeque;
use std::sync::OnceLock;
use std::time::Duration;

use chrono::{DateTime, NaiveTime, Utc};
use futures::stream::{self, TryStreamExt};
use regex::Regex;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, info, warn};

use authority_common::{Contribution, ContributionType, IngestWindow};

use crate::config::IngestConfig;
use crate::error::{IngestError, Result};
use crate::sink::{Sink, WatermarkFilter};
use crate::sources::{flatten_batches, ContributionStream, Source};

pub const SESSION_SCRAPER_ID: &str = "xke.xebia.com";
pub const ATTENDEE_SCRAPER_ID: &str = "attendees.xebia.com";

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Event {
    id: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Session {
    id: String,
    title: Option<String>,
    presenter: Option<String>,
    start_time: Option<DateTime<Utc>>,
    slug: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Attendee {
    id: String,
    name: Option<String>,
}

fn session_url(event_id: &str, session: &Session) -> String {
    format!(
        "https://xke.xebia.com/event/{}/{}/{}",
        event_id,
        session.id,
        session.slug.as_deref().unwrap_or_default()
    )
}

/// REST client for the events/sessions document store.
#[derive(Clone)]
pub struct SessionStore {
    client: reqwest::Client,
    base_url: String,
}

impl SessionStore {
    pub fn new(config: &IngestConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.http_timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: config.session_store_url.trim_end_matches('/').to_string(),
        })
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: String,
        params: &[(String, String)],
    ) -> Result<T> {
        let mut request = self.client.get(&url);
        if !params.is_empty() {
            request = request.query(params);
        }
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(IngestError::Upstream { status, url, body });
        }
        Ok(response.json().await?)
    }

    /// Events starting at or after `start`, in `startTime` order.
    async fn events_since(&self, start: DateTime<Utc>) -> Result<Vec<Event>> {
        self.get_json(
            format!("{}/events", self.base_url),
            &[
                ("startTime.gte".to_string(), start.to_rfc3339()),
                ("orderBy".to_string(), "startTime".to_string()),
            ],
        )
        .await
    }

    async fn public_sessions(&self, event_id: &str) -> Result<Vec<Session>> {
        self.get_json(
            format!("{}/events/{}/sessions-public", self.base_url, event_id),
            &[],
        )
        .await
    }

    async fn session_attendees(&self, event_id: &str, session_id: &str) -> Result<Vec<Attendee>> {
        self.get_json(
            format!(
                "{}/events/{}/sessions-private/{}/attendees",
                self.base_url, event_id, session_id
            ),
            &[],
        )
        .await
    }
}

/// The start of the watermark's UTC day, for the event-level prefilter.
fn day_start(latest: DateTime<Utc>) -> DateTime<Utc> {
    latest.date_naive().and_time(NaiveTime::MIN).and_utc()
}

/// Splits a free-text presenter field into individual names.
///
/// Sessions are entered by hand, so the field carries every convention the
/// presenters could think of: separators, conjunctions in two languages,
/// titles with dots, parenthesized remarks and "organised by" prefixes.
pub(crate) fn split_presenters(presenter: &str) -> Vec<String> {
    static BRACKETS: OnceLock<Regex> = OnceLock::new();
    static ORGANIZED_BY: OnceLock<Regex> = OnceLock::new();
    static SEPARATORS: OnceLock<Regex> = OnceLock::new();

    let brackets =
        BRACKETS.get_or_init(|| Regex::new(r"\([^)]*\)").expect("hard-coded regex"));
    let organized_by = ORGANIZED_BY
        .get_or_init(|| Regex::new(r"(?i)organi[sz]ed\s+by\s*").expect("hard-coded regex"));
    let separators = SEPARATORS
        .get_or_init(|| Regex::new(r"- | -|,|&+|/| en | and ").expect("hard-coded regex"));

    let cleaned = presenter.replace('.', "");
    let cleaned = brackets.replace_all(&cleaned, "");
    let cleaned = cleaned.replace(" vd ", " van de ");
    let cleaned = organized_by.replace_all(&cleaned, "");

    let names: Vec<String> = separators
        .split(&cleaned)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();
    if names.is_empty() {
        vec![cleaned.trim().to_string()]
    } else {
        names
    }
}

/// Public session (talk) scraper.
pub struct SessionSource {
    store: SessionStore,
}

impl SessionSource {
    pub fn new(config: &IngestConfig) -> Result<Self> {
        Ok(Self {
            store: SessionStore::new(config)?,
        })
    }

    async fn open<'a>(&'a self, sink: &'a dyn Sink) -> Result<ContributionStream<'a>> {
        let latest = sink
            .latest_entry(&WatermarkFilter::partition(
                ContributionType::Talk,
                SESSION_SCRAPER_ID,
            ))
            .await?;
        info!(since = %latest, "reading new sessions from the session store");
        let window = IngestWindow::until_now(latest);

        let events: VecDeque<Event> = self.store.events_since(day_start(latest)).await?.into();

        let pages = stream::try_unfold(events, move |mut events| async move {
            let Some(event) = events.pop_front() else {
                return Ok(None);
            };
            let batch = self.event_talks(&event, window).await?;
            Ok(Some((batch, events)))
        });
        Ok(flatten_batches(pages))
    }

    async fn event_talks(&self, event: &Event, window: IngestWindow) -> Result<Vec<Contribution>> {
        let mut sessions = self.store.public_sessions(&event.id).await?;
        // Sessions arrive in document order; emit them by start time so the
        // watermark only ever moves forward within an event.
        sessions.sort_by_key(|s| s.start_time);

        let mut batch = Vec::new();
        for session in sessions {
            if session.id.ends_with("-protected") {
                debug!(event = %event.id, session = %session.id, "protected session, skipping");
                continue;
            }
            let Some(start) = session.start_time else {
                warn!(event = %event.id, session = %session.id, "session without startTime, skipping");
                continue;
            };
            if !window.contains(start) {
                continue;
            }
            let Some(presenter) = session.presenter.as_deref().filter(|p| !p.is_empty()) else {
                warn!(event = %event.id, session = %session.id, "session without presenter, skipping");
                continue;
            };
            let Some(title) = session.title.as_deref().filter(|t| !t.is_empty()) else {
                warn!(event = %event.id, session = %session.id, "session without title, skipping");
                continue;
            };

            let url = session_url(&event.id, &session);
            for author in split_presenters(presenter) {
                let contribution = Contribution {
                    guid: url.clone(),
                    author,
                    title: title.to_string(),
                    date: start,
                    unit: None,
                    kind: ContributionType::Talk,
                    scraper_id: SESSION_SCRAPER_ID.to_string(),
                    url: Some(url.clone()),
                };
                if contribution.is_valid() {
                    batch.push(contribution);
                } else {
                    warn!(guid = %contribution.guid, "structurally invalid session, skipping");
                }
            }
        }
        Ok(batch)
    }
}

impl Source for SessionSource {
    fn name(&self) -> String {
        "session-store".to_string()
    }

    fn scraper_id(&self) -> &'static str {
        SESSION_SCRAPER_ID
    }

    fn contribution_type(&self) -> ContributionType {
        ContributionType::Talk
    }

    fn feed<'a>(&'a self, sink: &'a dyn Sink) -> ContributionStream<'a> {
        Box::pin(stream::once(self.open(sink)).try_flatten())
    }
}

/// Session attendance scraper.
pub struct AttendeeSource {
    store: SessionStore,
}

impl AttendeeSource {
    pub fn new(config: &IngestConfig) -> Result<Self> {
        Ok(Self {
            store: SessionStore::new(config)?,
        })
    }

    async fn open<'a>(&'a self, sink: &'a dyn Sink) -> Result<ContributionStream<'a>> {
        let latest = sink
            .latest_entry(&WatermarkFilter::partition(
                ContributionType::Attendance,
                ATTENDEE_SCRAPER_ID,
            ))
            .await?;
        info!(since = %latest, "reading new session attendees from the session store");
        let window = IngestWindow::until_now(latest);

        let events: VecDeque<Event> = self.store.events_since(day_start(latest)).await?.into();

        let pages = stream::try_unfold(events, move |mut events| async move {
            let Some(event) = events.pop_front() else {
                return Ok(None);
            };
            let batch = self.event_attendance(&event, window).await?;
            Ok(Some((batch, events)))
        });
        Ok(flatten_batches(pages))
    }

    async fn event_attendance(
        &self,
        event: &Event,
        window: IngestWindow,
    ) -> Result<Vec<Contribution>> {
        let mut sessions = self.store.public_sessions(&event.id).await?;
        sessions.sort_by_key(|s| s.start_time);

        let mut batch = Vec::new();
        for session in sessions {
            if session.id.ends_with("-protected") {
                continue;
            }
            let Some(start) = session.start_time else {
                warn!(event = %event.id, session = %session.id, "session without startTime, skipping");
                continue;
            };
            if !window.contains(start) {
                continue;
            }
            let Some(title) = session.title.as_deref().filter(|t| !t.is_empty()) else {
                warn!(event = %event.id, session = %session.id, "session without title, skipping");
                continue;
            };

            let url = session_url(&event.id, &session);
            for attendee in self.store.session_attendees(&event.id, &session.id).await? {
                let Some(name) = attendee.name.as_deref().filter(|n| !n.is_empty()) else {
                    warn!(event = %event.id, session = %session.id, attendee = %attendee.id,
                        "attendee without name, skipping");
                    continue;
                };
                let contribution = Contribution {
                    guid: format!("{}/{}/{}", event.id, session.id, attendee.id),
                    author: name.to_string(),
                    title: title.to_string(),
                    date: start,
                    unit: None,
                    kind: ContributionType::Attendance,
                    scraper_id: ATTENDEE_SCRAPER_ID.to_string(),
                    url: Some(url.clone()),
                };
                if contribution.is_valid() {
                    batch.push(contribution);
                } else {
                    warn!(guid = %contribution.guid, "structurally invalid attendance, skipping");
                }
            }
        }
        Ok(batch)
    }
}

impl Source for AttendeeSource {
    fn name(&self) -> String {
        "session-attendees".to_string()
    }

    fn scraper_id(&self) -> &'static str {
        ATTENDEE_SCRAPER_ID
    }

    fn contribution_type(&self) -> ContributionType {
        ContributionType::Attendance
    }

    fn feed<'a>(&'a self, sink: &'a dyn Sink) -> ContributionStream<'a> {
        Box::pin(stream::once(self.open(sink)).try_flatten())
    }
}
