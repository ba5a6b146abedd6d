//! Explicit registry of available sources.
//!
//! Sources are registered under their scraper id; registering the same id
//! twice is an error rather than a silent replacement. Construction is
//! deferred through factories so a run can build only the sources it was
//! asked for, with the configuration it was given.

use tracing::debug;

use crate::config::IngestConfig;
use crate::error::{IngestError, Result};
use crate::sources::articles::ArticleSource;
use crate::sources::github::GithubPullRequests;
use crate::sources::rss::RssSource;
use crate::sources::sessions::{AttendeeSource, SessionSource};
use crate::sources::wordpress::WordpressSource;
use crate::sources::youtube::YoutubeSource;
use crate::sources::Source;

/// Builds one source from the run configuration.
pub type SourceFactory = fn(&IngestConfig) -> Result<Box<dyn Source>>;

struct Entry {
    scraper_id: &'static str,
    factory: SourceFactory,
}

/// Table of registered source factories, in registration order.
#[derive(Default)]
pub struct SourceRegistry {
    entries: Vec<Entry>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// All production sources, in the order they run.
    pub fn builtin() -> Result<Self> {
        let mut registry = Self::new();
        registry.register(crate::sources::wordpress::SCRAPER_ID, |c| {
            Ok(Box::new(WordpressSource::new(c)?))
        })?;
        registry.register(crate::sources::rss::SCRAPER_ID, |c| {
            Ok(Box::new(RssSource::new(c)?))
        })?;
        registry.register(crate::sources::articles::SCRAPER_ID, |c| {
            Ok(Box::new(ArticleSource::new(c)?))
        })?;
        registry.register(crate::sources::github::SCRAPER_ID, |c| {
            Ok(Box::new(GithubPullRequests::new(c)?))
        })?;
        registry.register(crate::sources::sessions::SESSION_SCRAPER_ID, |c| {
            Ok(Box::new(SessionSource::new(c)?))
        })?;
        registry.register(crate::sources::sessions::ATTENDEE_SCRAPER_ID, |c| {
            Ok(Box::new(AttendeeSource::new(c)?))
        })?;
        registry.register(crate::sources::youtube::SCRAPER_ID, |c| {
            Ok(Box::new(YoutubeSource::new(c)?))
        })?;
        Ok(registry)
    }

    /// Registers a factory under a scraper id. A second registration under
    /// the same id is rejected.
    pub fn register(&mut self, scraper_id: &'static str, factory: SourceFactory) -> Result<()> {
        if self.entries.iter().any(|e| e.scraper_id == scraper_id) {
            return Err(IngestError::DuplicateSource(scraper_id.to_string()));
        }
        debug!(scraper_id, "registered source");
        self.entries.push(Entry {
            scraper_id,
            factory,
        });
        Ok(())
    }

    /// Registered scraper ids, in registration order.
    pub fn scraper_ids(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.entries.iter().map(|e| e.scraper_id)
    }

    /// Instantiates every registered source, in registration order.
    pub fn build_sources(&self, config: &IngestConfig) -> Result<Vec<Box<dyn Source>>> {
        self.entries.iter().map(|e| (e.factory)(config)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dummy(config: &IngestConfig) -> Result<Box<dyn Source>> {
        Ok(Box::new(RssSource::new(config)?))
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let mut registry = SourceRegistry::new();
        registry.register("example.com", dummy).unwrap();
        assert!(matches!(
            registry.register("example.com", dummy),
            Err(IngestError::DuplicateSource(id)) if id == "example.com"
        ));
    }

    #[test]
    fn registration_order_is_preserved() {
        let mut registry = SourceRegistry::new();
        registry.register("b", dummy).unwrap();
        registry.register("a", dummy).unwrap();
        registry.register("c", dummy).unwrap();
        let ids: Vec<_> = registry.scraper_ids().collect();
        assert_eq!(ids, vec!["b", "a", "c"]);
    }

    #[test]
    fn builtin_ids_are_distinct() {
        let registry = SourceRegistry::builtin().unwrap();
        assert_eq!(registry.scraper_ids().count(), 7);
    }

    #[test]
    fn build_sources_instantiates_everything() {
        let registry = SourceRegistry::builtin().unwrap();
        let sources = registry.build_sources(&IngestConfig::default()).unwrap();
        assert_eq!(sources.len(), 7);
    }
}
