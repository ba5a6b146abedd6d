//! The contribution record shared by every source and the sink.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Category of a contribution.
///
/// Stored and logged in kebab-case string form (`blog`, `talk`,
/// `pull-request`, `attendance`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ContributionType {
    Blog,
    Talk,
    PullRequest,
    Attendance,
}

impl ContributionType {
    /// The storage representation of this category.
    pub fn as_str(self) -> &'static str {
        match self {
            ContributionType::Blog => "blog",
            ContributionType::Talk => "talk",
            ContributionType::PullRequest => "pull-request",
            ContributionType::Attendance => "attendance",
        }
    }
}

impl std::fmt::Display for ContributionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ContributionType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "blog" => Ok(ContributionType::Blog),
            "talk" => Ok(ContributionType::Talk),
            "pull-request" => Ok(ContributionType::PullRequest),
            "attendance" => Ok(ContributionType::Attendance),
            _ => Err(anyhow::anyhow!("Invalid contribution type: {}", s)),
        }
    }
}

/// One unit of recognized external activity.
///
/// Constructed transiently by a source during one ingestion pass and
/// immutable afterwards. A contribution has no identity beyond its fields;
/// deduplication happens at the sink via the natural key
/// `(guid, kind, scraper_id)`.
///
/// Field order matches the sink column order:
/// `(guid, author, title, date, unit, type, scraper_id, url)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contribution {
    /// Stable natural identifier, defined by the producing source
    pub guid: String,

    /// Display name of the contributor
    pub author: String,

    /// Title of the contribution
    pub title: String,

    /// When the contribution happened; always carried in UTC
    pub date: DateTime<Utc>,

    /// Organizational classification, when a source can derive one
    pub unit: Option<String>,

    /// Contribution category
    #[serde(rename = "type")]
    pub kind: ContributionType,

    /// Identifier of the source that produced this record; the watermark
    /// partition key
    pub scraper_id: String,

    /// Provenance link, when available
    pub url: Option<String>,
}

impl Contribution {
    /// Whether this record may be handed to the sink.
    ///
    /// A record is valid only when `guid`, `author`, `title` and
    /// `scraper_id` are non-empty. The "date must carry a UTC offset"
    /// invariant is discharged by the `DateTime<Utc>` type.
    pub fn is_valid(&self) -> bool {
        !self.guid.is_empty()
            && !self.author.is_empty()
            && !self.title.is_empty()
            && !self.scraper_id.is_empty()
    }
}

impl std::fmt::Display for Contribution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "({}, {}, {}, {}, {}, {}, {}, {})",
            self.guid,
            self.author,
            self.title,
            self.date.to_rfc3339(),
            self.unit.as_deref().unwrap_or(""),
            self.kind,
            self.scraper_id,
            self.url.as_deref().unwrap_or(""),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample() -> Contribution {
        Contribution {
            guid: "https://example.com/1".to_string(),
            author: "Jane Doe".to_string(),
            title: "A post".to_string(),
            date: Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
            unit: Some("cloud".to_string()),
            kind: ContributionType::Blog,
            scraper_id: "example.com/blog".to_string(),
            url: Some("https://example.com/1".to_string()),
        }
    }

    #[test]
    fn valid_when_all_required_fields_present() {
        assert!(sample().is_valid());
    }

    #[test]
    fn invalid_when_any_required_field_empty() {
        let mut c = sample();
        c.guid = String::new();
        assert!(!c.is_valid());

        let mut c = sample();
        c.author = String::new();
        assert!(!c.is_valid());

        let mut c = sample();
        c.title = String::new();
        assert!(!c.is_valid());

        let mut c = sample();
        c.scraper_id = String::new();
        assert!(!c.is_valid());
    }

    #[test]
    fn valid_without_unit_and_url() {
        let mut c = sample();
        c.unit = None;
        c.url = None;
        assert!(c.is_valid());
    }

    #[test]
    fn type_string_round_trip() {
        for kind in [
            ContributionType::Blog,
            ContributionType::Talk,
            ContributionType::PullRequest,
            ContributionType::Attendance,
        ] {
            let parsed: ContributionType = kind.as_str().parse().unwrap();
            assert_eq!(parsed, kind);
        }
        assert!("keynote".parse::<ContributionType>().is_err());
    }
}
