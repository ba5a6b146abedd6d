//! Watermark sentinel and the ingestion window derived from it.
//!
//! A watermark is the newest already-persisted `date` for one
//! `(scraper_id, type)` partition. It is not stored as its own entity; the
//! sink derives it on demand. When a partition has no records yet the
//! sentinel minimum is returned instead of an absent value, so source logic
//! can always compare unconditionally.

use chrono::{DateTime, TimeZone, Utc};

/// The sentinel "beginning of time" watermark: `0001-01-01T00:00:00Z`.
pub fn sentinel_min() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(1, 1, 1, 0, 0, 0)
        .single()
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// The window of upstream records one ingestion pass may yield.
///
/// Both bounds are strict: a record qualifies only when
/// `after < date < before`. `after` is the watermark at the start of the
/// run; `before` is "now" at the start of the run, so records whose
/// author or timestamp might still be amended upstream on the same instant
/// are left for the next run. One policy for every source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestWindow {
    pub after: DateTime<Utc>,
    pub before: DateTime<Utc>,
}

impl IngestWindow {
    /// Window from a watermark up to the current instant.
    pub fn until_now(after: DateTime<Utc>) -> Self {
        Self {
            after,
            before: Utc::now(),
        }
    }

    /// Strict containment check on both ends.
    pub fn contains(&self, date: DateTime<Utc>) -> bool {
        self.after < date && date < self.before
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn sentinel_is_year_one() {
        let s = sentinel_min();
        assert_eq!(s.to_rfc3339(), "0001-01-01T00:00:00+00:00");
    }

    #[test]
    fn window_bounds_are_exclusive() {
        let after = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let before = Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap();
        let window = IngestWindow { after, before };

        assert!(!window.contains(after));
        assert!(!window.contains(before));
        assert!(window.contains(after + Duration::seconds(1)));
        assert!(window.contains(before - Duration::seconds(1)));
        assert!(!window.contains(after - Duration::days(1)));
        assert!(!window.contains(before + Duration::days(1)));
    }

    #[test]
    fn until_now_upper_bound_is_current_instant() {
        let window = IngestWindow::until_now(sentinel_min());
        assert!(window.contains(Utc::now() - Duration::seconds(1)));
        assert!(!window.contains(Utc::now() + Duration::hours(1)));
    }
}
