//! Time-of-day query regimes.
//!
//! School days split into four windows by configured hour boundaries; weekends
//! are governed by whether the record was completed late enough on Friday.

use crate::clock::ClockSnapshot;
use crate::config::EngineConfig;
use chrono::{DateTime, Datelike, NaiveDate, Utc, Weekday};
use tracing::warn;

/// Which tiers a school-day query may touch right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryWindow {
    /// Before the school day starts: serve what we have.
    NoQuery,
    /// Morning: only entry marks exist yet.
    EntriesOnly,
    /// Afternoon/evening: both directions are live.
    Full,
    /// Late night: remote data is settled and authoritative.
    Consolidated,
}

impl QueryWindow {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryWindow::NoQuery => "no_query",
            QueryWindow::EntriesOnly => "entries_only",
            QueryWindow::Full => "full",
            QueryWindow::Consolidated => "consolidated",
        }
    }
}

/// Classifies "now" into a [`QueryWindow`] and evaluates weekend settledness.
#[derive(Debug, Clone)]
pub struct WindowResolver {
    no_query_end: u32,
    entries_only_end: u32,
    full_end: u32,
    friday_complete_hour: u32,
}

impl WindowResolver {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            no_query_end: config.no_query_end_hour,
            entries_only_end: config.entries_only_end_hour,
            full_end: config.full_end_hour,
            friday_complete_hour: config.friday_complete_hour,
        }
    }

    /// School-day hour-of-day mapping.
    pub fn resolve(&self, snap: &ClockSnapshot) -> QueryWindow {
        match snap.hour {
            h if h < self.no_query_end => QueryWindow::NoQuery,
            h if h < self.entries_only_end => QueryWindow::EntriesOnly,
            h if h < self.full_end => QueryWindow::Full,
            _ => QueryWindow::Consolidated,
        }
    }

    /// Fallback when the clock could not be read: the most conservative
    /// regime, an unconditional authoritative fetch.
    pub fn conservative(&self) -> QueryWindow {
        warn!("clock unavailable, falling back to consolidated window");
        QueryWindow::Consolidated
    }

    /// Weekend rule: data is settled when the record's last update landed on
    /// the immediately preceding Friday at or past the complete hour.
    pub fn weekend_settled(&self, snap: &ClockSnapshot, last_update: DateTime<Utc>) -> bool {
        let Some(friday) = preceding_friday(snap.date) else {
            return false;
        };
        let update = ClockSnapshot::at(last_update);
        update.date == friday && update.hour >= self.friday_complete_hour
    }
}

/// The Friday immediately before `date`. For a weekend date this is the Friday
/// that opened it; for Friday itself, the previous week's.
fn preceding_friday(date: NaiveDate) -> Option<NaiveDate> {
    let back = match date.weekday() {
        Weekday::Sat => 1,
        Weekday::Sun => 2,
        Weekday::Mon => 3,
        Weekday::Tue => 4,
        Weekday::Wed => 5,
        Weekday::Thu => 6,
        Weekday::Fri => 7,
    };
    date.checked_sub_days(chrono::Days::new(back))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn resolver() -> WindowResolver {
        WindowResolver::new(&EngineConfig::default())
    }

    fn snap_at(hour: u32) -> ClockSnapshot {
        // 2026-08-05 is a Wednesday.
        ClockSnapshot::at(Utc.with_ymd_and_hms(2026, 8, 5, hour, 0, 0).unwrap())
    }

    #[test]
    fn test_school_day_window_boundaries() {
        let r = resolver();
        for h in 0..6 {
            assert_eq!(r.resolve(&snap_at(h)), QueryWindow::NoQuery, "hour {h}");
        }
        for h in 6..12 {
            assert_eq!(r.resolve(&snap_at(h)), QueryWindow::EntriesOnly, "hour {h}");
        }
        for h in 12..22 {
            assert_eq!(r.resolve(&snap_at(h)), QueryWindow::Full, "hour {h}");
        }
        for h in 22..24 {
            assert_eq!(r.resolve(&snap_at(h)), QueryWindow::Consolidated, "hour {h}");
        }
    }

    #[test]
    fn test_weekend_settled_by_friday_evening_update() {
        let r = resolver();
        // Saturday 2026-08-08; the preceding Friday is 2026-08-07.
        let weekend = ClockSnapshot::at(Utc.with_ymd_and_hms(2026, 8, 8, 10, 0, 0).unwrap());

        let friday_2005 = Utc.with_ymd_and_hms(2026, 8, 7, 20, 5, 0).unwrap();
        assert!(r.weekend_settled(&weekend, friday_2005));

        let friday_1955 = Utc.with_ymd_and_hms(2026, 8, 7, 19, 55, 0).unwrap();
        assert!(!r.weekend_settled(&weekend, friday_1955));

        // An update from the previous Friday does not settle this weekend.
        let stale_friday = Utc.with_ymd_and_hms(2026, 7, 31, 21, 0, 0).unwrap();
        assert!(!r.weekend_settled(&weekend, stale_friday));
    }

    #[test]
    fn test_weekend_settled_on_sunday() {
        let r = resolver();
        let sunday = ClockSnapshot::at(Utc.with_ymd_and_hms(2026, 8, 9, 15, 0, 0).unwrap());
        let friday = Utc.with_ymd_and_hms(2026, 8, 7, 20, 0, 0).unwrap();
        assert!(r.weekend_settled(&sunday, friday));
    }

    #[test]
    fn test_conservative_fallback() {
        assert_eq!(resolver().conservative(), QueryWindow::Consolidated);
    }
}
