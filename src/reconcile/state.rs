//! Query-state classification.
//!
//! Every reconciliation pass starts by placing the queried month relative to
//! "now"; the named states drive one transition table instead of repeated
//! branch chains in each code path.

use crate::clock::ClockSnapshot;
use crate::models::MonthRef;
use crate::policy::window::{QueryWindow, WindowResolver};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryState {
    /// Hard violation: the caller's clock or state is wrong.
    FutureMonth,
    /// A settled month before the current one.
    PastMonth,
    /// The current month, queried on a Saturday or Sunday.
    CurrentWeekend,
    /// The current month on a school day, under a time-of-day window.
    CurrentSchoolDay(QueryWindow),
}

impl QueryState {
    pub fn classify(month: MonthRef, snap: &ClockSnapshot, resolver: &WindowResolver) -> Self {
        let current = snap.month();
        if month > current {
            QueryState::FutureMonth
        } else if month < current {
            QueryState::PastMonth
        } else if snap.is_weekend() {
            QueryState::CurrentWeekend
        } else {
            QueryState::CurrentSchoolDay(resolver.resolve(snap))
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            QueryState::FutureMonth => "future_month",
            QueryState::PastMonth => "past_month",
            QueryState::CurrentWeekend => "current_weekend",
            QueryState::CurrentSchoolDay(_) => "current_school_day",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use chrono::{TimeZone, Utc};

    fn resolver() -> WindowResolver {
        WindowResolver::new(&EngineConfig::default())
    }

    #[test]
    fn test_classification() {
        // Wednesday 2026-08-05, 14:00.
        let snap = ClockSnapshot::at(Utc.with_ymd_and_hms(2026, 8, 5, 14, 0, 0).unwrap());
        let r = resolver();

        assert_eq!(
            QueryState::classify(MonthRef::new(2026, 9), &snap, &r),
            QueryState::FutureMonth
        );
        assert_eq!(
            QueryState::classify(MonthRef::new(2027, 1), &snap, &r),
            QueryState::FutureMonth
        );
        assert_eq!(
            QueryState::classify(MonthRef::new(2026, 7), &snap, &r),
            QueryState::PastMonth
        );
        assert_eq!(
            QueryState::classify(MonthRef::new(2026, 8), &snap, &r),
            QueryState::CurrentSchoolDay(QueryWindow::Full)
        );

        // Saturday 2026-08-08.
        let weekend = ClockSnapshot::at(Utc.with_ymd_and_hms(2026, 8, 8, 14, 0, 0).unwrap());
        assert_eq!(
            QueryState::classify(MonthRef::new(2026, 8), &weekend, &r),
            QueryState::CurrentWeekend
        );
    }
}
