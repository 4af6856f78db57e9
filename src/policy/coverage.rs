//! Recent-history coverage heuristic.
//!
//! A monthly record is trusted without a refresh when enough of the last N
//! school weekdays are present. A record that covers only old days while the
//! most recent run is missing stopped growing at some cutoff and is never
//! trusted, whatever its percentage looks like.

use crate::config::EngineConfig;
use crate::models::{is_school_weekday, MonthlyRecord};
use chrono::{Datelike, NaiveDate};

/// What the checker saw over the trailing window.
#[derive(Debug, Clone)]
pub struct CoverageReport {
    /// The evaluated school weekdays, most recent first.
    pub window: Vec<NaiveDate>,
    pub covered: usize,
    pub percent: f64,
    /// Every missing day is more recent than every covered day: the record
    /// was never updated past an old cutoff.
    pub trailing_gap: bool,
    pub sufficient: bool,
}

#[derive(Debug, Clone)]
pub struct CoverageChecker {
    window_days: usize,
    min_days: usize,
    min_percent: f64,
}

impl CoverageChecker {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            window_days: config.coverage_window_days,
            min_days: config.coverage_min_days,
            min_percent: config.coverage_min_percent,
        }
    }

    /// The last `n` school weekdays strictly before `today`, most recent first.
    pub fn school_weekdays_before(today: NaiveDate, n: usize) -> Vec<NaiveDate> {
        let mut days = Vec::with_capacity(n);
        let mut cursor = today;
        while days.len() < n {
            let Some(prev) = cursor.pred_opt() else {
                break;
            };
            cursor = prev;
            if is_school_weekday(cursor) {
                days.push(cursor);
            }
        }
        days
    }

    /// Evaluate `record` against the trailing window ending before `today`.
    pub fn evaluate(&self, record: Option<&MonthlyRecord>, today: NaiveDate) -> CoverageReport {
        let window = Self::school_weekdays_before(today, self.window_days);
        let covered_flags: Vec<bool> = window
            .iter()
            .map(|date| match record {
                Some(rec) => rec.month.contains(*date) && rec.days.contains_key(&date.day()),
                None => false,
            })
            .collect();

        let covered = covered_flags.iter().filter(|&&c| c).count();
        let percent = if window.is_empty() {
            0.0
        } else {
            covered as f64 * 100.0 / window.len() as f64
        };

        // Length of the most-recent run of missing days.
        let leading_missing = covered_flags.iter().take_while(|&&c| !c).count();
        let missing = window.len() - covered;
        let trailing_gap = leading_missing > 0 && leading_missing == missing;

        let sufficient =
            !trailing_gap && (covered >= self.min_days || percent >= self.min_percent);

        CoverageReport {
            window,
            covered,
            percent,
            trailing_gap,
            sufficient,
        }
    }
}
