//! Entry/exit parity check.
//!
//! A user's entry and exit ledgers for one month must track each other: a gap
//! of one day is normal (today's second half not recorded yet), anything wider
//! means one side lost writes and the pair must be rebuilt from the
//! authoritative source.

use crate::models::MonthlyRecord;
use chrono::NaiveDate;

/// How day-counts are taken for the comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountMode {
    /// Live current-month data: school weekdays only, excluding today.
    SchoolDaysExcluding(NaiveDate),
    /// Settled past months: raw day counts.
    RawDays,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsistencyVerdict {
    Perfect,
    Acceptable,
    Inconsistent,
}

impl ConsistencyVerdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConsistencyVerdict::Perfect => "perfect",
            ConsistencyVerdict::Acceptable => "acceptable",
            ConsistencyVerdict::Inconsistent => "inconsistent",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ConsistencyReport {
    pub entry_days: usize,
    pub exit_days: usize,
    pub difference: usize,
    pub verdict: ConsistencyVerdict,
    pub requires_repair: bool,
}

pub struct ConsistencyValidator;

impl ConsistencyValidator {
    pub fn compare(
        entry: Option<&MonthlyRecord>,
        exit: Option<&MonthlyRecord>,
        mode: CountMode,
    ) -> ConsistencyReport {
        let count = |rec: Option<&MonthlyRecord>| -> usize {
            match (rec, mode) {
                (None, _) => 0,
                (Some(r), CountMode::RawDays) => r.day_count(),
                (Some(r), CountMode::SchoolDaysExcluding(today)) => {
                    r.school_day_count_excluding(today)
                }
            }
        };

        let entry_days = count(entry);
        let exit_days = count(exit);
        let difference = entry_days.abs_diff(exit_days);

        let verdict = match difference {
            0 => ConsistencyVerdict::Perfect,
            1 => ConsistencyVerdict::Acceptable,
            _ => ConsistencyVerdict::Inconsistent,
        };

        ConsistencyReport {
            entry_days,
            exit_days,
            difference,
            verdict,
            requires_repair: verdict == ConsistencyVerdict::Inconsistent,
        }
    }
}
