//! Injected time source.
//!
//! Every temporal decision in the engine reads through [`Clock`]; nothing else
//! calls `Utc::now()`. Implementations are expected to hand back
//! institution-local time (the engine itself is single-timezone).

use anyhow::Result;
use chrono::{DateTime, Datelike, NaiveDate, Timelike, Utc, Weekday};
use parking_lot::Mutex;

/// One consistent reading of "now".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockSnapshot {
    pub instant: DateTime<Utc>,
    pub hour: u32,
    pub weekday: Weekday,
    pub date: NaiveDate,
}

impl ClockSnapshot {
    pub fn at(instant: DateTime<Utc>) -> Self {
        Self {
            instant,
            hour: instant.hour(),
            weekday: instant.weekday(),
            date: instant.date_naive(),
        }
    }

    pub fn is_weekend(&self) -> bool {
        matches!(self.weekday, Weekday::Sat | Weekday::Sun)
    }

    pub fn month(&self) -> crate::models::MonthRef {
        crate::models::MonthRef::from_date(self.date)
    }
}

/// The single source of current time for every temporal decision.
pub trait Clock: Send + Sync {
    /// A failed read is treated by callers as the most conservative regime
    /// (unconditional authoritative fetch).
    fn now(&self) -> Result<ClockSnapshot>;
}

/// Production clock backed by the system time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Result<ClockSnapshot> {
        Ok(ClockSnapshot::at(Utc::now()))
    }
}

/// Deterministic clock for tests: set or advance it explicitly.
pub struct ManualClock {
    instant: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(instant: DateTime<Utc>) -> Self {
        Self {
            instant: Mutex::new(instant),
        }
    }

    pub fn set(&self, instant: DateTime<Utc>) {
        *self.instant.lock() = instant;
    }

    pub fn advance(&self, delta: chrono::Duration) {
        let mut guard = self.instant.lock();
        *guard += delta;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Result<ClockSnapshot> {
        Ok(ClockSnapshot::at(*self.instant.lock()))
    }
}
