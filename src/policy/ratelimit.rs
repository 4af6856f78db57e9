//! Per-(user, date, window) refresh cooldown.
//!
//! Guards the fast-cache tier against redundant refreshes: a query is blocked
//! only when the same user already queried under the same window label, on the
//! same date, less than the cooldown ago. Marks live in memory only and are
//! swept when the date rolls over.

use crate::clock::ClockSnapshot;
use crate::config::EngineConfig;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct MarkKey {
    user_id: String,
    date: NaiveDate,
    window: String,
}

/// Why a check came out the way it did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitReason {
    NoMark,
    DifferentDate,
    DifferentWindow,
    CooldownElapsed,
    WithinCooldown,
}

impl RateLimitReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RateLimitReason::NoMark => "no_mark",
            RateLimitReason::DifferentDate => "different_date",
            RateLimitReason::DifferentWindow => "different_window",
            RateLimitReason::CooldownElapsed => "cooldown_elapsed",
            RateLimitReason::WithinCooldown => "within_cooldown",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RateLimitDecision {
    pub already: bool,
    pub reason: RateLimitReason,
}

/// Injected per orchestrator instance; no process-wide statics.
pub struct QueryRateLimiter {
    cooldown: Duration,
    marks: Mutex<HashMap<MarkKey, DateTime<Utc>>>,
}

impl QueryRateLimiter {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            cooldown: config.query_cooldown(),
            marks: Mutex::new(HashMap::new()),
        }
    }

    /// Is a refresh under `window` still on cooldown for this user?
    pub fn check(&self, user_id: &str, snap: &ClockSnapshot, window: &str) -> RateLimitDecision {
        let marks = self.marks.lock();
        let key = MarkKey {
            user_id: user_id.to_string(),
            date: snap.date,
            window: window.to_string(),
        };

        if let Some(&marked_at) = marks.get(&key) {
            let elapsed = snap.instant.signed_duration_since(marked_at);
            if elapsed < self.cooldown {
                debug!(
                    user_id,
                    window,
                    elapsed_mins = elapsed.num_minutes(),
                    "refresh blocked by cooldown"
                );
                return RateLimitDecision {
                    already: true,
                    reason: RateLimitReason::WithinCooldown,
                };
            }
            return RateLimitDecision {
                already: false,
                reason: RateLimitReason::CooldownElapsed,
            };
        }

        // No exact mark; report whether the near-miss was a date or window
        // change so callers can log it.
        let reason = marks
            .keys()
            .filter(|k| k.user_id == user_id)
            .map(|k| {
                if k.date != snap.date {
                    RateLimitReason::DifferentDate
                } else {
                    RateLimitReason::DifferentWindow
                }
            })
            .next()
            .unwrap_or(RateLimitReason::NoMark);

        RateLimitDecision {
            already: false,
            reason,
        }
    }

    /// Record that a refresh happened now, under `window`.
    pub fn mark(&self, user_id: &str, snap: &ClockSnapshot, window: &str) {
        let key = MarkKey {
            user_id: user_id.to_string(),
            date: snap.date,
            window: window.to_string(),
        };
        self.marks.lock().insert(key, snap.instant);
    }

    /// Drop marks whose date is not `today`. Returns how many were removed.
    pub fn sweep(&self, today: NaiveDate) -> usize {
        let mut marks = self.marks.lock();
        let before = marks.len();
        marks.retain(|k, _| k.date == today);
        let removed = before - marks.len();
        if removed > 0 {
            debug!(removed, "swept stale rate-limit marks");
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn limiter() -> QueryRateLimiter {
        QueryRateLimiter::new(&EngineConfig::default())
    }

    fn snap(t: DateTime<Utc>) -> ClockSnapshot {
        ClockSnapshot::at(t)
    }

    #[test]
    fn test_blocked_within_cooldown_clear_after() {
        let l = limiter();
        let t0 = Utc.with_ymd_and_hms(2026, 8, 5, 9, 0, 0).unwrap();
        l.mark("u1", &snap(t0), "full");

        let at_44 = snap(t0 + Duration::minutes(44));
        let d = l.check("u1", &at_44, "full");
        assert!(d.already);
        assert_eq!(d.reason, RateLimitReason::WithinCooldown);

        let at_46 = snap(t0 + Duration::minutes(46));
        let d = l.check("u1", &at_46, "full");
        assert!(!d.already);
        assert_eq!(d.reason, RateLimitReason::CooldownElapsed);
    }

    #[test]
    fn test_window_change_clears_block() {
        let l = limiter();
        let t0 = Utc.with_ymd_and_hms(2026, 8, 5, 11, 50, 0).unwrap();
        l.mark("u1", &snap(t0), "entries_only");

        let later = snap(t0 + Duration::minutes(15));
        let d = l.check("u1", &later, "full");
        assert!(!d.already);
        assert_eq!(d.reason, RateLimitReason::DifferentWindow);
    }

    #[test]
    fn test_date_change_clears_block() {
        let l = limiter();
        let t0 = Utc.with_ymd_and_hms(2026, 8, 5, 23, 50, 0).unwrap();
        l.mark("u1", &snap(t0), "consolidated");

        let next_day = snap(t0 + Duration::minutes(20));
        let d = l.check("u1", &next_day, "consolidated");
        assert!(!d.already);
        assert_eq!(d.reason, RateLimitReason::DifferentDate);
    }

    #[test]
    fn test_unknown_user_has_no_mark() {
        let l = limiter();
        let t0 = Utc.with_ymd_and_hms(2026, 8, 5, 9, 0, 0).unwrap();
        let d = l.check("nobody", &snap(t0), "full");
        assert!(!d.already);
        assert_eq!(d.reason, RateLimitReason::NoMark);
    }

    #[test]
    fn test_sweep_drops_other_dates() {
        let l = limiter();
        let t0 = Utc.with_ymd_and_hms(2026, 8, 5, 9, 0, 0).unwrap();
        let t1 = Utc.with_ymd_and_hms(2026, 8, 6, 9, 0, 0).unwrap();
        l.mark("u1", &snap(t0), "full");
        l.mark("u2", &snap(t1), "full");

        assert_eq!(l.sweep(t1.date_naive()), 1);
        let d = l.check("u2", &snap(t1 + Duration::minutes(1)), "full");
        assert!(d.already);
    }
}
