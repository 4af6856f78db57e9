//! Engine policy configuration.
//!
//! Every numeric policy constant lives here so deployments can tune them; the
//! defaults reproduce the production behavior exactly.

use chrono::Duration;

/// Policy knobs for the reconciliation engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Hour below which school-day queries are suppressed entirely.
    pub no_query_end_hour: u32,
    /// Hour below which only entry marks are queried.
    pub entries_only_end_hour: u32,
    /// Hour below which both directions are queried; at or past it, remote
    /// data is considered settled and fetched unconditionally.
    pub full_end_hour: u32,
    /// Friday hour at or after which a record update settles the weekend.
    pub friday_complete_hour: u32,
    /// Minimum gap between fast-cache refreshes under the same window.
    pub query_cooldown_minutes: i64,
    /// How many school weekdays of history the coverage check looks at.
    pub coverage_window_days: usize,
    /// Covered-day count that is sufficient on its own.
    pub coverage_min_days: usize,
    /// Coverage percentage that is sufficient on its own.
    pub coverage_min_percent: f64,
    /// TTL for staff fast-cache entries.
    pub staff_cache_ttl_minutes: i64,
    /// TTL for student-style fast-cache entries.
    pub student_cache_ttl_minutes: i64,
    /// Interval between background TTL sweeps.
    pub sweep_interval_secs: u64,
    /// Interval between checks of the once-daily purge job.
    pub purge_check_interval_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            no_query_end_hour: 6,
            entries_only_end_hour: 12,
            full_end_hour: 22,
            friday_complete_hour: 20,
            query_cooldown_minutes: 45,
            coverage_window_days: 5,
            coverage_min_days: 2,
            coverage_min_percent: 40.0,
            staff_cache_ttl_minutes: 30,
            student_cache_ttl_minutes: 15,
            sweep_interval_secs: 300,
            purge_check_interval_secs: 3600,
        }
    }
}

impl EngineConfig {
    /// Load the default configuration with `ROLLCALL_*` environment overrides.
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();
        let mut config = Self::default();

        if let Ok(v) = std::env::var("ROLLCALL_NO_QUERY_END_HOUR") {
            if let Ok(h) = v.parse() {
                config.no_query_end_hour = h;
            }
        }
        if let Ok(v) = std::env::var("ROLLCALL_ENTRIES_ONLY_END_HOUR") {
            if let Ok(h) = v.parse() {
                config.entries_only_end_hour = h;
            }
        }
        if let Ok(v) = std::env::var("ROLLCALL_FULL_END_HOUR") {
            if let Ok(h) = v.parse() {
                config.full_end_hour = h;
            }
        }
        if let Ok(v) = std::env::var("ROLLCALL_FRIDAY_COMPLETE_HOUR") {
            if let Ok(h) = v.parse() {
                config.friday_complete_hour = h;
            }
        }
        if let Ok(v) = std::env::var("ROLLCALL_QUERY_COOLDOWN_MINUTES") {
            if let Ok(m) = v.parse() {
                config.query_cooldown_minutes = m;
            }
        }
        if let Ok(v) = std::env::var("ROLLCALL_COVERAGE_WINDOW_DAYS") {
            if let Ok(d) = v.parse() {
                config.coverage_window_days = d;
            }
        }
        if let Ok(v) = std::env::var("ROLLCALL_COVERAGE_MIN_DAYS") {
            if let Ok(d) = v.parse() {
                config.coverage_min_days = d;
            }
        }
        if let Ok(v) = std::env::var("ROLLCALL_COVERAGE_MIN_PERCENT") {
            if let Ok(p) = v.parse() {
                config.coverage_min_percent = p;
            }
        }
        if let Ok(v) = std::env::var("ROLLCALL_STAFF_CACHE_TTL_MINUTES") {
            if let Ok(m) = v.parse() {
                config.staff_cache_ttl_minutes = m;
            }
        }
        if let Ok(v) = std::env::var("ROLLCALL_STUDENT_CACHE_TTL_MINUTES") {
            if let Ok(m) = v.parse() {
                config.student_cache_ttl_minutes = m;
            }
        }
        if let Ok(v) = std::env::var("ROLLCALL_SWEEP_INTERVAL_SECS") {
            if let Ok(s) = v.parse() {
                config.sweep_interval_secs = s;
            }
        }
        if let Ok(v) = std::env::var("ROLLCALL_PURGE_CHECK_INTERVAL_SECS") {
            if let Ok(s) = v.parse() {
                config.purge_check_interval_secs = s;
            }
        }

        config
    }

    pub fn query_cooldown(&self) -> Duration {
        Duration::minutes(self.query_cooldown_minutes)
    }

    pub fn staff_cache_ttl(&self) -> Duration {
        Duration::minutes(self.staff_cache_ttl_minutes)
    }

    pub fn student_cache_ttl(&self) -> Duration {
        Duration::minutes(self.student_cache_ttl_minutes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_production_policy() {
        let c = EngineConfig::default();
        assert_eq!(c.no_query_end_hour, 6);
        assert_eq!(c.entries_only_end_hour, 12);
        assert_eq!(c.full_end_hour, 22);
        assert_eq!(c.friday_complete_hour, 20);
        assert_eq!(c.query_cooldown_minutes, 45);
        assert_eq!(c.coverage_window_days, 5);
        assert_eq!(c.coverage_min_days, 2);
        assert_eq!(c.coverage_min_percent, 40.0);
        assert_eq!(c.sweep_interval_secs, 300);
    }
}
