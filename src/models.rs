//! Core data model for the reconciliation engine.
//!
//! Everything here is a plain value type: monthly attendance ledgers, per-day
//! marks, fast-cache entries and the composite keys the stores are indexed by.
//! Statuses and provenance are closed enums, not strings.

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Staff role classes tracked by the attendance system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoleClass {
    Teacher,
    Assistant,
}

impl RoleClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoleClass::Teacher => "teacher",
            RoleClass::Assistant => "assistant",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "teacher" => Some(RoleClass::Teacher),
            "assistant" => Some(RoleClass::Assistant),
            _ => None,
        }
    }
}

/// Direction of an attendance mark.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Entry,
    Exit,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Entry => "entry",
            Direction::Exit => "exit",
        }
    }
}

/// Population the fast-cache tier serves. The engine reconciles staff roles;
/// student-style entries are grouped by level/grade/section and carry a status
/// instead of a punch timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorKind {
    Staff,
    Student,
}

impl ActorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActorKind::Staff => "staff",
            ActorKind::Student => "student",
        }
    }
}

/// Outcome recorded for a single day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DayStatus {
    OnTime,
    Late,
    Completed,
    Absent,
    Inactive,
    NoRegistration,
}

impl DayStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DayStatus::OnTime => "on_time",
            DayStatus::Late => "late",
            DayStatus::Completed => "completed",
            DayStatus::Absent => "absent",
            DayStatus::Inactive => "inactive",
            DayStatus::NoRegistration => "no_registration",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "on_time" => Some(DayStatus::OnTime),
            "late" => Some(DayStatus::Late),
            "completed" => Some(DayStatus::Completed),
            "absent" => Some(DayStatus::Absent),
            "inactive" => Some(DayStatus::Inactive),
            "no_registration" => Some(DayStatus::NoRegistration),
            _ => None,
        }
    }
}

/// A calendar month, ordered chronologically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MonthRef {
    pub year: i32,
    pub month: u32,
}

impl MonthRef {
    pub fn new(year: i32, month: u32) -> Self {
        Self { year, month }
    }

    pub fn from_date(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    /// True when `date` falls inside this month.
    pub fn contains(&self, date: NaiveDate) -> bool {
        date.year() == self.year && date.month() == self.month
    }

    /// Parse the `YYYY-MM` form used in storage keys.
    pub fn parse(s: &str) -> Option<Self> {
        let (y, m) = s.split_once('-')?;
        let year = y.parse().ok()?;
        let month: u32 = m.parse().ok()?;
        if !(1..=12).contains(&month) {
            return None;
        }
        Some(Self { year, month })
    }
}

impl fmt::Display for MonthRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

/// One day's settled attendance mark. Replaced wholesale when a day is
/// re-recorded, never mutated in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DayRecord {
    pub timestamp: DateTime<Utc>,
    pub offset_seconds: i32,
    pub status: DayStatus,
}

/// Durable per-(role, direction, user, month) attendance ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlyRecord {
    /// Assigned by the authoritative source on first creation; locally-built
    /// records carry `None` until a remote fetch supplies one.
    pub record_id: Option<String>,
    pub role: RoleClass,
    pub direction: Direction,
    pub user_id: String,
    pub month: MonthRef,
    pub days: BTreeMap<u32, DayRecord>,
    pub last_update: DateTime<Utc>,
}

impl MonthlyRecord {
    pub fn new(
        role: RoleClass,
        direction: Direction,
        user_id: impl Into<String>,
        month: MonthRef,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            record_id: None,
            role,
            direction,
            user_id: user_id.into(),
            month,
            days: BTreeMap::new(),
            last_update: now,
        }
    }

    pub fn key(&self) -> MonthlyKey {
        MonthlyKey {
            role: self.role,
            direction: self.direction,
            user_id: self.user_id.clone(),
            month: self.month,
        }
    }

    pub fn day_count(&self) -> usize {
        self.days.len()
    }

    /// Count of recorded days that fall on a school weekday, excluding
    /// `today` when it belongs to this month.
    pub fn school_day_count_excluding(&self, today: NaiveDate) -> usize {
        self.days
            .keys()
            .filter(|&&day| {
                let Some(date) = NaiveDate::from_ymd_opt(self.month.year, self.month.month, day)
                else {
                    return false;
                };
                is_school_weekday(date) && date != today
            })
            .count()
    }

    /// Insert or replace a day, bumping `last_update` monotonically.
    pub fn put_day(&mut self, day: u32, record: DayRecord, now: DateTime<Utc>) {
        self.days.insert(day, record);
        self.touch(now);
    }

    /// `last_update` never decreases, even when fed a stale instant.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        if now > self.last_update {
            self.last_update = now;
        }
    }
}

/// Monday through Friday. Holiday handling is external to this core.
pub fn is_school_weekday(date: NaiveDate) -> bool {
    date.weekday().number_from_monday() <= 5
}

/// Composite identity of a [`MonthlyRecord`] in the local store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MonthlyKey {
    pub role: RoleClass,
    pub direction: Direction,
    pub user_id: String,
    pub month: MonthRef,
}

impl MonthlyKey {
    pub fn new(
        role: RoleClass,
        direction: Direction,
        user_id: impl Into<String>,
        month: MonthRef,
    ) -> Self {
        Self {
            role,
            direction,
            user_id: user_id.into(),
            month,
        }
    }

    pub fn storage_key(&self) -> String {
        format!(
            "{}:{}:{}:{}",
            self.role.as_str(),
            self.direction.as_str(),
            self.user_id,
            self.month
        )
    }
}

/// Grouping of student-style actors in the fast tier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GroupRef {
    pub level: String,
    pub grade: u32,
    pub section: String,
}

/// Composite identity of a fast-cache entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    pub date: NaiveDate,
    pub direction: Direction,
    pub actor: ActorKind,
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<GroupRef>,
}

impl CacheKey {
    pub fn staff(date: NaiveDate, direction: Direction, user_id: impl Into<String>) -> Self {
        Self {
            date,
            direction,
            actor: ActorKind::Staff,
            user_id: user_id.into(),
            group: None,
        }
    }

    pub fn student(
        date: NaiveDate,
        direction: Direction,
        user_id: impl Into<String>,
        group: GroupRef,
    ) -> Self {
        Self {
            date,
            direction,
            actor: ActorKind::Student,
            user_id: user_id.into(),
            group: Some(group),
        }
    }

    pub fn storage_key(&self) -> String {
        let mut key = format!(
            "{}:{}:{}:{}",
            self.date,
            self.direction.as_str(),
            self.actor.as_str(),
            self.user_id
        );
        if let Some(g) = &self.group {
            key.push_str(&format!(":{}:{}:{}", g.level, g.grade, g.section));
        }
        key
    }
}

/// Payload of a fast-cache mark: staff punches carry a timestamp and offset,
/// student-style marks carry only a status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CacheMark {
    Stamped {
        timestamp: DateTime<Utc>,
        offset_seconds: i32,
    },
    Status {
        status: DayStatus,
    },
}

/// A not-yet-settled same-day mark held in the ephemeral tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: CacheKey,
    pub mark: CacheMark,
    /// When this mark was fetched from the fast-cache tier; TTL expiry is
    /// measured against this, not against the mark's own timestamp.
    pub queried_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn is_expired(&self, now: DateTime<Utc>, ttl: chrono::Duration) -> bool {
        now.signed_duration_since(self.queried_at) > ttl
    }
}

/// Which tier ultimately produced a returned result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    LocalStore,
    FastCache,
    RemoteSource,
}

impl Provenance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provenance::LocalStore => "local_store",
            Provenance::FastCache => "fast_cache",
            Provenance::RemoteSource => "remote_source",
        }
    }
}

/// Result of one reconciliation pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcileOutcome {
    pub entry: Option<MonthlyRecord>,
    pub exit: Option<MonthlyRecord>,
    pub found: bool,
    pub message: String,
    pub provenance: Provenance,
    /// True when the pass avoided tier queries it would normally make
    /// (cooldown hit, settled weekend, same-day short circuit).
    pub optimized: bool,
}

impl ReconcileOutcome {
    pub fn not_found(message: impl Into<String>, provenance: Provenance) -> Self {
        Self {
            entry: None,
            exit: None,
            found: false,
            message: message.into(),
            provenance,
            optimized: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_month_ref_ordering() {
        let a = MonthRef::new(2026, 7);
        let b = MonthRef::new(2026, 8);
        let c = MonthRef::new(2025, 12);
        assert!(a < b);
        assert!(c < a);
        assert_eq!(MonthRef::new(2026, 8), b);
    }

    #[test]
    fn test_month_ref_display_and_parse() {
        let m = MonthRef::new(2026, 3);
        assert_eq!(m.to_string(), "2026-03");
        assert_eq!(MonthRef::parse("2026-03"), Some(m));
        assert_eq!(MonthRef::parse("2026-13"), None);
        assert_eq!(MonthRef::parse("garbage"), None);
    }

    #[test]
    fn test_last_update_is_monotone() {
        let t0 = Utc.with_ymd_and_hms(2026, 8, 3, 10, 0, 0).unwrap();
        let t1 = Utc.with_ymd_and_hms(2026, 8, 3, 11, 0, 0).unwrap();
        let mut rec = MonthlyRecord::new(
            RoleClass::Teacher,
            Direction::Entry,
            "u1",
            MonthRef::new(2026, 8),
            t1,
        );
        rec.touch(t0);
        assert_eq!(rec.last_update, t1);
        rec.touch(t1 + chrono::Duration::minutes(5));
        assert_eq!(rec.last_update, t1 + chrono::Duration::minutes(5));
    }

    #[test]
    fn test_school_day_count_excludes_today_and_weekends() {
        let now = Utc.with_ymd_and_hms(2026, 8, 12, 9, 0, 0).unwrap();
        let mut rec = MonthlyRecord::new(
            RoleClass::Teacher,
            Direction::Entry,
            "u1",
            MonthRef::new(2026, 8),
            now,
        );
        let day = DayRecord {
            timestamp: now,
            offset_seconds: 0,
            status: DayStatus::OnTime,
        };
        // 2026-08-08 is a Saturday, 2026-08-10..12 are Mon..Wed.
        for d in [8, 10, 11, 12] {
            rec.put_day(d, day.clone(), now);
        }
        let today = NaiveDate::from_ymd_opt(2026, 8, 12).unwrap();
        assert_eq!(rec.day_count(), 4);
        assert_eq!(rec.school_day_count_excluding(today), 2);
    }

    #[test]
    fn test_cache_key_storage_key_with_group() {
        let date = NaiveDate::from_ymd_opt(2026, 8, 7).unwrap();
        let staff = CacheKey::staff(date, Direction::Entry, "u9");
        assert_eq!(staff.storage_key(), "2026-08-07:entry:staff:u9");

        let student = CacheKey::student(
            date,
            Direction::Exit,
            "s4",
            GroupRef {
                level: "primary".into(),
                grade: 3,
                section: "B".into(),
            },
        );
        assert_eq!(
            student.storage_key(),
            "2026-08-07:exit:student:s4:primary:3:B"
        );
    }
}
