//! Fast-cache integration: promotion into monthly records, TTL expiry, and
//! the end-of-day purge.

use crate::clock::Clock;
use crate::models::{
    ActorKind, CacheEntry, CacheKey, CacheMark, DayRecord, DayStatus, Direction, MonthRef,
    MonthlyRecord, RoleClass,
};
use crate::store::LocalStore;
use anyhow::Result;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, info};

pub mod maintenance;

pub use maintenance::{spawn_maintenance, MaintenanceHandle};

/// Promotes ephemeral same-day marks into durable monthly records and keeps
/// the ephemeral tier from accumulating stale entries.
pub struct CacheIntegrator {
    store: Arc<dyn LocalStore>,
    clock: Arc<dyn Clock>,
    staff_ttl: Duration,
    student_ttl: Duration,
    /// Date of the last completed purge; same-day re-triggers are no-ops.
    last_purge: Mutex<Option<NaiveDate>>,
}

impl CacheIntegrator {
    pub fn new(
        store: Arc<dyn LocalStore>,
        clock: Arc<dyn Clock>,
        staff_ttl: Duration,
        student_ttl: Duration,
    ) -> Self {
        Self {
            store,
            clock,
            staff_ttl,
            student_ttl,
            last_purge: Mutex::new(None),
        }
    }

    pub fn ttl_for(&self, actor: ActorKind) -> Duration {
        match actor {
            ActorKind::Staff => self.staff_ttl,
            ActorKind::Student => self.student_ttl,
        }
    }

    /// Derive the settled day from a cache mark. Entry punches are late when
    /// the offset runs past the scheduled time; exits settle as completed.
    /// Status-style marks carry their status through; `fallback` stamps them.
    pub fn day_record(mark: &CacheMark, direction: Direction, fallback: DateTime<Utc>) -> DayRecord {
        match mark {
            CacheMark::Stamped {
                timestamp,
                offset_seconds,
            } => {
                let status = match direction {
                    Direction::Entry => {
                        if *offset_seconds > 0 {
                            DayStatus::Late
                        } else {
                            DayStatus::OnTime
                        }
                    }
                    Direction::Exit => DayStatus::Completed,
                };
                DayRecord {
                    timestamp: *timestamp,
                    offset_seconds: *offset_seconds,
                    status,
                }
            }
            CacheMark::Status { status } => DayRecord {
                timestamp: fallback,
                offset_seconds: 0,
                status: *status,
            },
        }
    }

    /// Fold one mark into a monthly record for `day`, building the record if
    /// it does not exist yet. Idempotent: promoting an identical mark twice
    /// leaves the day's content byte-identical.
    #[allow(clippy::too_many_arguments)]
    pub fn promote(
        existing: Option<MonthlyRecord>,
        role: RoleClass,
        direction: Direction,
        user_id: &str,
        month: MonthRef,
        day: u32,
        mark: &CacheMark,
        now: DateTime<Utc>,
    ) -> MonthlyRecord {
        let mut record =
            existing.unwrap_or_else(|| MonthlyRecord::new(role, direction, user_id, month, now));
        let day_record = Self::day_record(mark, direction, now);
        record.put_day(day, day_record, now);
        record
    }

    /// Look up an ephemeral entry, treating an expired one as absent and
    /// removing it on the spot.
    pub async fn lookup(&self, key: &CacheKey) -> Result<Option<CacheEntry>> {
        let Some(entry) = self.store.get_cache(key).await? else {
            return Ok(None);
        };
        let now = self.clock.now()?.instant;
        if entry.is_expired(now, self.ttl_for(key.actor)) {
            debug!(key = %key.storage_key(), "expired cache entry dropped on lookup");
            self.store.delete_cache(key).await?;
            return Ok(None);
        }
        Ok(Some(entry))
    }

    /// Record a freshly fetched mark in the ephemeral tier.
    pub async fn record_mark(&self, key: CacheKey, mark: CacheMark) -> Result<CacheEntry> {
        let entry = CacheEntry {
            key,
            mark,
            queried_at: self.clock.now()?.instant,
        };
        self.store.put_cache(&entry).await?;
        Ok(entry)
    }

    /// Drop every entry older than its category TTL. Returns how many went.
    pub async fn sweep_expired(&self) -> Result<usize> {
        let now = self.clock.now()?.instant;
        let mut removed = 0;
        for entry in self.store.list_cache().await? {
            if entry.is_expired(now, self.ttl_for(entry.key.actor)) {
                self.store.delete_cache(&entry.key).await?;
                removed += 1;
            }
        }
        if removed > 0 {
            debug!(removed, "swept expired cache entries");
        }
        Ok(removed)
    }

    /// Purge entries dated strictly before `boundary`, at most once per
    /// calendar day.
    pub async fn purge_before(&self, boundary: NaiveDate) -> Result<usize> {
        let today = self.clock.now()?.date;
        {
            let last = self.last_purge.lock();
            if *last == Some(today) {
                return Ok(0);
            }
        }

        let removed = self.store.delete_cache_before(boundary).await?;
        *self.last_purge.lock() = Some(today);
        if removed > 0 {
            info!(removed, %boundary, "purged stale cache entries");
        }
        Ok(removed)
    }

    /// Purge everything dated before today.
    pub async fn daily_purge(&self) -> Result<usize> {
        let today = self.clock.now()?.date;
        self.purge_before(today).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::store::MemoryStore;
    use chrono::TimeZone;

    fn setup(now: DateTime<Utc>) -> (Arc<MemoryStore>, Arc<ManualClock>, CacheIntegrator) {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(now));
        let integrator = CacheIntegrator::new(
            store.clone(),
            clock.clone(),
            Duration::minutes(30),
            Duration::minutes(15),
        );
        (store, clock, integrator)
    }

    #[test]
    fn test_promote_is_idempotent() {
        let now = Utc.with_ymd_and_hms(2026, 8, 5, 8, 2, 0).unwrap();
        let mark = CacheMark::Stamped {
            timestamp: now,
            offset_seconds: 120,
        };
        let month = MonthRef::new(2026, 8);

        let first = CacheIntegrator::promote(
            None,
            RoleClass::Teacher,
            Direction::Entry,
            "u1",
            month,
            5,
            &mark,
            now,
        );
        let later = now + Duration::minutes(10);
        let second = CacheIntegrator::promote(
            Some(first.clone()),
            RoleClass::Teacher,
            Direction::Entry,
            "u1",
            month,
            5,
            &mark,
            later,
        );

        assert_eq!(first.days.get(&5), second.days.get(&5));
        assert_eq!(second.day_count(), 1);
        assert_eq!(second.last_update, later);
        assert_eq!(second.days.get(&5).unwrap().status, DayStatus::Late);
    }

    #[test]
    fn test_exit_promotion_settles_as_completed() {
        let now = Utc.with_ymd_and_hms(2026, 8, 5, 17, 0, 0).unwrap();
        let mark = CacheMark::Stamped {
            timestamp: now,
            offset_seconds: -300,
        };
        let rec = CacheIntegrator::promote(
            None,
            RoleClass::Assistant,
            Direction::Exit,
            "u2",
            MonthRef::new(2026, 8),
            5,
            &mark,
            now,
        );
        assert_eq!(rec.days.get(&5).unwrap().status, DayStatus::Completed);
    }

    #[tokio::test]
    async fn test_lookup_drops_expired_entries() {
        let t0 = Utc.with_ymd_and_hms(2026, 8, 5, 8, 0, 0).unwrap();
        let (store, clock, integrator) = setup(t0);

        let key = CacheKey::staff(t0.date_naive(), Direction::Entry, "u1");
        integrator
            .record_mark(
                key.clone(),
                CacheMark::Stamped {
                    timestamp: t0,
                    offset_seconds: 0,
                },
            )
            .await
            .unwrap();

        clock.advance(Duration::minutes(29));
        assert!(integrator.lookup(&key).await.unwrap().is_some());

        clock.advance(Duration::minutes(2));
        assert!(integrator.lookup(&key).await.unwrap().is_none());
        // The expired entry was removed, not just hidden.
        assert_eq!(store.cache_count(), 0);
    }

    #[tokio::test]
    async fn test_sweep_respects_category_ttls() {
        let t0 = Utc.with_ymd_and_hms(2026, 8, 5, 8, 0, 0).unwrap();
        let (store, clock, integrator) = setup(t0);

        integrator
            .record_mark(
                CacheKey::staff(t0.date_naive(), Direction::Entry, "staff-1"),
                CacheMark::Stamped {
                    timestamp: t0,
                    offset_seconds: 0,
                },
            )
            .await
            .unwrap();
        integrator
            .record_mark(
                CacheKey {
                    date: t0.date_naive(),
                    direction: Direction::Entry,
                    actor: ActorKind::Student,
                    user_id: "stud-1".into(),
                    group: None,
                },
                CacheMark::Status {
                    status: DayStatus::OnTime,
                },
            )
            .await
            .unwrap();

        // 20 minutes in: past the student TTL, inside the staff TTL.
        clock.advance(Duration::minutes(20));
        assert_eq!(integrator.sweep_expired().await.unwrap(), 1);
        assert_eq!(store.cache_count(), 1);
    }

    #[tokio::test]
    async fn test_purge_runs_once_per_day() {
        let t0 = Utc.with_ymd_and_hms(2026, 8, 7, 0, 10, 0).unwrap();
        let (store, clock, integrator) = setup(t0);
        let today = t0.date_naive();

        for day in [5, 6, 7] {
            integrator
                .record_mark(
                    CacheKey::staff(
                        NaiveDate::from_ymd_opt(2026, 8, day).unwrap(),
                        Direction::Entry,
                        "u1",
                    ),
                    CacheMark::Stamped {
                        timestamp: t0,
                        offset_seconds: 0,
                    },
                )
                .await
                .unwrap();
        }

        assert_eq!(integrator.purge_before(today).await.unwrap(), 2);
        // Same-day re-trigger is a no-op even though entries would match.
        assert_eq!(integrator.purge_before(today).await.unwrap(), 0);
        assert_eq!(store.cache_count(), 1);

        // The guard clears when the date rolls over.
        clock.advance(Duration::days(1));
        let tomorrow = today.succ_opt().unwrap();
        assert_eq!(integrator.purge_before(tomorrow).await.unwrap(), 1);
    }
}
