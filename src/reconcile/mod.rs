//! The reconciliation orchestrator.
//!
//! One invocation per (role, user, month) query. The orchestrator classifies
//! the query against the clock, decides which tiers to touch, folds fast-cache
//! marks into monthly records, and repairs entry/exit inconsistency by
//! rebuilding from the authoritative source. Tier I/O failures degrade to the
//! best locally available data; only the future-month gate is fatal.

use crate::cache::CacheIntegrator;
use crate::clock::{Clock, ClockSnapshot};
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::models::{
    ActorKind, CacheKey, DayRecord, Direction, MonthRef, MonthlyKey, MonthlyRecord, Provenance,
    ReconcileOutcome, RoleClass,
};
use crate::policy::{
    ConsistencyValidator, CountMode, CoverageChecker, QueryRateLimiter, QueryWindow,
    WindowResolver,
};
use crate::sources::{FastCache, RemoteMonthly, RemoteSource};
use crate::store::LocalStore;
use chrono::Datelike;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub mod state;

pub use state::QueryState;

const MAX_USER_ID_LEN: usize = 64;

/// Top-level decision procedure over the three data tiers.
pub struct Reconciler {
    clock: Arc<dyn Clock>,
    store: Arc<dyn LocalStore>,
    remote: Arc<dyn RemoteSource>,
    fast: Arc<dyn FastCache>,
    resolver: WindowResolver,
    limiter: QueryRateLimiter,
    coverage: CoverageChecker,
    integrator: Arc<CacheIntegrator>,
}

impl Reconciler {
    pub fn new(
        config: &EngineConfig,
        clock: Arc<dyn Clock>,
        store: Arc<dyn LocalStore>,
        remote: Arc<dyn RemoteSource>,
        fast: Arc<dyn FastCache>,
    ) -> Self {
        let integrator = Arc::new(CacheIntegrator::new(
            store.clone(),
            clock.clone(),
            config.staff_cache_ttl(),
            config.student_cache_ttl(),
        ));
        Self {
            resolver: WindowResolver::new(config),
            limiter: QueryRateLimiter::new(config),
            coverage: CoverageChecker::new(config),
            integrator,
            clock,
            store,
            remote,
            fast,
        }
    }

    /// Shared integrator, for wiring up background maintenance.
    pub fn integrator(&self) -> Arc<CacheIntegrator> {
        self.integrator.clone()
    }

    /// Reconcile one (role, user, month) query.
    ///
    /// Errors are either pre-I/O validation or the fatal future-month gate;
    /// everything else comes back as a degraded [`ReconcileOutcome`].
    pub async fn reconcile(
        &self,
        role: RoleClass,
        user_id: &str,
        month: MonthRef,
    ) -> Result<ReconcileOutcome, EngineError> {
        validate_user_id(user_id)?;

        let snap = match self.clock.now() {
            Ok(snap) => snap,
            Err(e) => {
                warn!(error = %e, "clock read failed, taking conservative path");
                return Ok(self.clockless_fetch(role, user_id, month).await);
            }
        };

        // Piggyback mark hygiene on the query path.
        self.limiter.sweep(snap.date);

        let query_state = QueryState::classify(month, &snap, &self.resolver);
        debug!(
            user_id,
            role = role.as_str(),
            %month,
            state = query_state.as_str(),
            "reconciling"
        );

        match query_state {
            QueryState::FutureMonth => Err(EngineError::FutureMonth {
                queried: month,
                current: snap.month(),
            }),
            QueryState::PastMonth => Ok(self.past_month(role, user_id, month, &snap).await),
            QueryState::CurrentWeekend => {
                Ok(self.current_weekend(role, user_id, month, &snap).await)
            }
            QueryState::CurrentSchoolDay(window) => {
                Ok(self.school_day(window, role, user_id, month, &snap).await)
            }
        }
    }

    // ---- past month -----------------------------------------------------

    async fn past_month(
        &self,
        role: RoleClass,
        user_id: &str,
        month: MonthRef,
        snap: &ClockSnapshot,
    ) -> ReconcileOutcome {
        let (entry, exit) = match self.load_pair(role, user_id, month).await {
            Ok(pair) => pair,
            Err(e) => return store_degraded(e),
        };

        if entry.is_none() && exit.is_none() {
            return self
                .fetch_remote(role, user_id, month, snap, None, None, "no local data")
                .await;
        }

        let report = ConsistencyValidator::compare(entry.as_ref(), exit.as_ref(), CountMode::RawDays);
        if report.requires_repair {
            return self.repair(role, user_id, month, snap, entry, exit).await;
        }

        let label = window_label(month, self.resolver.resolve(snap).as_str());
        if self.limiter.check(user_id, snap, &label).already {
            return outcome(
                entry,
                exit,
                Provenance::LocalStore,
                true,
                "cooldown active; serving local data",
            );
        }

        // Trichotomy on when the pair was last written, relative to the
        // queried month.
        let update_month = last_update_month(entry.as_ref(), exit.as_ref());
        match update_month {
            Some(m) if m > month => outcome(
                entry,
                exit,
                Provenance::LocalStore,
                true,
                "finalized month; no refresh needed",
            ),
            Some(m) if m == month => {
                self.refresh_past(role, user_id, month, snap, entry, exit, &label, "possibly incomplete")
                    .await
            }
            _ => {
                self.refresh_past(role, user_id, month, snap, entry, exit, &label, "stale")
                    .await
            }
        }
    }

    /// Refetch a past month that may be missing its tail.
    #[allow(clippy::too_many_arguments)]
    async fn refresh_past(
        &self,
        role: RoleClass,
        user_id: &str,
        month: MonthRef,
        snap: &ClockSnapshot,
        entry: Option<MonthlyRecord>,
        exit: Option<MonthlyRecord>,
        label: &str,
        reason: &str,
    ) -> ReconcileOutcome {
        match self.fetch_and_persist(role, user_id, month, snap).await {
            Ok(Some((fresh_entry, fresh_exit))) => {
                self.limiter.mark(user_id, snap, label);
                outcome(
                    Some(fresh_entry),
                    Some(fresh_exit),
                    Provenance::RemoteSource,
                    false,
                    format!("refreshed {} month from authoritative source", reason),
                )
            }
            Ok(None) => {
                self.limiter.mark(user_id, snap, label);
                outcome(
                    entry,
                    exit,
                    Provenance::LocalStore,
                    false,
                    "remote had no data for month; serving local data",
                )
            }
            Err(e) => {
                warn!(error = %e, user_id, %month, "past-month refresh failed");
                outcome(
                    entry,
                    exit,
                    Provenance::LocalStore,
                    false,
                    format!("remote unavailable ({}); serving local data", e),
                )
            }
        }
    }

    // ---- current month, weekend -----------------------------------------

    async fn current_weekend(
        &self,
        role: RoleClass,
        user_id: &str,
        month: MonthRef,
        snap: &ClockSnapshot,
    ) -> ReconcileOutcome {
        let (entry, exit) = match self.load_pair(role, user_id, month).await {
            Ok(pair) => pair,
            Err(e) => return store_degraded(e),
        };

        if entry.is_none() && exit.is_none() {
            return self
                .fetch_remote(role, user_id, month, snap, None, None, "weekend with no local data")
                .await;
        }

        let report = ConsistencyValidator::compare(
            entry.as_ref(),
            exit.as_ref(),
            CountMode::SchoolDaysExcluding(snap.date),
        );
        if report.requires_repair {
            return self.repair(role, user_id, month, snap, entry, exit).await;
        }

        let label = window_label(month, "weekend");
        if self.limiter.check(user_id, snap, &label).already {
            return outcome(
                entry,
                exit,
                Provenance::LocalStore,
                true,
                "cooldown active; serving local data",
            );
        }

        let coverage = self
            .coverage
            .evaluate(entry.as_ref().or(exit.as_ref()), snap.date);
        if coverage.sufficient {
            let (entry, exit, folded) = self
                .fold_today_marks(role, user_id, month, snap, entry, exit)
                .await;
            return outcome(
                entry,
                exit,
                if folded {
                    Provenance::FastCache
                } else {
                    Provenance::LocalStore
                },
                false,
                "weekend; recent history sufficient",
            );
        }

        // Thin history: trust it anyway if Friday closed out late enough.
        let settled = last_update(entry.as_ref(), exit.as_ref())
            .map(|at| self.resolver.weekend_settled(snap, at))
            .unwrap_or(false);
        if settled {
            let (entry, exit, folded) = self
                .fold_today_marks(role, user_id, month, snap, entry, exit)
                .await;
            return outcome(
                entry,
                exit,
                if folded {
                    Provenance::FastCache
                } else {
                    Provenance::LocalStore
                },
                true,
                "weekend settled by Friday-complete update",
            );
        }

        let out = self
            .fetch_remote(
                role,
                user_id,
                month,
                snap,
                entry,
                exit,
                "weekend refresh; history thin and Friday incomplete",
            )
            .await;
        if out.provenance == Provenance::RemoteSource {
            self.limiter.mark(user_id, snap, &label);
        }
        out
    }

    // ---- current month, school day --------------------------------------

    async fn school_day(
        &self,
        window: QueryWindow,
        role: RoleClass,
        user_id: &str,
        month: MonthRef,
        snap: &ClockSnapshot,
    ) -> ReconcileOutcome {
        match window {
            QueryWindow::NoQuery => self.school_day_no_query(role, user_id, month, snap).await,
            QueryWindow::Consolidated => {
                let (entry, exit) = match self.load_pair(role, user_id, month).await {
                    Ok(pair) => pair,
                    Err(e) => return store_degraded(e),
                };
                // Remote data is settled by now; always take it.
                self.fetch_remote(role, user_id, month, snap, entry, exit, "consolidated window")
                    .await
            }
            QueryWindow::EntriesOnly | QueryWindow::Full => {
                self.school_day_live(window, role, user_id, month, snap).await
            }
        }
    }

    /// Pre-dawn: serve what we have, unless we have literally nothing.
    async fn school_day_no_query(
        &self,
        role: RoleClass,
        user_id: &str,
        month: MonthRef,
        snap: &ClockSnapshot,
    ) -> ReconcileOutcome {
        let (entry, exit) = match self.load_pair(role, user_id, month).await {
            Ok(pair) => pair,
            Err(e) => return store_degraded(e),
        };

        let coverage = self
            .coverage
            .evaluate(entry.as_ref().or(exit.as_ref()), snap.date);
        let day_total = entry.as_ref().map_or(0, |r| r.day_count())
            + exit.as_ref().map_or(0, |r| r.day_count());

        // An empty record with no trailing history is never an acceptable
        // terminal state, even before opening hours.
        if day_total == 0 && coverage.covered == 0 {
            info!(user_id, %month, "empty record in no-query window, escalating to remote");
            return self
                .fetch_remote(role, user_id, month, snap, entry, exit, "empty record escalation")
                .await;
        }

        let (entry, exit, folded) = self
            .fold_today_marks(role, user_id, month, snap, entry, exit)
            .await;
        outcome(
            entry,
            exit,
            if folded {
                Provenance::FastCache
            } else {
                Provenance::LocalStore
            },
            true,
            "before query hours; serving local data",
        )
    }

    /// Morning/afternoon regime: validate, check history, then either rebuild
    /// from the authoritative source or refresh today's marks from the fast
    /// tier under the cooldown.
    async fn school_day_live(
        &self,
        window: QueryWindow,
        role: RoleClass,
        user_id: &str,
        month: MonthRef,
        snap: &ClockSnapshot,
    ) -> ReconcileOutcome {
        let (entry, exit) = match self.load_pair(role, user_id, month).await {
            Ok(pair) => pair,
            Err(e) => return store_degraded(e),
        };

        if entry.is_some() || exit.is_some() {
            let report = ConsistencyValidator::compare(
                entry.as_ref(),
                exit.as_ref(),
                CountMode::SchoolDaysExcluding(snap.date),
            );
            if report.requires_repair {
                return self.repair(role, user_id, month, snap, entry, exit).await;
            }
        }

        let coverage = self
            .coverage
            .evaluate(entry.as_ref().or(exit.as_ref()), snap.date);
        let label = window_label(month, window.as_str());

        if !coverage.sufficient {
            debug!(
                user_id,
                covered = coverage.covered,
                trailing_gap = coverage.trailing_gap,
                "history insufficient, rebuilding from remote"
            );
            let out = self
                .rebuild_with_today(window, role, user_id, month, snap, entry, exit)
                .await;
            // Consume the window unless the remote call itself failed, so a
            // retry stays possible.
            if out.provenance != Provenance::LocalStore {
                self.limiter.mark(user_id, snap, &label);
            }
            return out;
        }

        if self.limiter.check(user_id, snap, &label).already {
            let (entry, exit, _) = self
                .fold_today_marks(role, user_id, month, snap, entry, exit)
                .await;
            return outcome(
                entry,
                exit,
                Provenance::LocalStore,
                true,
                "cooldown active; serving local data",
            );
        }

        // Fast-cache-only path. If every direction this window needs is
        // already cached for today, skip the tier entirely but still consume
        // the window so the next call does not re-query.
        let needed = needed_directions(window);
        let mut missing = Vec::new();
        for direction in &needed {
            let key = CacheKey::staff(snap.date, *direction, user_id);
            match self.integrator.lookup(&key).await {
                Ok(Some(_)) => {}
                Ok(None) => missing.push(*direction),
                Err(e) => {
                    warn!(error = %e, "cache lookup failed");
                    missing.push(*direction);
                }
            }
        }

        if missing.is_empty() {
            let (entry, exit, _) = self
                .fold_today_marks(role, user_id, month, snap, entry, exit)
                .await;
            self.limiter.mark(user_id, snap, &label);
            return outcome(
                entry,
                exit,
                Provenance::FastCache,
                true,
                "today's marks already cached; short-circuit",
            );
        }

        let (entry, exit, fetched) = self
            .refresh_from_fast_tier(role, user_id, month, snap, entry, exit, &missing)
            .await;
        self.limiter.mark(user_id, snap, &label);
        match fetched {
            Ok(_) => outcome(
                entry,
                exit,
                Provenance::FastCache,
                false,
                "refreshed today's marks from fast cache",
            ),
            Err(e) => outcome(
                entry,
                exit,
                Provenance::LocalStore,
                false,
                format!("fast cache unavailable ({}); serving local data", e),
            ),
        }
    }

    // ---- shared paths ---------------------------------------------------

    /// Consistency repair: rebuild the pair from the authoritative source,
    /// deleting local data only once fresh data is in hand.
    async fn repair(
        &self,
        role: RoleClass,
        user_id: &str,
        month: MonthRef,
        snap: &ClockSnapshot,
        entry: Option<MonthlyRecord>,
        exit: Option<MonthlyRecord>,
    ) -> ReconcileOutcome {
        info!(user_id, %month, "entry/exit inconsistency detected, repairing");

        match self.remote.fetch_monthly(role, user_id, month).await {
            Ok(fetched) => {
                self.delete_pair(role, user_id, month).await;
                match fetched {
                    Some(remote) => {
                        let (fresh_entry, fresh_exit) =
                            self.build_and_persist(role, user_id, month, remote, snap).await;
                        outcome(
                            Some(fresh_entry),
                            Some(fresh_exit),
                            Provenance::RemoteSource,
                            false,
                            "inconsistency repaired from authoritative source",
                        )
                    }
                    None => ReconcileOutcome::not_found(
                        "inconsistent local data removed; remote had no data",
                        Provenance::RemoteSource,
                    ),
                }
            }
            Err(e) => {
                warn!(error = %e, user_id, %month, "repair refetch failed, keeping suspect data");
                outcome(
                    entry,
                    exit,
                    Provenance::LocalStore,
                    false,
                    format!("repair refetch failed ({}); serving suspect local data", e),
                )
            }
        }
    }

    /// Authoritative fetch with the existing pair as the degradation
    /// fallback. Persists and integrates on success.
    #[allow(clippy::too_many_arguments)]
    async fn fetch_remote(
        &self,
        role: RoleClass,
        user_id: &str,
        month: MonthRef,
        snap: &ClockSnapshot,
        entry: Option<MonthlyRecord>,
        exit: Option<MonthlyRecord>,
        reason: &str,
    ) -> ReconcileOutcome {
        match self.fetch_and_persist(role, user_id, month, snap).await {
            Ok(Some((fresh_entry, fresh_exit))) => outcome(
                Some(fresh_entry),
                Some(fresh_exit),
                Provenance::RemoteSource,
                false,
                format!("fetched from authoritative source ({})", reason),
            ),
            Ok(None) => {
                if entry.is_some() || exit.is_some() {
                    outcome(
                        entry,
                        exit,
                        Provenance::LocalStore,
                        false,
                        "remote had no data for month; serving local data",
                    )
                } else {
                    ReconcileOutcome::not_found(
                        format!("no data in any tier ({})", reason),
                        Provenance::RemoteSource,
                    )
                }
            }
            Err(e) => {
                warn!(error = %e, user_id, %month, "remote fetch failed");
                if entry.is_some() || exit.is_some() {
                    outcome(
                        entry,
                        exit,
                        Provenance::LocalStore,
                        false,
                        format!("remote unavailable ({}); serving local data", e),
                    )
                } else {
                    ReconcileOutcome::not_found(
                        format!("remote unavailable ({}); no local data", e),
                        Provenance::LocalStore,
                    )
                }
            }
        }
    }

    /// Remote rebuild followed by a same-day fast-tier refresh, for live
    /// windows with insufficient history.
    #[allow(clippy::too_many_arguments)]
    async fn rebuild_with_today(
        &self,
        window: QueryWindow,
        role: RoleClass,
        user_id: &str,
        month: MonthRef,
        snap: &ClockSnapshot,
        entry: Option<MonthlyRecord>,
        exit: Option<MonthlyRecord>,
    ) -> ReconcileOutcome {
        let fetched = match self.fetch_and_persist(role, user_id, month, snap).await {
            Ok(Some(pair)) => Some(pair),
            Ok(None) => None,
            Err(e) => {
                warn!(error = %e, user_id, %month, "remote rebuild failed");
                return outcome(
                    entry,
                    exit,
                    Provenance::LocalStore,
                    false,
                    format!("remote unavailable ({}); serving local data", e),
                );
            }
        };

        let remote_hit = fetched.is_some();
        let (entry, exit) = match fetched {
            Some((e, x)) => (Some(e), Some(x)),
            None => (entry, exit),
        };

        let needed = needed_directions(window);
        let (entry, exit, fast_result) = self
            .refresh_from_fast_tier(role, user_id, month, snap, entry, exit, &needed)
            .await;

        let provenance = if remote_hit {
            Provenance::RemoteSource
        } else {
            Provenance::FastCache
        };
        let message = match (remote_hit, fast_result) {
            (true, Ok(_)) => "rebuilt from authoritative source with today's marks".to_string(),
            (true, Err(e)) => {
                format!("rebuilt from authoritative source; fast cache unavailable ({})", e)
            }
            (false, Ok(_)) => "remote had no data; refreshed today's marks".to_string(),
            (false, Err(e)) => format!("remote had no data; fast cache unavailable ({})", e),
        };
        if entry.is_some() || exit.is_some() {
            outcome(entry, exit, provenance, false, message)
        } else {
            ReconcileOutcome::not_found(message, Provenance::RemoteSource)
        }
    }

    /// Pull today's marks for `directions` from the fast tier, cache them,
    /// and fold them into the pair.
    #[allow(clippy::too_many_arguments)]
    async fn refresh_from_fast_tier(
        &self,
        role: RoleClass,
        user_id: &str,
        month: MonthRef,
        snap: &ClockSnapshot,
        mut entry: Option<MonthlyRecord>,
        mut exit: Option<MonthlyRecord>,
        directions: &[Direction],
    ) -> (Option<MonthlyRecord>, Option<MonthlyRecord>, anyhow::Result<()>) {
        let mut failure = None;
        for &direction in directions {
            let key = CacheKey::staff(snap.date, direction, user_id);

            // A still-live cached mark wins over a new tier query.
            let mark = match self.integrator.lookup(&key).await {
                Ok(Some(cached)) => Some(cached.mark),
                Ok(None) => {
                    match self
                        .fast
                        .fetch(ActorKind::Staff, direction, user_id, snap.date)
                        .await
                    {
                        Ok(Some(mark)) => {
                            if let Err(e) =
                                self.integrator.record_mark(key.clone(), mark.clone()).await
                            {
                                warn!(error = %e, "failed to cache fast-tier mark");
                            }
                            Some(mark)
                        }
                        Ok(None) => None,
                        Err(e) => {
                            failure = Some(e);
                            None
                        }
                    }
                }
                Err(e) => {
                    failure = Some(e);
                    None
                }
            };

            if let Some(mark) = mark {
                let target = match direction {
                    Direction::Entry => &mut entry,
                    Direction::Exit => &mut exit,
                };
                let record = CacheIntegrator::promote(
                    target.take(),
                    role,
                    direction,
                    user_id,
                    month,
                    snap.date.day(),
                    &mark,
                    snap.instant,
                );
                if let Err(e) = self.store.put_monthly(&record).await {
                    warn!(error = %e, "failed to persist promoted record");
                }
                *target = Some(record);
            }
        }

        let result = match failure {
            Some(e) => Err(e),
            None => Ok(()),
        };
        (entry, exit, result)
    }

    /// Fold already-cached (non-expired) marks for today into the pair
    /// without touching the fast tier.
    async fn fold_today_marks(
        &self,
        role: RoleClass,
        user_id: &str,
        month: MonthRef,
        snap: &ClockSnapshot,
        mut entry: Option<MonthlyRecord>,
        mut exit: Option<MonthlyRecord>,
    ) -> (Option<MonthlyRecord>, Option<MonthlyRecord>, bool) {
        let mut folded = false;
        for direction in [Direction::Entry, Direction::Exit] {
            let key = CacheKey::staff(snap.date, direction, user_id);
            let cached = match self.integrator.lookup(&key).await {
                Ok(c) => c,
                Err(e) => {
                    warn!(error = %e, "cache lookup failed during fold");
                    continue;
                }
            };
            let Some(cached) = cached else { continue };

            let target = match direction {
                Direction::Entry => &mut entry,
                Direction::Exit => &mut exit,
            };
            let already = target
                .as_ref()
                .is_some_and(|r| r.days.contains_key(&snap.date.day()));
            if already {
                continue;
            }

            let record = CacheIntegrator::promote(
                target.take(),
                role,
                direction,
                user_id,
                month,
                snap.date.day(),
                &cached.mark,
                snap.instant,
            );
            if let Err(e) = self.store.put_monthly(&record).await {
                warn!(error = %e, "failed to persist folded record");
            }
            *target = Some(record);
            folded = true;
        }
        (entry, exit, folded)
    }

    /// Fetch the month from the authoritative source, build both records,
    /// fold any same-day cached marks the fetch raced with, and persist.
    async fn fetch_and_persist(
        &self,
        role: RoleClass,
        user_id: &str,
        month: MonthRef,
        snap: &ClockSnapshot,
    ) -> anyhow::Result<Option<(MonthlyRecord, MonthlyRecord)>> {
        let Some(remote) = self.remote.fetch_monthly(role, user_id, month).await? else {
            return Ok(None);
        };
        let pair = self.build_and_persist(role, user_id, month, remote, snap).await;
        Ok(Some(pair))
    }

    async fn build_and_persist(
        &self,
        role: RoleClass,
        user_id: &str,
        month: MonthRef,
        remote: RemoteMonthly,
        snap: &ClockSnapshot,
    ) -> (MonthlyRecord, MonthlyRecord) {
        let (entry, exit) = build_records(role, user_id, month, remote, snap.instant);
        let (mut entry, mut exit) = (entry, exit);

        // A same-day mark may have been cached before this record existed;
        // fold it in so the fetch does not shadow it.
        if month.contains(snap.date) {
            let (e, x, _) = self
                .fold_today_marks(role, user_id, month, snap, Some(entry), Some(exit))
                .await;
            // fold_today_marks only promotes into existing pairs here, both
            // sides are always Some.
            entry = e.expect("entry record present");
            exit = x.expect("exit record present");
        }

        if let Err(e) = self.store.put_monthly(&entry).await {
            warn!(error = %e, "failed to persist entry record");
        }
        if let Err(e) = self.store.put_monthly(&exit).await {
            warn!(error = %e, "failed to persist exit record");
        }
        (entry, exit)
    }

    async fn load_pair(
        &self,
        role: RoleClass,
        user_id: &str,
        month: MonthRef,
    ) -> anyhow::Result<(Option<MonthlyRecord>, Option<MonthlyRecord>)> {
        let entry = self
            .store
            .get_monthly(&MonthlyKey::new(role, Direction::Entry, user_id, month))
            .await?;
        let exit = self
            .store
            .get_monthly(&MonthlyKey::new(role, Direction::Exit, user_id, month))
            .await?;
        Ok((entry, exit))
    }

    async fn delete_pair(&self, role: RoleClass, user_id: &str, month: MonthRef) {
        for direction in [Direction::Entry, Direction::Exit] {
            let key = MonthlyKey::new(role, direction, user_id, month);
            if let Err(e) = self.store.delete_monthly(&key).await {
                warn!(error = %e, key = %key.storage_key(), "failed to delete record");
            }
        }
    }

    /// Clock unavailable: skip classification and take the most conservative
    /// fetch. Nothing is persisted, monotonic update stamps need a clock.
    async fn clockless_fetch(
        &self,
        role: RoleClass,
        user_id: &str,
        month: MonthRef,
    ) -> ReconcileOutcome {
        match self.remote.fetch_monthly(role, user_id, month).await {
            Ok(Some(remote)) => {
                let stamp = remote
                    .entry_days
                    .iter()
                    .chain(remote.exit_days.iter())
                    .map(|d| d.timestamp)
                    .max()
                    .unwrap_or(chrono::DateTime::<chrono::Utc>::MIN_UTC);
                let (entry, exit) = build_records(role, user_id, month, remote, stamp);
                outcome(
                    Some(entry),
                    Some(exit),
                    Provenance::RemoteSource,
                    false,
                    "clock unavailable; served authoritative data without persisting",
                )
            }
            Ok(None) => ReconcileOutcome::not_found(
                "clock unavailable; remote had no data",
                Provenance::RemoteSource,
            ),
            Err(e) => ReconcileOutcome::not_found(
                format!("clock unavailable and remote fetch failed ({})", e),
                Provenance::LocalStore,
            ),
        }
    }
}

// ---- free helpers -------------------------------------------------------

fn validate_user_id(user_id: &str) -> Result<(), EngineError> {
    if user_id.is_empty() {
        return Err(EngineError::Validation("empty user id".into()));
    }
    if user_id.len() > MAX_USER_ID_LEN {
        return Err(EngineError::Validation(format!(
            "user id longer than {} chars",
            MAX_USER_ID_LEN
        )));
    }
    if !user_id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
    {
        return Err(EngineError::Validation(format!(
            "user id contains invalid characters: {:?}",
            user_id
        )));
    }
    Ok(())
}

fn window_label(month: MonthRef, window: &str) -> String {
    format!("{}:{}", month, window)
}

fn needed_directions(window: QueryWindow) -> Vec<Direction> {
    match window {
        QueryWindow::EntriesOnly => vec![Direction::Entry],
        _ => vec![Direction::Entry, Direction::Exit],
    }
}

fn last_update(
    entry: Option<&MonthlyRecord>,
    exit: Option<&MonthlyRecord>,
) -> Option<chrono::DateTime<chrono::Utc>> {
    match (entry, exit) {
        (Some(e), Some(x)) => Some(e.last_update.max(x.last_update)),
        (Some(e), None) => Some(e.last_update),
        (None, Some(x)) => Some(x.last_update),
        (None, None) => None,
    }
}

fn last_update_month(
    entry: Option<&MonthlyRecord>,
    exit: Option<&MonthlyRecord>,
) -> Option<MonthRef> {
    last_update(entry, exit).map(|at| MonthRef::from_date(at.date_naive()))
}

fn build_records(
    role: RoleClass,
    user_id: &str,
    month: MonthRef,
    remote: RemoteMonthly,
    now: chrono::DateTime<chrono::Utc>,
) -> (MonthlyRecord, MonthlyRecord) {
    let mut entry = MonthlyRecord::new(role, Direction::Entry, user_id, month, now);
    entry.record_id = remote.entry_record_id;
    for day in remote.entry_days {
        entry.days.insert(
            day.day,
            DayRecord {
                timestamp: day.timestamp,
                offset_seconds: day.offset_seconds,
                status: day.status,
            },
        );
    }

    let mut exit = MonthlyRecord::new(role, Direction::Exit, user_id, month, now);
    exit.record_id = remote.exit_record_id;
    for day in remote.exit_days {
        exit.days.insert(
            day.day,
            DayRecord {
                timestamp: day.timestamp,
                offset_seconds: day.offset_seconds,
                status: day.status,
            },
        );
    }

    (entry, exit)
}

fn outcome(
    entry: Option<MonthlyRecord>,
    exit: Option<MonthlyRecord>,
    provenance: Provenance,
    optimized: bool,
    message: impl Into<String>,
) -> ReconcileOutcome {
    let found = entry.is_some() || exit.is_some();
    ReconcileOutcome {
        entry,
        exit,
        found,
        message: message.into(),
        provenance,
        optimized,
    }
}

fn store_degraded(e: anyhow::Error) -> ReconcileOutcome {
    warn!(error = %e, "local store unavailable");
    ReconcileOutcome::not_found(
        format!("local store unavailable ({})", e),
        Provenance::LocalStore,
    )
}
