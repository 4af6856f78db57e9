//! rollcall-core — attendance reconciliation engine.
//!
//! Decides, per (role, user, month) query, which of three data tiers to trust:
//! the same-day fast cache, the durable monthly store, or the authoritative
//! remote source. Folds fast-cache marks into monthly records, enforces
//! entry/exit parity, and repairs broken pairs by rebuilding from the
//! authoritative source. All collaborators (clock included) are injected
//! traits, so every temporal policy is deterministic under test.

pub mod cache;
pub mod clock;
pub mod config;
pub mod error;
pub mod models;
pub mod policy;
pub mod reconcile;
pub mod sources;
pub mod store;

pub use cache::{spawn_maintenance, CacheIntegrator, MaintenanceHandle};
pub use clock::{Clock, ClockSnapshot, ManualClock, SystemClock};
pub use config::EngineConfig;
pub use error::EngineError;
pub use models::{
    ActorKind, CacheEntry, CacheKey, CacheMark, DayRecord, DayStatus, Direction, GroupRef,
    MonthRef, MonthlyKey, MonthlyRecord, Provenance, ReconcileOutcome, RoleClass,
};
pub use reconcile::{QueryState, Reconciler};
pub use sources::{FastCache, HttpFastCache, HttpRemoteSource, RemoteDay, RemoteMonthly, RemoteSource};
pub use store::{LocalStore, MemoryStore, SqliteStore};
