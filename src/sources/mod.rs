//! Upstream tier contracts: the authoritative source and the fast cache.
//!
//! The engine owns no wire protocol; these traits are the whole surface it
//! needs. `None` means not-found — transport failures are errors, absence is
//! not.

use crate::models::{ActorKind, CacheMark, DayStatus, Direction, MonthRef, RoleClass};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

pub mod http;

pub use http::{HttpFastCache, HttpRemoteSource};

/// One settled day as reported by the authoritative source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteDay {
    pub day: u32,
    pub timestamp: DateTime<Utc>,
    pub offset_seconds: i32,
    pub status: DayStatus,
}

/// A month of authoritative data, both directions at once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteMonthly {
    pub entry_record_id: Option<String>,
    pub exit_record_id: Option<String>,
    pub entry_days: Vec<RemoteDay>,
    pub exit_days: Vec<RemoteDay>,
}

/// The durable backing tier consulted when local data is insufficient.
#[async_trait]
pub trait RemoteSource: Send + Sync {
    async fn fetch_monthly(
        &self,
        role: RoleClass,
        user_id: &str,
        month: MonthRef,
    ) -> Result<Option<RemoteMonthly>>;
}

/// The low-latency tier holding today's not-yet-settled marks.
#[async_trait]
pub trait FastCache: Send + Sync {
    async fn fetch(
        &self,
        actor: ActorKind,
        direction: Direction,
        user_id: &str,
        date: NaiveDate,
    ) -> Result<Option<CacheMark>>;
}
