//! Local persistence seam.
//!
//! The engine treats the durable store as a key-value collaborator: idempotent
//! puts keyed by composite identity, so concurrent writers converge instead of
//! corrupting. Two implementations ship here: an in-memory map for tests and
//! callers that bring their own durability, and a sqlite-backed store.

use crate::models::{CacheEntry, CacheKey, MonthlyKey, MonthlyRecord};
use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;

pub mod memory;
pub mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

#[async_trait]
pub trait LocalStore: Send + Sync {
    async fn get_monthly(&self, key: &MonthlyKey) -> Result<Option<MonthlyRecord>>;

    /// Overwrite semantics: putting the same record twice is a no-op.
    async fn put_monthly(&self, record: &MonthlyRecord) -> Result<()>;

    async fn delete_monthly(&self, key: &MonthlyKey) -> Result<()>;

    async fn get_cache(&self, key: &CacheKey) -> Result<Option<CacheEntry>>;

    async fn put_cache(&self, entry: &CacheEntry) -> Result<()>;

    async fn delete_cache(&self, key: &CacheKey) -> Result<()>;

    /// Every ephemeral entry currently held, in no particular order.
    async fn list_cache(&self) -> Result<Vec<CacheEntry>>;

    /// Delete every ephemeral entry dated strictly before `boundary`.
    /// Returns how many were removed.
    async fn delete_cache_before(&self, boundary: NaiveDate) -> Result<usize>;
}
