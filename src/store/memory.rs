//! In-memory [`LocalStore`] for tests and embedding callers.

use super::LocalStore;
use crate::models::{CacheEntry, CacheKey, MonthlyKey, MonthlyRecord};
use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use parking_lot::Mutex;
use std::collections::HashMap;

#[derive(Default)]
pub struct MemoryStore {
    monthly: Mutex<HashMap<String, MonthlyRecord>>,
    cache: Mutex<HashMap<String, CacheEntry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn monthly_count(&self) -> usize {
        self.monthly.lock().len()
    }

    pub fn cache_count(&self) -> usize {
        self.cache.lock().len()
    }
}

#[async_trait]
impl LocalStore for MemoryStore {
    async fn get_monthly(&self, key: &MonthlyKey) -> Result<Option<MonthlyRecord>> {
        Ok(self.monthly.lock().get(&key.storage_key()).cloned())
    }

    async fn put_monthly(&self, record: &MonthlyRecord) -> Result<()> {
        self.monthly
            .lock()
            .insert(record.key().storage_key(), record.clone());
        Ok(())
    }

    async fn delete_monthly(&self, key: &MonthlyKey) -> Result<()> {
        self.monthly.lock().remove(&key.storage_key());
        Ok(())
    }

    async fn get_cache(&self, key: &CacheKey) -> Result<Option<CacheEntry>> {
        Ok(self.cache.lock().get(&key.storage_key()).cloned())
    }

    async fn put_cache(&self, entry: &CacheEntry) -> Result<()> {
        self.cache
            .lock()
            .insert(entry.key.storage_key(), entry.clone());
        Ok(())
    }

    async fn delete_cache(&self, key: &CacheKey) -> Result<()> {
        self.cache.lock().remove(&key.storage_key());
        Ok(())
    }

    async fn list_cache(&self) -> Result<Vec<CacheEntry>> {
        Ok(self.cache.lock().values().cloned().collect())
    }

    async fn delete_cache_before(&self, boundary: NaiveDate) -> Result<usize> {
        let mut cache = self.cache.lock();
        let before = cache.len();
        cache.retain(|_, entry| entry.key.date >= boundary);
        Ok(before - cache.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CacheMark, DayStatus, Direction, MonthRef, RoleClass};
    use chrono::{TimeZone, Utc};

    #[tokio::test]
    async fn test_monthly_put_is_idempotent_overwrite() {
        let store = MemoryStore::new();
        let now = Utc.with_ymd_and_hms(2026, 8, 3, 10, 0, 0).unwrap();
        let rec = MonthlyRecord::new(
            RoleClass::Teacher,
            Direction::Entry,
            "u1",
            MonthRef::new(2026, 8),
            now,
        );
        store.put_monthly(&rec).await.unwrap();
        store.put_monthly(&rec).await.unwrap();
        assert_eq!(store.monthly_count(), 1);

        let got = store.get_monthly(&rec.key()).await.unwrap().unwrap();
        assert_eq!(got, rec);

        store.delete_monthly(&rec.key()).await.unwrap();
        assert!(store.get_monthly(&rec.key()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_cache_before_boundary() {
        let store = MemoryStore::new();
        let now = Utc.with_ymd_and_hms(2026, 8, 7, 10, 0, 0).unwrap();
        for day in [5, 6, 7] {
            let key = CacheKey::staff(
                NaiveDate::from_ymd_opt(2026, 8, day).unwrap(),
                Direction::Entry,
                "u1",
            );
            store
                .put_cache(&CacheEntry {
                    key,
                    mark: CacheMark::Status {
                        status: DayStatus::OnTime,
                    },
                    queried_at: now,
                })
                .await
                .unwrap();
        }

        let removed = store
            .delete_cache_before(NaiveDate::from_ymd_opt(2026, 8, 7).unwrap())
            .await
            .unwrap();
        assert_eq!(removed, 2);
        assert_eq!(store.cache_count(), 1);
    }
}
