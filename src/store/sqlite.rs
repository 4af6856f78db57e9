//! Sqlite-backed [`LocalStore`].
//!
//! WAL mode for concurrent reads during writes, composite-key `WITHOUT ROWID`
//! tables, records serialized as JSON blobs alongside the indexed columns.
//! Critical sections are short and synchronous; the connection sits behind a
//! `parking_lot` mutex.

use super::LocalStore;
use crate::models::{CacheEntry, CacheKey, MonthlyKey, MonthlyRecord};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OpenFlags};
use std::sync::Arc;
use tracing::{info, warn};

const SCHEMA_SQL: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA synchronous = NORMAL;

CREATE TABLE IF NOT EXISTS monthly_records (
    record_key TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    month TEXT NOT NULL,
    record_json TEXT NOT NULL,
    last_update INTEGER NOT NULL
) WITHOUT ROWID;

CREATE INDEX IF NOT EXISTS idx_monthly_user_month
    ON monthly_records(user_id, month);

CREATE TABLE IF NOT EXISTS cache_entries (
    cache_key TEXT PRIMARY KEY,
    entry_date TEXT NOT NULL,
    entry_json TEXT NOT NULL,
    queried_at INTEGER NOT NULL
) WITHOUT ROWID;

CREATE INDEX IF NOT EXISTS idx_cache_entries_date
    ON cache_entries(entry_date);
"#;

#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    pub fn new(db_path: &str) -> Result<Self> {
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX; // We handle our own locking

        let conn = Connection::open_with_flags(db_path, flags)
            .with_context(|| format!("Failed to open database at {}", db_path))?;
        Self::init(conn, db_path)
    }

    /// Private in-memory database, used by tests.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        Self::init(conn, ":memory:")
    }

    fn init(conn: Connection, label: &str) -> Result<Self> {
        conn.execute_batch(SCHEMA_SQL)
            .context("Failed to initialize attendance schema")?;

        let journal_mode: String = conn
            .query_row("PRAGMA journal_mode", [], |row| row.get(0))
            .unwrap_or_default();
        if label != ":memory:" && journal_mode.to_lowercase() != "wal" {
            warn!("WAL mode not active, journal_mode = {}", journal_mode);
        }

        info!("attendance store initialized at: {}", label);
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }
}

#[async_trait]
impl LocalStore for SqliteStore {
    async fn get_monthly(&self, key: &MonthlyKey) -> Result<Option<MonthlyRecord>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare_cached("SELECT record_json FROM monthly_records WHERE record_key = ?1")
            .context("prepare get_monthly")?;
        let json: Option<String> = stmt
            .query_row(params![key.storage_key()], |row| row.get(0))
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other),
            })
            .context("query monthly record")?;

        match json {
            Some(j) => {
                let record =
                    serde_json::from_str(&j).context("deserialize monthly record")?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    async fn put_monthly(&self, record: &MonthlyRecord) -> Result<()> {
        let json = serde_json::to_string(record).context("serialize monthly record")?;
        let conn = self.conn.lock();
        conn.execute(
            "INSERT OR REPLACE INTO monthly_records
                (record_key, user_id, month, record_json, last_update)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                record.key().storage_key(),
                record.user_id,
                record.month.to_string(),
                json,
                record.last_update.timestamp_millis(),
            ],
        )
        .context("insert monthly record")?;
        Ok(())
    }

    async fn delete_monthly(&self, key: &MonthlyKey) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "DELETE FROM monthly_records WHERE record_key = ?1",
            params![key.storage_key()],
        )
        .context("delete monthly record")?;
        Ok(())
    }

    async fn get_cache(&self, key: &CacheKey) -> Result<Option<CacheEntry>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare_cached("SELECT entry_json FROM cache_entries WHERE cache_key = ?1")
            .context("prepare get_cache")?;
        let json: Option<String> = stmt
            .query_row(params![key.storage_key()], |row| row.get(0))
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other),
            })
            .context("query cache entry")?;

        match json {
            Some(j) => Ok(Some(
                serde_json::from_str(&j).context("deserialize cache entry")?,
            )),
            None => Ok(None),
        }
    }

    async fn put_cache(&self, entry: &CacheEntry) -> Result<()> {
        let json = serde_json::to_string(entry).context("serialize cache entry")?;
        let conn = self.conn.lock();
        conn.execute(
            "INSERT OR REPLACE INTO cache_entries
                (cache_key, entry_date, entry_json, queried_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                entry.key.storage_key(),
                entry.key.date.to_string(),
                json,
                entry.queried_at.timestamp_millis(),
            ],
        )
        .context("insert cache entry")?;
        Ok(())
    }

    async fn delete_cache(&self, key: &CacheKey) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "DELETE FROM cache_entries WHERE cache_key = ?1",
            params![key.storage_key()],
        )
        .context("delete cache entry")?;
        Ok(())
    }

    async fn list_cache(&self) -> Result<Vec<CacheEntry>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare_cached("SELECT entry_json FROM cache_entries")
            .context("prepare list_cache")?;
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .context("query cache entries")?;

        let mut entries = Vec::new();
        for row in rows {
            let json = row.context("read cache row")?;
            entries.push(serde_json::from_str(&json).context("deserialize cache entry")?);
        }
        Ok(entries)
    }

    async fn delete_cache_before(&self, boundary: NaiveDate) -> Result<usize> {
        let conn = self.conn.lock();
        // ISO dates compare lexicographically.
        let removed = conn
            .execute(
                "DELETE FROM cache_entries WHERE entry_date < ?1",
                params![boundary.to_string()],
            )
            .context("purge cache entries")?;
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        CacheMark, DayRecord, DayStatus, Direction, MonthRef, RoleClass,
    };
    use chrono::{TimeZone, Utc};

    fn sample_record() -> MonthlyRecord {
        let now = Utc.with_ymd_and_hms(2026, 8, 5, 9, 30, 0).unwrap();
        let mut rec = MonthlyRecord::new(
            RoleClass::Teacher,
            Direction::Entry,
            "u1",
            MonthRef::new(2026, 8),
            now,
        );
        rec.record_id = Some("rec-42".into());
        rec.put_day(
            5,
            DayRecord {
                timestamp: now,
                offset_seconds: -120,
                status: DayStatus::OnTime,
            },
            now,
        );
        rec
    }

    #[tokio::test]
    async fn test_monthly_round_trip() {
        let store = SqliteStore::in_memory().unwrap();
        let rec = sample_record();

        store.put_monthly(&rec).await.unwrap();
        let got = store.get_monthly(&rec.key()).await.unwrap().unwrap();
        assert_eq!(got, rec);

        // Overwrite with an extra day, still one row.
        let mut updated = rec.clone();
        updated.put_day(
            6,
            DayRecord {
                timestamp: rec.last_update,
                offset_seconds: 30,
                status: DayStatus::Late,
            },
            rec.last_update + chrono::Duration::hours(1),
        );
        store.put_monthly(&updated).await.unwrap();
        let got = store.get_monthly(&rec.key()).await.unwrap().unwrap();
        assert_eq!(got.day_count(), 2);

        store.delete_monthly(&rec.key()).await.unwrap();
        assert!(store.get_monthly(&rec.key()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_cache_round_trip_and_purge() {
        let store = SqliteStore::in_memory().unwrap();
        let now = Utc.with_ymd_and_hms(2026, 8, 7, 8, 0, 0).unwrap();

        for day in [5, 6, 7] {
            let entry = CacheEntry {
                key: CacheKey::staff(
                    NaiveDate::from_ymd_opt(2026, 8, day).unwrap(),
                    Direction::Entry,
                    "u1",
                ),
                mark: CacheMark::Stamped {
                    timestamp: now,
                    offset_seconds: 0,
                },
                queried_at: now,
            };
            store.put_cache(&entry).await.unwrap();
        }

        assert_eq!(store.list_cache().await.unwrap().len(), 3);

        let removed = store
            .delete_cache_before(NaiveDate::from_ymd_opt(2026, 8, 7).unwrap())
            .await
            .unwrap();
        assert_eq!(removed, 2);

        let left = store.list_cache().await.unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].key.date, NaiveDate::from_ymd_opt(2026, 8, 7).unwrap());
    }

    #[tokio::test]
    async fn test_on_disk_store_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("attendance.db");
        let rec = sample_record();

        {
            let store = SqliteStore::new(path.to_str().unwrap()).unwrap();
            store.put_monthly(&rec).await.unwrap();
        }

        let reopened = SqliteStore::new(path.to_str().unwrap()).unwrap();
        let got = reopened.get_monthly(&rec.key()).await.unwrap().unwrap();
        assert_eq!(got.record_id.as_deref(), Some("rec-42"));
    }
}
