//! SQLite-based byte store implementation.

use super::traits::{ByteStore, StoreConfig, StoreStats, StoredEntry};
use crate::error::{NetError, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::debug;

/// SQLite-backed store.
///
/// A single shared database file; thread-safe via an internal mutex on the
/// connection.
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
    config: StoreConfig,
}

impl SqliteStore {
    /// Create a new store at the specified database path.
    ///
    /// Creates the database and tables if they don't exist.
    pub fn new(db_path: impl AsRef<Path>) -> Result<Self> {
        Self::with_config(db_path, StoreConfig::default())
    }

    /// Create a new store with custom configuration.
    pub fn with_config(db_path: impl AsRef<Path>, config: StoreConfig) -> Result<Self> {
        let db_path = db_path.as_ref();

        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| NetError::Io {
                message: format!("Failed to create store directory: {}", e),
                path: Some(parent.to_path_buf()),
                source: Some(e),
            })?;
        }

        let conn = Connection::open(db_path).map_err(|e| NetError::Cache {
            message: format!("Failed to open store database: {}", e),
            source: Some(e),
        })?;

        // WAL mode for better concurrent access
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .map_err(|e| NetError::Cache {
                message: format!("Failed to set pragmas: {}", e),
                source: Some(e),
            })?;

        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
            config,
        };

        store.init_schema()?;

        Ok(store)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|e| NetError::Cache {
            message: format!("Failed to lock store database: {}", e),
            source: None,
        })
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.lock()?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS store_entries (
                key TEXT PRIMARY KEY,
                value BLOB NOT NULL,
                stored_at TEXT NOT NULL,
                expires_at TEXT NOT NULL,
                size_bytes INTEGER NOT NULL,
                last_accessed TEXT NOT NULL
            );

            -- Index for expiration queries
            CREATE INDEX IF NOT EXISTS idx_store_expires
                ON store_entries(expires_at);

            -- Index for LRU eviction
            CREATE INDEX IF NOT EXISTS idx_store_accessed
                ON store_entries(last_accessed);
            "#,
        )
        .map_err(|e| NetError::Cache {
            message: format!("Failed to initialize store schema: {}", e),
            source: Some(e),
        })?;

        Ok(())
    }

    /// Evict if the configured size bound is exceeded.
    fn check_eviction(&self) -> Result<()> {
        if !self.config.enable_eviction || self.config.max_size_bytes == 0 {
            return Ok(());
        }

        let stats = self.stats()?;
        if stats.total_size_bytes > self.config.max_size_bytes {
            let evicted = self.evict_to_size(self.config.max_size_bytes)?;
            if evicted > 0 {
                debug!("Evicted {} entries to stay under size limit", evicted);
            }
        }

        Ok(())
    }
}

impl ByteStore for SqliteStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.get_entry(key).map(|opt| opt.map(|e| e.value))
    }

    fn get_entry(&self, key: &str) -> Result<Option<StoredEntry>> {
        let conn = self.lock()?;

        let now = Utc::now();
        let now_str = now.to_rfc3339();

        let row: Option<(Vec<u8>, String, String, i64, String)> = conn
            .query_row(
                r#"
                SELECT value, stored_at, expires_at, size_bytes, last_accessed
                FROM store_entries
                WHERE key = ?1 AND expires_at > ?2
                "#,
                params![key, now_str],
                |row| {
                    Ok((
                        row.get(0)?,
                        row.get(1)?,
                        row.get(2)?,
                        row.get(3)?,
                        row.get(4)?,
                    ))
                },
            )
            .optional()
            .map_err(|e| NetError::Cache {
                message: format!("Failed to query store entry: {}", e),
                source: Some(e),
            })?;

        let (value, stored_at_str, expires_at_str, size_bytes, last_accessed_str) = match row {
            Some(r) => r,
            None => return Ok(None),
        };

        // Touch last_accessed for LRU eviction
        let _ = conn.execute(
            "UPDATE store_entries SET last_accessed = ?1 WHERE key = ?2",
            params![now_str, key],
        );

        let parse = |s: &str| {
            DateTime::parse_from_rfc3339(s)
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or(now)
        };

        Ok(Some(StoredEntry {
            value,
            stored_at: parse(&stored_at_str),
            expires_at: parse(&expires_at_str),
            size_bytes: size_bytes as u64,
            last_accessed: parse(&last_accessed_str),
        }))
    }

    fn put(&self, key: &str, value: &[u8], ttl: Duration) -> Result<()> {
        let expires_at = Utc::now() + chrono::Duration::from_std(ttl).unwrap_or_default();

        {
            let conn = self.lock()?;

            let now = Utc::now().to_rfc3339();
            let expires_str = expires_at.to_rfc3339();
            let size_bytes = value.len() as i64;

            conn.execute(
                r#"
                INSERT OR REPLACE INTO store_entries
                (key, value, stored_at, expires_at, size_bytes, last_accessed)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                "#,
                params![key, value, now, expires_str, size_bytes, now],
            )
            .map_err(|e| NetError::Cache {
                message: format!("Failed to put store entry: {}", e),
                source: Some(e),
            })?;
        }

        // Lock released before eviction check
        self.check_eviction()
    }

    fn delete(&self, key: &str) -> Result<bool> {
        let conn = self.lock()?;

        let deleted = conn
            .execute("DELETE FROM store_entries WHERE key = ?1", params![key])
            .map_err(|e| NetError::Cache {
                message: format!("Failed to delete store entry: {}", e),
                source: Some(e),
            })?;

        Ok(deleted > 0)
    }

    fn list_keys(&self) -> Result<Vec<String>> {
        let conn = self.lock()?;

        let mut stmt = conn
            .prepare("SELECT key FROM store_entries ORDER BY key")
            .map_err(|e| NetError::Cache {
                message: format!("Failed to prepare key listing: {}", e),
                source: Some(e),
            })?;

        let keys = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(|e| NetError::Cache {
                message: format!("Failed to list store keys: {}", e),
                source: Some(e),
            })?
            .filter_map(|r| r.ok())
            .collect();

        Ok(keys)
    }

    fn cleanup_expired(&self) -> Result<usize> {
        let conn = self.lock()?;

        let now_str = Utc::now().to_rfc3339();
        let deleted = conn
            .execute(
                "DELETE FROM store_entries WHERE expires_at <= ?1",
                params![now_str],
            )
            .map_err(|e| NetError::Cache {
                message: format!("Failed to clean up expired entries: {}", e),
                source: Some(e),
            })?;

        Ok(deleted)
    }

    fn evict_to_size(&self, max_bytes: u64) -> Result<usize> {
        let conn = self.lock()?;

        let mut evicted = 0usize;
        loop {
            let total: i64 = conn
                .query_row(
                    "SELECT COALESCE(SUM(size_bytes), 0) FROM store_entries",
                    [],
                    |row| row.get(0),
                )
                .map_err(|e| NetError::Cache {
                    message: format!("Failed to query store size: {}", e),
                    source: Some(e),
                })?;

            if total as u64 <= max_bytes {
                break;
            }

            let removed = conn
                .execute(
                    r#"
                    DELETE FROM store_entries WHERE key = (
                        SELECT key FROM store_entries
                        ORDER BY last_accessed ASC LIMIT 1
                    )
                    "#,
                    [],
                )
                .map_err(|e| NetError::Cache {
                    message: format!("Failed to evict store entry: {}", e),
                    source: Some(e),
                })?;

            if removed == 0 {
                break;
            }
            evicted += removed;
        }

        Ok(evicted)
    }

    fn stats(&self) -> Result<StoreStats> {
        let conn = self.lock()?;

        let (count, size): (i64, i64) = conn
            .query_row(
                "SELECT COUNT(*), COALESCE(SUM(size_bytes), 0) FROM store_entries",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .map_err(|e| NetError::Cache {
                message: format!("Failed to query store stats: {}", e),
                source: Some(e),
            })?;

        Ok(StoreStats {
            total_entries: count as usize,
            total_size_bytes: size as u64,
            max_size_bytes: self.config.max_size_bytes,
        })
    }

    fn clear_all(&self) -> Result<()> {
        let conn = self.lock()?;

        conn.execute("DELETE FROM store_entries", [])
            .map_err(|e| NetError::Cache {
                message: format!("Failed to clear store: {}", e),
                source: Some(e),
            })?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_store() -> (TempDir, SqliteStore) {
        let dir = TempDir::new().unwrap();
        let store = SqliteStore::new(dir.path().join("store.sqlite")).unwrap();
        (dir, store)
    }

    #[test]
    fn test_put_get_roundtrip() {
        let (_dir, store) = test_store();

        store
            .put("v1|https://x/app.js", b"payload", Duration::from_secs(60))
            .unwrap();

        let value = store.get("v1|https://x/app.js").unwrap();
        assert_eq!(value, Some(b"payload".to_vec()));
    }

    #[test]
    fn test_get_missing_returns_none() {
        let (_dir, store) = test_store();
        assert!(store.get("nope").unwrap().is_none());
    }

    #[test]
    fn test_expired_entry_not_returned() {
        let (_dir, store) = test_store();

        store.put("k", b"v", Duration::ZERO).unwrap();
        assert!(store.get("k").unwrap().is_none());

        let removed = store.cleanup_expired().unwrap();
        assert_eq!(removed, 1);
    }

    #[test]
    fn test_delete() {
        let (_dir, store) = test_store();

        store.put("k", b"v", Duration::from_secs(60)).unwrap();
        assert!(store.delete("k").unwrap());
        assert!(!store.delete("k").unwrap());
        assert!(store.get("k").unwrap().is_none());
    }

    #[test]
    fn test_list_keys() {
        let (_dir, store) = test_store();

        store.put("b", b"2", Duration::from_secs(60)).unwrap();
        store.put("a", b"1", Duration::from_secs(60)).unwrap();

        assert_eq!(store.list_keys().unwrap(), vec!["a", "b"]);
    }

    #[test]
    fn test_overwrite_replaces_value() {
        let (_dir, store) = test_store();

        store.put("k", b"old", Duration::from_secs(60)).unwrap();
        store.put("k", b"new", Duration::from_secs(60)).unwrap();

        assert_eq!(store.get("k").unwrap(), Some(b"new".to_vec()));
        assert_eq!(store.stats().unwrap().total_entries, 1);
    }

    #[test]
    fn test_evict_to_size() {
        let (_dir, store) = test_store();

        store.put("a", &[0u8; 100], Duration::from_secs(60)).unwrap();
        store.put("b", &[0u8; 100], Duration::from_secs(60)).unwrap();
        store.put("c", &[0u8; 100], Duration::from_secs(60)).unwrap();

        let evicted = store.evict_to_size(150).unwrap();
        assert_eq!(evicted, 2);
        assert_eq!(store.stats().unwrap().total_entries, 1);
    }

    #[test]
    fn test_clear_all() {
        let (_dir, store) = test_store();

        store.put("a", b"1", Duration::from_secs(60)).unwrap();
        store.put("b", b"2", Duration::from_secs(60)).unwrap();
        store.clear_all().unwrap();

        assert_eq!(store.stats().unwrap().total_entries, 0);
    }
}
