//! In-memory byte store for tests and ephemeral stacks.

use super::traits::{ByteStore, StoreConfig, StoreStats, StoredEntry};
use crate::error::Result;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

/// HashMap-backed store with the same TTL and eviction semantics as the
/// SQLite implementation. Not persisted across restarts.
#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, StoredEntry>>,
    config: StoreConfig,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_config(StoreConfig::default())
    }

    pub fn with_config(config: StoreConfig) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            config,
        }
    }

    fn is_live(entry: &StoredEntry, now: DateTime<Utc>) -> bool {
        entry.expires_at > now
    }
}

impl ByteStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.get_entry(key).map(|opt| opt.map(|e| e.value))
    }

    fn get_entry(&self, key: &str) -> Result<Option<StoredEntry>> {
        let now = Utc::now();
        let mut entries = self.entries.write().expect("store lock poisoned");

        match entries.get_mut(key) {
            Some(entry) if Self::is_live(entry, now) => {
                entry.last_accessed = now;
                Ok(Some(entry.clone()))
            }
            _ => Ok(None),
        }
    }

    fn put(&self, key: &str, value: &[u8], ttl: Duration) -> Result<()> {
        let now = Utc::now();
        let entry = StoredEntry {
            value: value.to_vec(),
            stored_at: now,
            expires_at: now + chrono::Duration::from_std(ttl).unwrap_or_default(),
            size_bytes: value.len() as u64,
            last_accessed: now,
        };

        self.entries
            .write()
            .expect("store lock poisoned")
            .insert(key.to_string(), entry);

        if self.config.enable_eviction && self.config.max_size_bytes > 0 {
            self.evict_to_size(self.config.max_size_bytes)?;
        }
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<bool> {
        Ok(self
            .entries
            .write()
            .expect("store lock poisoned")
            .remove(key)
            .is_some())
    }

    fn list_keys(&self) -> Result<Vec<String>> {
        let mut keys: Vec<String> = self
            .entries
            .read()
            .expect("store lock poisoned")
            .keys()
            .cloned()
            .collect();
        keys.sort();
        Ok(keys)
    }

    fn cleanup_expired(&self) -> Result<usize> {
        let now = Utc::now();
        let mut entries = self.entries.write().expect("store lock poisoned");
        let before = entries.len();
        entries.retain(|_, e| Self::is_live(e, now));
        Ok(before - entries.len())
    }

    fn evict_to_size(&self, max_bytes: u64) -> Result<usize> {
        let mut entries = self.entries.write().expect("store lock poisoned");
        let mut evicted = 0usize;

        loop {
            let total: u64 = entries.values().map(|e| e.size_bytes).sum();
            if total <= max_bytes {
                break;
            }
            let oldest = entries
                .iter()
                .min_by_key(|(_, e)| e.last_accessed)
                .map(|(k, _)| k.clone());
            match oldest {
                Some(key) => {
                    entries.remove(&key);
                    evicted += 1;
                }
                None => break,
            }
        }

        Ok(evicted)
    }

    fn stats(&self) -> Result<StoreStats> {
        let entries = self.entries.read().expect("store lock poisoned");
        Ok(StoreStats {
            total_entries: entries.len(),
            total_size_bytes: entries.values().map(|e| e.size_bytes).sum(),
            max_size_bytes: self.config.max_size_bytes,
        })
    }

    fn clear_all(&self) -> Result<()> {
        self.entries.write().expect("store lock poisoned").clear();
        Ok(())
    }
}
