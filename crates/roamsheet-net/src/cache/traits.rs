//! Byte-store trait and types for the agent's response cache.

use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for store behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct StoreConfig {
    /// Default TTL for entries.
    pub default_ttl: Duration,
    /// Maximum store size in bytes (0 = unlimited).
    pub max_size_bytes: u64,
    /// Whether to enable LRU eviction when max size is reached.
    pub enable_eviction: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            default_ttl: crate::config::AgentConfig::STORE_TTL,
            max_size_bytes: crate::config::AgentConfig::STORE_MAX_BYTES,
            enable_eviction: true,
        }
    }
}

/// A stored entry with metadata.
#[derive(Debug, Clone)]
pub struct StoredEntry {
    /// The stored data as bytes.
    pub value: Vec<u8>,
    /// When the entry was stored.
    pub stored_at: DateTime<Utc>,
    /// When the entry expires.
    pub expires_at: DateTime<Utc>,
    /// Size of the stored data in bytes.
    pub size_bytes: u64,
    /// When the entry was last accessed.
    pub last_accessed: DateTime<Utc>,
}

/// Store statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreStats {
    /// Total number of entries.
    pub total_entries: usize,
    /// Total size of all stored data in bytes.
    pub total_size_bytes: u64,
    /// Maximum allowed size in bytes.
    pub max_size_bytes: u64,
}

/// Generic key-value byte store.
///
/// The interception agent owns exactly one of these; any persistent or
/// in-memory implementation with these operations suffices. Operations are
/// synchronous to match rusqlite's API.
pub trait ByteStore: Send + Sync {
    /// Get stored data by key.
    ///
    /// Returns `None` if the key doesn't exist or has expired.
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Get stored data with full entry metadata.
    fn get_entry(&self, key: &str) -> Result<Option<StoredEntry>>;

    /// Store data with TTL. Overwrites any existing entry with the same key.
    fn put(&self, key: &str, value: &[u8], ttl: Duration) -> Result<()>;

    /// Delete a specific key. Returns whether an entry was removed.
    fn delete(&self, key: &str) -> Result<bool>;

    /// List every key currently present, expired entries included.
    fn list_keys(&self) -> Result<Vec<String>>;

    /// Remove expired entries. Returns the number removed.
    fn cleanup_expired(&self) -> Result<usize>;

    /// Evict least-recently-accessed entries until the store is under the
    /// size limit. Returns the number evicted.
    fn evict_to_size(&self, max_bytes: u64) -> Result<usize>;

    /// Get store statistics.
    fn stats(&self) -> Result<StoreStats>;

    /// Clear all stored data.
    fn clear_all(&self) -> Result<()>;
}
