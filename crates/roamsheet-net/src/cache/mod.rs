//! Key-value byte storage for the interception agent's response cache.
//!
//! This module provides:
//! - The `ByteStore` abstraction (get/put/delete/list-keys plus maintenance)
//! - A SQLite-backed persistent implementation
//! - An in-memory implementation for tests and ephemeral stacks

mod memory;
mod sqlite;
mod traits;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use traits::{ByteStore, StoreConfig, StoreStats, StoredEntry};
