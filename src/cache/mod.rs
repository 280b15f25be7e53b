//! Partitioned response cache.
//!
//! This module provides the storage side of bundle delivery:
//! - Named partitions (`static` shell assets, `dynamic` code bundles)
//! - Entries keyed by normalized request identity with a capture timestamp
//! - Sweeping of entries older than a retention window
//! - Selective eviction of partitions that don't belong to the running version

mod manager;
mod storage;
mod traits;

pub use manager::{default_max_age, max_age_from_secs, CacheManager, PartitionHandle, DEFAULT_MAX_AGE_MS};
pub use storage::{CacheStorage, NoopStorage, SqliteStorage};
pub use traits::{CachedResponse, EntryInfo, PartitionSet, RequestKey, StoredResponse};
