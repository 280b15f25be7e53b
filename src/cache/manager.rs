//! Cache manager that owns partition contents and never fails observably.
//!
//! Caching is an optimization, so every storage error is logged and turned
//! into "cache miss" or a no-op. Callers always get to try the network path.

use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::storage::CacheStorage;
use super::traits::{CachedResponse, EntryInfo, PartitionSet, RequestKey, StoredResponse};

/// Default retention window for stored bundles, in milliseconds.
pub const DEFAULT_MAX_AGE_MS: i64 = 3_600_000;

pub fn default_max_age() -> Duration {
  Duration::milliseconds(DEFAULT_MAX_AGE_MS)
}

/// Retention window from a number of seconds, saturating at the largest
/// representable duration.
pub fn max_age_from_secs(secs: u64) -> Duration {
  i64::try_from(secs)
    .ok()
    .and_then(Duration::try_seconds)
    .unwrap_or(Duration::MAX)
}

/// Front door to the cache store.
pub struct CacheManager<S: CacheStorage> {
  storage: Arc<S>,
}

impl<S: CacheStorage> CacheManager<S> {
  pub fn new(storage: S) -> Self {
    Self {
      storage: Arc::new(storage),
    }
  }

  /// Get a scoped handle to a partition, creating it if absent.
  pub fn open<'a>(&'a self, partition: &'a str) -> PartitionHandle<'a, S> {
    if let Err(e) = self.storage.open_partition(partition) {
      warn!(partition, error = %e, "cache open failed");
    }
    PartitionHandle {
      manager: self,
      name: partition,
    }
  }

  /// Look up a stored response. Storage errors read as a miss.
  pub fn match_entry(&self, partition: &str, key: &RequestKey) -> Option<CachedResponse> {
    match self.storage.get(partition, key) {
      Ok(hit) => hit,
      Err(e) => {
        warn!(partition, key = %key.description(), error = %e, "cache lookup failed");
        None
      }
    }
  }

  /// Look up a request in `preferred`, then in every other partition in
  /// creation order.
  pub fn match_any(&self, preferred: &str, key: &RequestKey) -> Option<CachedResponse> {
    self.match_entry(preferred, key).or_else(|| {
      self
        .partition_names()
        .iter()
        .filter(|name| name.as_str() != preferred)
        .find_map(|name| self.match_entry(name, key))
    })
  }

  /// Store a response, stamped with its `Date` header or the current time.
  pub fn put(&self, partition: &str, key: &RequestKey, response: &StoredResponse) {
    let cached_at = response.date_header().unwrap_or_else(Utc::now);
    self.put_at(partition, key, response, cached_at);
  }

  /// Store a response with an explicit capture time.
  pub fn put_at(
    &self,
    partition: &str,
    key: &RequestKey,
    response: &StoredResponse,
    cached_at: DateTime<Utc>,
  ) {
    match self.storage.put(partition, key, response, cached_at) {
      Ok(()) => debug!(partition, key = %key.description(), "cached response"),
      Err(e) => warn!(partition, key = %key.description(), error = %e, "cache put failed"),
    }
  }

  /// Remove one entry; returns whether anything was removed.
  pub fn delete_entry(&self, partition: &str, key: &RequestKey) -> bool {
    self
      .storage
      .delete_entry(partition, key)
      .unwrap_or_else(|e| {
        warn!(partition, key = %key.description(), error = %e, "cache delete failed");
        false
      })
  }

  /// Remove a whole partition; returns whether it existed.
  pub fn delete_partition(&self, partition: &str) -> bool {
    self.storage.delete_partition(partition).unwrap_or_else(|e| {
      warn!(partition, error = %e, "cache partition delete failed");
      false
    })
  }

  /// Entries of a partition, empty when the store is unavailable.
  pub fn keys(&self, partition: &str) -> Vec<EntryInfo> {
    self.storage.entries(partition).unwrap_or_else(|e| {
      warn!(partition, error = %e, "cache key enumeration failed");
      Vec::new()
    })
  }

  pub fn partition_names(&self) -> Vec<String> {
    self.storage.partition_names().unwrap_or_else(|e| {
      warn!(error = %e, "cache partition enumeration failed");
      Vec::new()
    })
  }

  /// Remove entries captured more than `max_age` ago. Returns the number removed.
  pub fn sweep_expired(&self, partition: &str, max_age: Duration) -> usize {
    self.sweep_expired_at(partition, max_age, Utc::now())
  }

  /// [`sweep_expired`](Self::sweep_expired) against an explicit clock.
  ///
  /// A negative window, or one reaching past the earliest representable
  /// time, expires nothing.
  pub fn sweep_expired_at(&self, partition: &str, max_age: Duration, now: DateTime<Utc>) -> usize {
    if max_age < Duration::zero() {
      warn!(partition, max_age = %max_age, "negative retention window, nothing swept");
      return 0;
    }
    let Some(cutoff) = now.checked_sub_signed(max_age) else {
      debug!(partition, "retention window exceeds clock range, nothing swept");
      return 0;
    };
    let removed = self
      .keys(partition)
      .into_iter()
      .filter(|entry| entry.cached_at < cutoff)
      .filter(|entry| self.delete_entry(partition, &entry.key))
      .count();

    if removed > 0 {
      info!(partition, removed, "swept expired cache entries");
    }
    removed
  }

  /// Delete every partition outside the current set. Returns the deleted names.
  pub fn retain_partitions(&self, current: &PartitionSet) -> Vec<String> {
    self.delete_partitions_matching(|name| !current.contains(name))
  }

  /// Delete every partition whose name satisfies `predicate`.
  pub fn delete_partitions_matching<P>(&self, predicate: P) -> Vec<String>
  where
    P: Fn(&str) -> bool,
  {
    let deleted: Vec<String> = self
      .partition_names()
      .into_iter()
      .filter(|name| predicate(name))
      .filter(|name| self.delete_partition(name))
      .collect();

    if !deleted.is_empty() {
      info!(partitions = ?deleted, "deleted cache partitions");
    }
    deleted
  }
}

impl<S: CacheStorage> Clone for CacheManager<S> {
  fn clone(&self) -> Self {
    Self {
      storage: Arc::clone(&self.storage),
    }
  }
}

/// Scoped view of a single partition.
pub struct PartitionHandle<'a, S: CacheStorage> {
  manager: &'a CacheManager<S>,
  name: &'a str,
}

impl<S: CacheStorage> PartitionHandle<'_, S> {
  pub fn name(&self) -> &str {
    self.name
  }

  pub fn match_entry(&self, key: &RequestKey) -> Option<CachedResponse> {
    self.manager.match_entry(self.name, key)
  }

  pub fn put(&self, key: &RequestKey, response: &StoredResponse) {
    self.manager.put(self.name, key, response);
  }

  pub fn delete(&self, key: &RequestKey) -> bool {
    self.manager.delete_entry(self.name, key)
  }

  pub fn keys(&self) -> Vec<EntryInfo> {
    self.manager.keys(self.name)
  }
}
