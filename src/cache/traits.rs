//! Core types for the response cache.

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use url::Url;

/// Normalized identity of a request: upper-cased method plus URL without fragment.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestKey {
  method: String,
  url: String,
}

impl RequestKey {
  pub fn new(method: &str, url: &Url) -> Self {
    let mut url = url.clone();
    url.set_fragment(None);
    Self {
      method: method.trim().to_uppercase(),
      url: url.to_string(),
    }
  }

  pub fn method(&self) -> &str {
    &self.method
  }

  pub fn url(&self) -> &str {
    &self.url
  }

  /// Stable, fixed-length storage key.
  pub fn cache_hash(&self) -> String {
    let mut hasher = Sha256::new();
    hasher.update(self.method.as_bytes());
    hasher.update(b" ");
    hasher.update(self.url.as_bytes());
    hex::encode(hasher.finalize())
  }

  /// Human-readable form for logs and listings.
  pub fn description(&self) -> String {
    format!("{} {}", self.method, self.url)
  }
}

/// Snapshot of a response that can be stored and replayed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredResponse {
  pub status: u16,
  pub headers: Vec<(String, String)>,
  pub body: Vec<u8>,
}

impl StoredResponse {
  pub fn new(status: u16, headers: Vec<(String, String)>, body: Vec<u8>) -> Self {
    Self {
      status,
      headers,
      body,
    }
  }

  /// 2xx status.
  pub fn is_success(&self) -> bool {
    (200..300).contains(&self.status)
  }

  /// Case-insensitive header lookup.
  pub fn header(&self, name: &str) -> Option<&str> {
    self
      .headers
      .iter()
      .find(|(k, _)| k.eq_ignore_ascii_case(name))
      .map(|(_, v)| v.as_str())
  }

  /// Capture time advertised by the `Date` header, if any.
  pub fn date_header(&self) -> Option<DateTime<Utc>> {
    let raw = self.header("date")?;
    DateTime::parse_from_rfc2822(raw)
      .ok()
      .map(|dt| dt.with_timezone(&Utc))
  }
}

/// A response read back from a partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedResponse {
  pub response: StoredResponse,
  /// When the response was captured
  pub cached_at: DateTime<Utc>,
}

/// Listing row for an entry, without the body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryInfo {
  pub key: RequestKey,
  pub cached_at: DateTime<Utc>,
}

/// Names of the partitions that belong to the running version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionSet {
  pub static_name: String,
  pub dynamic_name: String,
}

impl PartitionSet {
  pub fn new(prefix: &str, version: &str) -> Self {
    Self {
      static_name: format!("{}-static-{}", prefix, version),
      dynamic_name: format!("{}-dynamic-{}", prefix, version),
    }
  }

  pub fn contains(&self, name: &str) -> bool {
    name == self.static_name || name == self.dynamic_name
  }

  pub fn names(&self) -> [&str; 2] {
    [&self.static_name, &self.dynamic_name]
  }
}

impl Default for PartitionSet {
  fn default() -> Self {
    Self::new("ospc", "v1")
  }
}
