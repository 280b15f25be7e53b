//! Cache storage trait and SQLite implementation.

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::warn;
use url::Url;

use super::traits::{CachedResponse, EntryInfo, RequestKey, StoredResponse};

/// Trait for cache storage backends.
///
/// Errors are returned as-is; the [`CacheManager`](super::CacheManager) decides
/// how to degrade when the backend is unavailable.
pub trait CacheStorage: Send + Sync {
  /// Create a partition if it does not exist yet.
  fn open_partition(&self, name: &str) -> Result<()>;

  /// Names of all partitions, in creation order.
  fn partition_names(&self) -> Result<Vec<String>>;

  /// Get a stored response.
  fn get(&self, partition: &str, key: &RequestKey) -> Result<Option<CachedResponse>>;

  /// Store or overwrite a response, creating the partition if needed.
  fn put(
    &self,
    partition: &str,
    key: &RequestKey,
    response: &StoredResponse,
    cached_at: DateTime<Utc>,
  ) -> Result<()>;

  /// Remove one entry. Returns whether something was removed.
  fn delete_entry(&self, partition: &str, key: &RequestKey) -> Result<bool>;

  /// Remove a partition and all its entries. Returns whether it existed.
  fn delete_partition(&self, name: &str) -> Result<bool>;

  /// List entries of a partition.
  fn entries(&self, partition: &str) -> Result<Vec<EntryInfo>>;
}

/// Storage implementation that doesn't cache anything.
/// Used when caching is disabled - all operations are no-ops.
pub struct NoopStorage;

impl CacheStorage for NoopStorage {
  fn open_partition(&self, _name: &str) -> Result<()> {
    Ok(())
  }

  fn partition_names(&self) -> Result<Vec<String>> {
    Ok(Vec::new())
  }

  fn get(&self, _partition: &str, _key: &RequestKey) -> Result<Option<CachedResponse>> {
    Ok(None) // Always miss
  }

  fn put(
    &self,
    _partition: &str,
    _key: &RequestKey,
    _response: &StoredResponse,
    _cached_at: DateTime<Utc>,
  ) -> Result<()> {
    Ok(()) // Discard
  }

  fn delete_entry(&self, _partition: &str, _key: &RequestKey) -> Result<bool> {
    Ok(false)
  }

  fn delete_partition(&self, _name: &str) -> Result<bool> {
    Ok(false)
  }

  fn entries(&self, _partition: &str) -> Result<Vec<EntryInfo>> {
    Ok(Vec::new())
  }
}

/// SQLite-based cache storage implementation.
pub struct SqliteStorage {
  conn: Mutex<Connection>,
}

impl SqliteStorage {
  /// Open the store at the default location.
  pub fn open() -> Result<Self> {
    Self::open_at(&Self::default_path()?)
  }

  /// Open the store at an explicit path, creating parent directories.
  pub fn open_at(path: &Path) -> Result<Self> {
    if let Some(parent) = path.parent() {
      if !parent.as_os_str().is_empty() {
        std::fs::create_dir_all(parent)
          .map_err(|e| eyre!("Failed to create cache directory: {}", e))?;
      }
    }

    let conn = Connection::open(path)
      .map_err(|e| eyre!("Failed to open cache database at {}: {}", path.display(), e))?;

    Self::with_connection(conn)
  }

  /// Open a throwaway store that lives in memory.
  pub fn open_in_memory() -> Result<Self> {
    let conn = Connection::open_in_memory()
      .map_err(|e| eyre!("Failed to open in-memory cache database: {}", e))?;
    Self::with_connection(conn)
  }

  fn with_connection(conn: Connection) -> Result<Self> {
    let storage = Self {
      conn: Mutex::new(conn),
    };
    storage.run_migrations()?;
    Ok(storage)
  }

  /// Get the default database path.
  pub fn default_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("chunkguard").join("cache.db"))
  }

  fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
    self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))
  }

  /// Run database migrations for cache tables.
  fn run_migrations(&self) -> Result<()> {
    let conn = self.lock()?;

    conn
      .execute_batch(CACHE_SCHEMA)
      .map_err(|e| eyre!("Failed to run cache migrations: {}", e))?;

    Ok(())
  }
}

/// Schema for cache tables.
const CACHE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS partitions (
    name TEXT PRIMARY KEY,
    created_seq INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS entries (
    partition_name TEXT NOT NULL,
    key_hash TEXT NOT NULL,
    method TEXT NOT NULL,
    url TEXT NOT NULL,
    status INTEGER NOT NULL,
    headers TEXT NOT NULL,
    body BLOB NOT NULL,
    cached_at TEXT NOT NULL,
    PRIMARY KEY (partition_name, key_hash)
);

CREATE INDEX IF NOT EXISTS idx_entries_cached_at
    ON entries(partition_name, cached_at);
"#;

fn ensure_partition(conn: &Connection, name: &str) -> Result<()> {
  conn
    .execute(
      "INSERT OR IGNORE INTO partitions (name, created_seq)
       VALUES (?1, (SELECT COALESCE(MAX(created_seq), 0) + 1 FROM partitions))",
      params![name],
    )
    .map_err(|e| eyre!("Failed to create partition {}: {}", name, e))?;
  Ok(())
}

impl CacheStorage for SqliteStorage {
  fn open_partition(&self, name: &str) -> Result<()> {
    let conn = self.lock()?;
    ensure_partition(&conn, name)
  }

  fn partition_names(&self) -> Result<Vec<String>> {
    let conn = self.lock()?;
    let mut stmt = conn
      .prepare("SELECT name FROM partitions ORDER BY created_seq")
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let names = stmt
      .query_map([], |row| row.get(0))
      .map_err(|e| eyre!("Failed to list partitions: {}", e))?
      .collect::<rusqlite::Result<Vec<String>>>()
      .map_err(|e| eyre!("Failed to read partition row: {}", e))?;

    Ok(names)
  }

  fn get(&self, partition: &str, key: &RequestKey) -> Result<Option<CachedResponse>> {
    let conn = self.lock()?;

    let row: Option<(u16, String, Vec<u8>, String)> = conn
      .query_row(
        "SELECT status, headers, body, cached_at FROM entries
         WHERE partition_name = ? AND key_hash = ?",
        params![partition, key.cache_hash()],
        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
      )
      .optional()
      .map_err(|e| eyre!("Failed to read entry {}: {}", key.description(), e))?;

    match row {
      Some((status, headers, body, cached_at)) => {
        let headers: Vec<(String, String)> = serde_json::from_str(&headers)
          .map_err(|e| eyre!("Failed to decode headers for {}: {}", key.description(), e))?;
        Ok(Some(CachedResponse {
          response: StoredResponse::new(status, headers, body),
          cached_at: parse_datetime(&cached_at)?,
        }))
      }
      None => Ok(None),
    }
  }

  fn put(
    &self,
    partition: &str,
    key: &RequestKey,
    response: &StoredResponse,
    cached_at: DateTime<Utc>,
  ) -> Result<()> {
    let mut conn = self.lock()?;
    let headers = serde_json::to_string(&response.headers)
      .map_err(|e| eyre!("Failed to encode headers: {}", e))?;

    let tx = conn
      .transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    ensure_partition(&tx, partition)?;

    tx.execute(
      "INSERT OR REPLACE INTO entries
         (partition_name, key_hash, method, url, status, headers, body, cached_at)
       VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
      params![
        partition,
        key.cache_hash(),
        key.method(),
        key.url(),
        response.status,
        headers,
        response.body,
        cached_at.to_rfc3339(),
      ],
    )
    .map_err(|e| eyre!("Failed to store entry {}: {}", key.description(), e))?;

    tx.commit()
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;

    Ok(())
  }

  fn delete_entry(&self, partition: &str, key: &RequestKey) -> Result<bool> {
    let conn = self.lock()?;
    let removed = conn
      .execute(
        "DELETE FROM entries WHERE partition_name = ? AND key_hash = ?",
        params![partition, key.cache_hash()],
      )
      .map_err(|e| eyre!("Failed to delete entry {}: {}", key.description(), e))?;
    Ok(removed > 0)
  }

  fn delete_partition(&self, name: &str) -> Result<bool> {
    let mut conn = self.lock()?;
    let tx = conn
      .transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    tx.execute("DELETE FROM entries WHERE partition_name = ?", params![name])
      .map_err(|e| eyre!("Failed to delete entries of {}: {}", name, e))?;
    let removed = tx
      .execute("DELETE FROM partitions WHERE name = ?", params![name])
      .map_err(|e| eyre!("Failed to delete partition {}: {}", name, e))?;

    tx.commit()
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;

    Ok(removed > 0)
  }

  fn entries(&self, partition: &str) -> Result<Vec<EntryInfo>> {
    let conn = self.lock()?;
    let mut stmt = conn
      .prepare(
        "SELECT key_hash, method, url, cached_at FROM entries
         WHERE partition_name = ?
         ORDER BY cached_at, url",
      )
      .map_err(|e| eyre!("Failed to prepare entry query: {}", e))?;

    let rows = stmt
      .query_map(params![partition], |row| {
        Ok((
          row.get::<_, String>(0)?,
          row.get::<_, String>(1)?,
          row.get::<_, String>(2)?,
          row.get::<_, String>(3)?,
        ))
      })
      .map_err(|e| eyre!("Failed to query entries: {}", e))?
      .collect::<rusqlite::Result<Vec<_>>>()
      .map_err(|e| eyre!("Failed to read entry row: {}", e))?;
    drop(stmt);

    let mut entries = Vec::with_capacity(rows.len());
    for (key_hash, method, raw_url, cached_at) in rows {
      match parse_entry(&method, &raw_url, &cached_at) {
        Ok(entry) => entries.push(entry),
        Err(e) => {
          // Unreadable rows can never be matched or swept.
          warn!(partition, url = %raw_url, error = %e, "dropping unreadable cache entry");
          conn
            .execute(
              "DELETE FROM entries WHERE partition_name = ? AND key_hash = ?",
              params![partition, key_hash],
            )
            .map_err(|e| eyre!("Failed to delete unreadable entry: {}", e))?;
        }
      }
    }
    Ok(entries)
  }
}

fn parse_entry(method: &str, raw_url: &str, cached_at: &str) -> Result<EntryInfo> {
  let url = Url::parse(raw_url).map_err(|e| eyre!("Stored URL '{}' is invalid: {}", raw_url, e))?;
  Ok(EntryInfo {
    key: RequestKey::new(method, &url),
    cached_at: parse_datetime(cached_at)?,
  })
}

/// Parse a stored RFC 3339 timestamp.
fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| eyre!("Failed to parse datetime '{}': {}", s, e))
}
