//! Page-side recovery actions.

use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::cache::{CacheManager, CacheStorage};
use crate::worker::{ClientMessage, WorkerMessage, WorkerPort};

/// Partition name fragments that mark bundle caches.
pub const DEFAULT_PARTITION_MARKERS: &[&str] = &["dynamic", "chunk"];

/// The environment a page runs in.
pub trait PageHost: Send + Sync {
  /// Full reload of the page. Not cancellable.
  fn reload(&self);

  /// Navigate to the home page.
  fn navigate_home(&self);

  /// Ask the user a yes/no question.
  fn confirm(&self, prompt: &str) -> bool;

  /// Show a non-blocking notice.
  fn notify(&self, message: &str);
}

/// The "clear bundle caches, then reload" recovery shared by every detector.
pub struct RecoveryActions<S: CacheStorage> {
  cache: CacheManager<S>,
  host: Arc<dyn PageHost>,
  worker: Option<WorkerPort>,
  partition_markers: Vec<String>,
}

impl<S: CacheStorage> RecoveryActions<S> {
  pub fn new(cache: CacheManager<S>, host: Arc<dyn PageHost>) -> Self {
    Self {
      cache,
      host,
      worker: None,
      partition_markers: DEFAULT_PARTITION_MARKERS
        .iter()
        .map(|s| s.to_string())
        .collect(),
    }
  }

  /// Tell this worker about chunk errors.
  pub fn with_worker(mut self, port: WorkerPort) -> Self {
    self.worker = Some(port);
    self
  }

  pub fn with_partition_markers(mut self, markers: Vec<String>) -> Self {
    self.partition_markers = markers;
    self
  }

  pub fn host(&self) -> &dyn PageHost {
    self.host.as_ref()
  }

  pub fn is_bundle_partition(&self, name: &str) -> bool {
    self.partition_markers.iter().any(|m| name.contains(m.as_str()))
  }

  /// Delete every bundle-related partition.
  pub fn clear_bundle_caches(&self) -> Vec<String> {
    self
      .cache
      .delete_partitions_matching(|name| self.is_bundle_partition(name))
  }

  /// Notify the worker, drop bundle caches and reload the page.
  pub fn clear_and_reload(&self) {
    if let Some(worker) = &self.worker {
      if !worker.post(ClientMessage::ChunkError) {
        warn!("worker is gone, clearing bundle caches locally only");
      }
    }

    let cleared = self.clear_bundle_caches();
    info!(partitions = ?cleared, "reloading page after bundle failure");
    self.host.reload();
  }
}

/// Relay worker broadcasts to the page until the worker goes away.
pub async fn forward_worker_notices(
  mut notices: broadcast::Receiver<WorkerMessage>,
  host: Arc<dyn PageHost>,
) {
  loop {
    match notices.recv().await {
      Ok(WorkerMessage::ChunkCacheCleared { message }) => host.notify(&message),
      Err(broadcast::error::RecvError::Lagged(missed)) => {
        warn!(missed, "page fell behind on worker notices");
      }
      Err(broadcast::error::RecvError::Closed) => break,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::{RequestKey, SqliteStorage, StoredResponse};
  use crate::recovery::testing::RecordingHost;
  use url::Url;

  fn seeded_cache() -> CacheManager<SqliteStorage> {
    let cache = CacheManager::new(SqliteStorage::open_in_memory().unwrap());
    let key = RequestKey::new("GET", &Url::parse("https://app.test/a.js").unwrap());
    let body = StoredResponse::new(200, Vec::new(), b"a".to_vec());
    for name in ["ospc-static-v1", "ospc-dynamic-v1", "next-chunks"] {
      cache.put(name, &key, &body);
    }
    cache
  }

  #[test]
  fn clear_and_reload_keeps_shell_assets() {
    let host = Arc::new(RecordingHost::new(true));
    let cache = seeded_cache();
    let actions = RecoveryActions::new(cache.clone(), host.clone());

    actions.clear_and_reload();

    assert_eq!(cache.partition_names(), vec!["ospc-static-v1".to_string()]);
    assert_eq!(host.reloads(), 1);
  }

  #[test]
  fn custom_partition_markers() {
    let host = Arc::new(RecordingHost::new(true));
    let actions = RecoveryActions::new(seeded_cache(), host)
      .with_partition_markers(vec!["static".to_string()]);

    assert!(actions.is_bundle_partition("ospc-static-v1"));
    assert!(!actions.is_bundle_partition("ospc-dynamic-v1"));
    assert_eq!(actions.clear_bundle_caches(), vec!["ospc-static-v1".to_string()]);
  }

  #[tokio::test]
  async fn notices_are_forwarded_until_closed() {
    let host = Arc::new(RecordingHost::new(true));
    let (tx, rx) = broadcast::channel(4);
    tx.send(WorkerMessage::chunk_cache_cleared()).unwrap();
    drop(tx);

    forward_worker_notices(rx, host.clone()).await;

    assert_eq!(host.notices().len(), 1);
    assert!(host.notices()[0].contains("reload"));
    assert_eq!(host.reloads(), 0);
  }
}
