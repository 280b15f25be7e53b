//! Fetch interceptor that puts the cache between pages and the network.

use color_eyre::Result;
use futures::future::join_all;
use std::sync::Arc;
use tracing::{debug, info, warn};
use url::Url;

use crate::cache::{CacheManager, CacheStorage, CachedResponse, PartitionSet, StoredResponse};

use super::classify::{Classifier, RequestClass};
use super::client::Fetcher;
use super::messages::WorkerMessage;
use super::types::{Interception, ResourceRequest, ResponseSource};

/// Intercepts resource requests and applies a per-class fetch strategy.
///
/// Bundles are fetched network-first; a successful response is copied into
/// the dynamic partition in the background. When the network fails the stored
/// copy is served, and when there is none a stand-in script is synthesized so
/// the page that asked for the bundle keeps running.
///
/// There are no retries here. Backoff is the recovery controller's job.
///
/// Storage calls block on a SQLite connection behind a mutex, so every cache
/// access from async code runs on the blocking pool.
pub struct Interceptor<F: Fetcher, S: CacheStorage> {
  fetcher: Arc<F>,
  cache: CacheManager<S>,
  partitions: PartitionSet,
  classifier: Classifier,
}

impl<F: Fetcher, S: CacheStorage + 'static> Interceptor<F, S> {
  pub fn new(
    fetcher: F,
    cache: CacheManager<S>,
    partitions: PartitionSet,
    classifier: Classifier,
  ) -> Self {
    Self {
      fetcher: Arc::new(fetcher),
      cache,
      partitions,
      classifier,
    }
  }

  pub fn cache(&self) -> &CacheManager<S> {
    &self.cache
  }

  pub fn fetcher(&self) -> &F {
    &self.fetcher
  }

  pub fn partitions(&self) -> &PartitionSet {
    &self.partitions
  }

  /// Handle a single request.
  ///
  /// Only asset and passthrough requests can fail; a bundle request always
  /// produces a response.
  pub async fn handle(&self, request: &ResourceRequest) -> Result<Interception> {
    let class = self.classifier.classify(request);
    debug!(url = %request.url, ?class, "intercepted request");

    match class {
      RequestClass::Bundle => Ok(self.handle_bundle(request).await),
      RequestClass::Asset => self.handle_asset(request).await,
      RequestClass::Passthrough => {
        let response = self.fetcher.fetch(request).await?;
        Ok(Interception::new(response, ResponseSource::Passthrough))
      }
    }
  }

  async fn handle_bundle(&self, request: &ResourceRequest) -> Interception {
    match self.fetcher.fetch(request).await {
      Ok(response) if response.is_success() => {
        let pending_store = self.store_in_background(request, &response);
        Interception {
          response,
          source: ResponseSource::Network,
          pending_store: Some(pending_store),
        }
      }
      Ok(response) => {
        warn!(url = %request.url, status = response.status, "bundle fetch returned an error status");
        self.bundle_fallback(request).await
      }
      Err(e) => {
        warn!(url = %request.url, error = %e, "bundle fetch failed");
        self.bundle_fallback(request).await
      }
    }
  }

  fn store_in_background(
    &self,
    request: &ResourceRequest,
    response: &StoredResponse,
  ) -> tokio::task::JoinHandle<()> {
    let cache = self.cache.clone();
    let partition = self.partitions.dynamic_name.clone();
    let key = request.key();
    let copy = response.clone();

    tokio::task::spawn_blocking(move || cache.put(&partition, &key, &copy))
  }

  /// Run a cache call on the blocking pool. `None` if the task died.
  async fn with_cache<T, C>(&self, call: C) -> Option<T>
  where
    T: Send + 'static,
    C: FnOnce(&CacheManager<S>) -> T + Send + 'static,
  {
    let cache = self.cache.clone();
    match tokio::task::spawn_blocking(move || call(&cache)).await {
      Ok(value) => Some(value),
      Err(e) => {
        warn!(error = %e, "cache task failed");
        None
      }
    }
  }

  async fn lookup(&self, partition: Option<&str>, request: &ResourceRequest) -> Option<CachedResponse> {
    let key = request.key();
    let preferred = self.partitions.static_name.clone();
    let hit = match partition {
      Some(name) => {
        let name = name.to_string();
        self.with_cache(move |cache| cache.match_entry(&name, &key)).await
      }
      None => self.with_cache(move |cache| cache.match_any(&preferred, &key)).await,
    };
    hit.flatten()
  }

  async fn bundle_fallback(&self, request: &ResourceRequest) -> Interception {
    match self.lookup(Some(&self.partitions.dynamic_name), request).await {
      Some(cached) => {
        info!(url = %request.url, cached_at = %cached.cached_at, "serving cached bundle");
        Interception::new(cached.response, ResponseSource::Cache)
      }
      None => {
        warn!(url = %request.url, "no cached bundle, serving stand-in");
        Interception::new(stand_in(&request.url), ResponseSource::StandIn)
      }
    }
  }

  async fn handle_asset(&self, request: &ResourceRequest) -> Result<Interception> {
    match self.fetcher.fetch(request).await {
      Ok(response) => Ok(Interception::new(response, ResponseSource::Network)),
      Err(e) => match self.lookup(None, request).await {
        Some(cached) => {
          info!(url = %request.url, "network unavailable, serving cached asset");
          Ok(Interception::new(cached.response, ResponseSource::Cache))
        }
        None => Err(e),
      },
    }
  }

  /// Pre-cache shell assets into the static partition.
  ///
  /// Fetches run concurrently; failures are logged and skipped. Returns how
  /// many assets were stored.
  pub async fn install(&self, assets: &[Url]) -> usize {
    let partition = self.cache.open(&self.partitions.static_name);

    let fetches = assets.iter().map(|url| async move {
      let request = ResourceRequest::get(url.clone());
      let result = self.fetcher.fetch(&request).await;
      (request, result)
    });

    let mut stored = 0;
    for (request, result) in join_all(fetches).await {
      match result {
        Ok(response) if response.is_success() => {
          partition.put(&request.key(), &response);
          stored += 1;
        }
        Ok(response) => {
          warn!(url = %request.url, status = response.status, "precache skipped error response")
        }
        Err(e) => warn!(url = %request.url, error = %e, "precache fetch failed"),
      }
    }

    info!(stored, requested = assets.len(), "installed shell assets");
    stored
  }

  /// Drop partitions left behind by other versions.
  pub fn activate(&self) -> Vec<String> {
    for name in self.partitions.names() {
      self.cache.open(name);
    }
    self.cache.retain_partitions(&self.partitions)
  }

  /// Drop every stored bundle and produce the notice for open pages.
  pub async fn clear_bundle_cache(&self) -> WorkerMessage {
    let partition = self.partitions.dynamic_name.clone();
    let existed = self
      .with_cache(move |cache| cache.delete_partition(&partition))
      .await
      .unwrap_or(false);
    info!(partition = %self.partitions.dynamic_name, existed, "cleared bundle cache");
    WorkerMessage::chunk_cache_cleared()
  }

  /// Sweep expired bundles out of the dynamic partition.
  pub async fn sweep(&self, max_age: chrono::Duration) -> usize {
    let partition = self.partitions.dynamic_name.clone();
    self
      .with_cache(move |cache| cache.sweep_expired(&partition, max_age))
      .await
      .unwrap_or(0)
  }
}

/// Synthesize a script that reports the failed load without throwing.
pub fn stand_in(url: &Url) -> StoredResponse {
  let escaped = url.as_str().replace('\\', "\\\\").replace('\'', "\\'");
  let body = format!("console.error('Failed to load chunk: {}');", escaped);

  StoredResponse::new(
    200,
    vec![
      ("Content-Type".to_string(), "application/javascript".to_string()),
      ("Cache-Control".to_string(), "no-cache".to_string()),
    ],
    body.into_bytes(),
  )
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::{default_max_age, SqliteStorage};
  use crate::worker::testing::{script, FakeFetcher};
  use chrono::{Duration, Utc};

  const CHUNK: &str = "https://app.test/_next/static/chunks/42.js";

  fn interceptor(fetcher: FakeFetcher) -> Interceptor<FakeFetcher, SqliteStorage> {
    let origin = Url::parse("https://app.test").unwrap();
    Interceptor::new(
      fetcher,
      CacheManager::new(SqliteStorage::open_in_memory().unwrap()),
      PartitionSet::default(),
      Classifier::with_defaults(&origin),
    )
  }

  fn request(url: &str) -> ResourceRequest {
    ResourceRequest::get(Url::parse(url).unwrap())
  }

  #[tokio::test]
  async fn successful_bundle_is_returned_and_cached() {
    let fetcher = FakeFetcher::new();
    fetcher.respond(CHUNK, script("export default 42;"));
    let interceptor = interceptor(fetcher);

    let mut result = interceptor.handle(&request(CHUNK)).await.unwrap();
    assert_eq!(result.source, ResponseSource::Network);
    assert_eq!(result.response, script("export default 42;"));

    result.settle().await;
    let cached = interceptor
      .cache()
      .match_entry("ospc-dynamic-v1", &request(CHUNK).key())
      .unwrap();
    assert_eq!(cached.response, script("export default 42;"));
  }

  #[tokio::test]
  async fn failed_bundle_falls_back_to_cached_copy() {
    let interceptor = interceptor(FakeFetcher::new());
    let captured = Utc::now() - Duration::minutes(10);
    interceptor.cache().put_at(
      "ospc-dynamic-v1",
      &request(CHUNK).key(),
      &script("cached()"),
      captured,
    );

    let result = interceptor.handle(&request(CHUNK)).await.unwrap();
    assert_eq!(result.source, ResponseSource::Cache);
    assert_eq!(result.response.body, b"cached()".to_vec());
    assert!(result.pending_store.is_none());

    // Ten minutes old is inside the retention window.
    assert_eq!(interceptor.sweep(default_max_age()).await, 0);
    assert!(interceptor
      .cache()
      .match_entry("ospc-dynamic-v1", &request(CHUNK).key())
      .is_some());
  }

  #[tokio::test]
  async fn error_status_is_treated_as_failure() {
    let fetcher = FakeFetcher::new();
    fetcher.respond(CHUNK, StoredResponse::new(503, Vec::new(), b"busy".to_vec()));
    let interceptor = interceptor(fetcher);
    interceptor
      .cache()
      .put("ospc-dynamic-v1", &request(CHUNK).key(), &script("cached()"));

    let result = interceptor.handle(&request(CHUNK)).await.unwrap();
    assert_eq!(result.source, ResponseSource::Cache);
    assert_eq!(result.response.status, 200);
  }

  #[tokio::test]
  async fn missing_bundle_gets_a_stand_in() {
    let interceptor = interceptor(FakeFetcher::new());

    let result = interceptor.handle(&request(CHUNK)).await.unwrap();
    assert_eq!(result.source, ResponseSource::StandIn);
    assert_eq!(interceptor.fetcher().calls(), 1);
    assert_eq!(result.response.status, 200);
    assert_eq!(result.response.header("content-type"), Some("application/javascript"));
    assert_eq!(result.response.header("cache-control"), Some("no-cache"));
    assert_eq!(
      String::from_utf8(result.response.body).unwrap(),
      format!("console.error('Failed to load chunk: {}');", CHUNK)
    );
  }

  #[test]
  fn stand_in_escapes_quotes() {
    let url = Url::parse("https://app.test/it's.js").unwrap();
    let body = String::from_utf8(stand_in(&url).body).unwrap();
    assert_eq!(body, "console.error('Failed to load chunk: https://app.test/it\\'s.js');");
  }

  #[tokio::test]
  async fn asset_failure_uses_any_partition_then_propagates() {
    let interceptor = interceptor(FakeFetcher::new());
    let logo = "https://app.test/logo.png";
    interceptor.cache().put(
      "ospc-static-v1",
      &request(logo).key(),
      &StoredResponse::new(200, Vec::new(), b"png".to_vec()),
    );

    let hit = interceptor.handle(&request(logo)).await.unwrap();
    assert_eq!(hit.source, ResponseSource::Cache);

    let miss = interceptor.handle(&request("https://app.test/missing.png")).await;
    assert!(miss.is_err());
  }

  #[tokio::test]
  async fn asset_fallback_prefers_precached_copy() {
    let interceptor = interceptor(FakeFetcher::new());
    let shell = "https://app.test/";
    let key = request(shell).key();
    interceptor
      .cache()
      .put("ospc-dynamic-v1", &key, &StoredResponse::new(200, Vec::new(), b"dyn".to_vec()));
    interceptor
      .cache()
      .put("ospc-static-v1", &key, &StoredResponse::new(200, Vec::new(), b"shell".to_vec()));

    let hit = interceptor.handle(&request(shell)).await.unwrap();
    assert_eq!(hit.source, ResponseSource::Cache);
    assert_eq!(hit.response.body, b"shell".to_vec());
  }

  #[tokio::test]
  async fn asset_error_status_is_returned_as_is() {
    let fetcher = FakeFetcher::new();
    let page = "https://app.test/apply";
    fetcher.respond(page, StoredResponse::new(404, Vec::new(), Vec::new()));
    let interceptor = interceptor(fetcher);

    let result = interceptor.handle(&request(page)).await.unwrap();
    assert_eq!(result.source, ResponseSource::Network);
    assert_eq!(result.response.status, 404);
  }

  #[tokio::test]
  async fn cross_origin_requests_are_not_cached() {
    let fetcher = FakeFetcher::new();
    let cdn = "https://cdn.test/_next/static/chunks/1.js";
    fetcher.respond(cdn, script("cdn()"));
    let interceptor = interceptor(fetcher);

    let result = interceptor.handle(&request(cdn)).await.unwrap();
    assert_eq!(result.source, ResponseSource::Passthrough);
    assert!(result.pending_store.is_none());
    assert!(interceptor.cache().partition_names().is_empty());

    // And failures are not papered over with a stand-in.
    assert!(interceptor
      .handle(&request("https://cdn.test/_next/static/chunks/2.js"))
      .await
      .is_err());
  }

  #[tokio::test]
  async fn install_precaches_successful_assets() {
    let fetcher = FakeFetcher::new();
    fetcher.respond("https://app.test/", StoredResponse::new(200, Vec::new(), b"<html>".to_vec()));
    fetcher.respond("https://app.test/offline", StoredResponse::new(500, Vec::new(), Vec::new()));
    let interceptor = interceptor(fetcher);

    let assets = [
      Url::parse("https://app.test/").unwrap(),
      Url::parse("https://app.test/offline").unwrap(),
      Url::parse("https://app.test/down").unwrap(),
    ];
    assert_eq!(interceptor.install(&assets).await, 1);
    assert_eq!(interceptor.cache().keys("ospc-static-v1").len(), 1);
  }

  #[tokio::test]
  async fn activate_drops_old_versions_and_clear_drops_bundles() {
    let interceptor = interceptor(FakeFetcher::new());
    let key = request(CHUNK).key();
    interceptor.cache().put("ospc-dynamic-v0", &key, &script("old()"));
    interceptor.cache().put("ospc-dynamic-v1", &key, &script("new()"));

    assert_eq!(interceptor.activate(), vec!["ospc-dynamic-v0".to_string()]);

    let notice = interceptor.clear_bundle_cache().await;
    assert_eq!(notice, WorkerMessage::chunk_cache_cleared());
    assert!(interceptor.cache().match_entry("ospc-dynamic-v1", &key).is_none());
    assert_eq!(interceptor.cache().partition_names(), vec!["ospc-static-v1".to_string()]);
  }
}
