//! Command-line operations over the cache and interceptor.

use clap::Subcommand;
use color_eyre::{eyre::eyre, Result};
use std::sync::Arc;
use std::time::Duration;

use crate::cache::{max_age_from_secs, CacheManager, CacheStorage, NoopStorage, SqliteStorage};
use crate::config::Config;
use crate::worker::{
  Classifier, ClientMessage, Interceptor, ReqwestFetcher, ResourceRequest, WorkerHandle,
  WorkerMessage, WorkerOptions,
};

#[derive(Subcommand, Debug)]
pub enum Command {
  /// Run one request through the interceptor and report where the response came from
  Fetch {
    /// Absolute URL, or a path relative to the origin
    target: String,
    #[arg(short, long, default_value = "GET")]
    method: String,
    /// Print the response body to stdout
    #[arg(long)]
    body: bool,
  },
  /// Store the configured shell assets in the static partition
  Install,
  /// Delete partitions that don't belong to the configured version
  Activate,
  /// Remove expired entries
  Sweep {
    /// Partition to sweep (defaults to the dynamic partition)
    #[arg(short, long)]
    partition: Option<String>,
    /// Override the retention window
    #[arg(long)]
    max_age_secs: Option<u64>,
  },
  /// Ask the worker to drop all stored bundles
  Clear,
  /// List stored entries
  Entries {
    #[arg(short, long)]
    partition: Option<String>,
  },
}

/// Run a command against the storage selected by the configuration.
pub async fn run(command: Command, config: &Config) -> Result<()> {
  if !config.cache.enabled {
    return run_with(command, config, NoopStorage).await;
  }

  let storage = match &config.cache.path {
    Some(path) => SqliteStorage::open_at(path)?,
    None => SqliteStorage::open()?,
  };
  run_with(command, config, storage).await
}

async fn run_with<S: CacheStorage + 'static>(command: Command, config: &Config, storage: S) -> Result<()> {
  let cache = CacheManager::new(storage);
  let partitions = config.cache.partitions();

  match command {
    Command::Fetch {
      target,
      method,
      body,
    } => {
      let interceptor = build_interceptor(config, cache)?;
      let request = ResourceRequest::parse(&method, &target, config.origin.as_ref())?;
      let mut result = interceptor.handle(&request).await?;
      result.settle().await;

      println!(
        "{} {} ({} bytes) via {}",
        result.response.status,
        request.url,
        result.response.body.len(),
        result.source
      );
      if body {
        println!("{}", String::from_utf8_lossy(&result.response.body));
      }
    }
    Command::Install => {
      let assets = config.precache_urls()?;
      let interceptor = build_interceptor(config, cache)?;
      let stored = interceptor.install(&assets).await;
      println!("stored {} of {} shell assets", stored, assets.len());
    }
    Command::Activate => {
      let deleted = cache.retain_partitions(&partitions);
      if deleted.is_empty() {
        println!("no stale partitions");
      }
      for name in deleted {
        println!("deleted {}", name);
      }
    }
    Command::Sweep {
      partition,
      max_age_secs,
    } => {
      let partition = partition.unwrap_or(partitions.dynamic_name);
      let max_age = match max_age_secs {
        Some(secs) => max_age_from_secs(secs),
        None => config.cache.retention(),
      };
      let removed = cache.sweep_expired(&partition, max_age);
      println!("removed {} expired entries from {}", removed, partition);
    }
    Command::Clear => {
      let interceptor = Arc::new(build_interceptor(config, cache)?);
      let worker = WorkerHandle::spawn(interceptor, worker_options(config));
      let mut notices = worker.subscribe();

      if !worker.port().post(ClientMessage::ChunkError) {
        return Err(eyre!("Worker stopped before the request was delivered"));
      }
      let notice = notices
        .recv()
        .await
        .map_err(|e| eyre!("Worker did not confirm the clear: {}", e))?;
      worker.shutdown().await;

      match notice {
        WorkerMessage::ChunkCacheCleared { message } => println!("{}", message),
      }
    }
    Command::Entries { partition } => {
      let names = match partition {
        Some(name) => vec![name],
        None => cache.partition_names(),
      };
      let mut listed = 0;
      for name in &names {
        for entry in cache.keys(name) {
          println!("{}\t{}\t{}", name, entry.cached_at.to_rfc3339(), entry.key.description());
          listed += 1;
        }
      }
      if listed == 0 {
        println!("no cached entries");
      }
    }
  }

  Ok(())
}

fn build_interceptor<S: CacheStorage + 'static>(
  config: &Config,
  cache: CacheManager<S>,
) -> Result<Interceptor<ReqwestFetcher, S>> {
  let origin = config.require_origin()?;
  let fetcher = ReqwestFetcher::new(Duration::from_secs(config.network.timeout_secs))?;
  let classifier = Classifier::new(origin, &config.bundles.markers, &config.bundles.extensions);

  Ok(Interceptor::new(fetcher, cache, config.cache.partitions(), classifier))
}

fn worker_options(config: &Config) -> WorkerOptions {
  WorkerOptions {
    sweep_interval: Duration::from_secs(config.cache.sweep_interval_secs.max(1)),
    retention: config.cache.retention(),
  }
}
