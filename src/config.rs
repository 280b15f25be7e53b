use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use url::Url;

use crate::cache::{max_age_from_secs, PartitionSet, DEFAULT_MAX_AGE_MS};
use crate::recovery::{RetryPolicy, DEFAULT_PARTITION_MARKERS};
use crate::worker::{DEFAULT_BUNDLE_MARKERS, DEFAULT_SCRIPT_EXTENSIONS};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
  /// Origin the bundles are served from (e.g. "https://ospc.example.org")
  pub origin: Option<Url>,
  #[serde(default)]
  pub cache: CacheConfig,
  #[serde(default)]
  pub bundles: BundlesConfig,
  /// Shell assets stored in the static partition on install (paths or URLs)
  #[serde(default)]
  pub precache: Vec<String>,
  #[serde(default)]
  pub retry: RetryPolicy,
  #[serde(default)]
  pub network: NetworkConfig,
  /// Write logs to this file instead of stderr
  pub log_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
  /// SQLite database path (defaults to the platform data directory)
  pub path: Option<PathBuf>,
  /// Set to false to disable caching entirely
  pub enabled: bool,
  pub prefix: String,
  pub version: String,
  /// Entries older than this are swept
  pub retention_secs: u64,
  pub sweep_interval_secs: u64,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      path: None,
      enabled: true,
      prefix: "ospc".to_string(),
      version: "v1".to_string(),
      retention_secs: (DEFAULT_MAX_AGE_MS / 1000) as u64,
      sweep_interval_secs: 300,
    }
  }
}

impl CacheConfig {
  pub fn partitions(&self) -> PartitionSet {
    PartitionSet::new(&self.prefix, &self.version)
  }

  pub fn retention(&self) -> chrono::Duration {
    max_age_from_secs(self.retention_secs)
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BundlesConfig {
  /// Path fragments that mark a bundle directory
  pub markers: Vec<String>,
  /// File extensions treated as scripts
  pub extensions: Vec<String>,
  /// Partition name fragments cleared by the recovery action
  pub partition_markers: Vec<String>,
}

impl Default for BundlesConfig {
  fn default() -> Self {
    let owned = |items: &[&str]| -> Vec<String> { items.iter().map(|s| s.to_string()).collect() };
    Self {
      markers: owned(DEFAULT_BUNDLE_MARKERS),
      extensions: owned(DEFAULT_SCRIPT_EXTENSIONS),
      partition_markers: owned(DEFAULT_PARTITION_MARKERS),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
  pub timeout_secs: u64,
}

impl Default for NetworkConfig {
  fn default() -> Self {
    Self { timeout_secs: 30 }
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./chunkguard.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/chunkguard/config.yaml
  ///
  /// Built-in defaults are used when no file is found.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Ok(Self::default()),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("chunkguard.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("chunkguard").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    let config: Config = serde_yaml::from_str(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))?;

    Ok(config)
  }

  /// The serving origin, required by anything that intercepts requests.
  pub fn require_origin(&self) -> Result<&Url> {
    self.origin.as_ref().ok_or_else(|| {
      eyre!("No origin configured. Set `origin` in chunkguard.yaml or pass --origin.")
    })
  }

  /// Precache entries resolved against the origin.
  pub fn precache_urls(&self) -> Result<Vec<Url>> {
    let origin = self.require_origin()?;
    self
      .precache
      .iter()
      .map(|target| {
        origin
          .join(target)
          .map_err(|e| eyre!("Invalid precache entry '{}': {}", target, e))
      })
      .collect()
  }
}
