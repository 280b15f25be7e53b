//! Messages exchanged between pages and the worker.

use serde::{Deserialize, Serialize};

/// Page → worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientMessage {
  /// A bundle failed to load or evaluate; drop the stored bundles.
  ChunkError,
}

/// Worker → every page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkerMessage {
  ChunkCacheCleared { message: String },
}

impl WorkerMessage {
  pub fn chunk_cache_cleared() -> Self {
    Self::ChunkCacheCleared {
      message: "Chunk cache cleared, please reload the page".to_string(),
    }
  }
}
