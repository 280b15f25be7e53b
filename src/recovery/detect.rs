use serde::{Deserialize, Serialize};

/// Error names that always mean a bundle failed to load.
const CHUNK_ERROR_NAMES: &[&str] = &["ChunkLoadError"];

/// Message fragments emitted by bundlers and browsers for failed bundle loads.
const CHUNK_ERROR_PATTERNS: &[&str] = &[
  "loading chunk",
  "loading css chunk",
  "failed to fetch dynamically imported module",
  "importing a module script failed",
  "error loading dynamically imported module",
];

/// An error raised in a page, as reported to a boundary or the global listener.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageError {
  pub name: String,
  pub message: String,
}

impl PageError {
  pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      message: message.into(),
    }
  }

  /// Whether this error means a code bundle could not be loaded.
  pub fn is_chunk_load_failure(&self) -> bool {
    if CHUNK_ERROR_NAMES.contains(&self.name.as_str()) {
      return true;
    }
    let message = self.message.to_lowercase();
    CHUNK_ERROR_PATTERNS.iter().any(|p| message.contains(p))
  }
}

impl std::fmt::Display for PageError {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}: {}", self.name, self.message)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn recognizes_chunk_load_failures() {
    assert!(PageError::new("ChunkLoadError", "anything").is_chunk_load_failure());
    assert!(PageError::new("Error", "Loading chunk 42 failed.").is_chunk_load_failure());
    assert!(PageError::new("Error", "Loading CSS chunk 7 failed").is_chunk_load_failure());
    assert!(PageError::new(
      "TypeError",
      "Failed to fetch dynamically imported module: https://app.test/a.js"
    )
    .is_chunk_load_failure());
    assert!(PageError::new("TypeError", "Importing a module script failed.").is_chunk_load_failure());
  }

  #[test]
  fn ignores_unrelated_errors() {
    assert!(!PageError::new("TypeError", "x is undefined").is_chunk_load_failure());
    assert!(!PageError::new("ChunkError", "network").is_chunk_load_failure());
  }
}
