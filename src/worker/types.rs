use color_eyre::{eyre::eyre, Result};
use tokio::task::JoinHandle;
use url::Url;

use crate::cache::{RequestKey, StoredResponse};

/// An outbound resource request seen by the interceptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceRequest {
  pub method: String,
  pub url: Url,
}

impl ResourceRequest {
  pub fn new(method: &str, url: Url) -> Self {
    Self {
      method: method.trim().to_uppercase(),
      url,
    }
  }

  pub fn get(url: Url) -> Self {
    Self::new("GET", url)
  }

  /// Parse an absolute URL, or a path relative to `origin`.
  pub fn parse(method: &str, target: &str, origin: Option<&Url>) -> Result<Self> {
    let url = match Url::parse(target) {
      Ok(url) => url,
      Err(url::ParseError::RelativeUrlWithoutBase) => {
        let base = origin.ok_or_else(|| eyre!("'{}' is relative and no origin is configured", target))?;
        base
          .join(target)
          .map_err(|e| eyre!("Invalid request path '{}': {}", target, e))?
      }
      Err(e) => return Err(eyre!("Invalid request URL '{}': {}", target, e)),
    };
    Ok(Self::new(method, url))
  }

  pub fn key(&self) -> RequestKey {
    RequestKey::new(&self.method, &self.url)
  }
}

/// Where an intercepted response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
  /// Fresh from the network
  Network,
  /// Network failed, served a stored copy
  Cache,
  /// Network and cache both failed, served a synthesized script
  StandIn,
  /// Not intercepted; straight from the network
  Passthrough,
}

impl std::fmt::Display for ResponseSource {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let name = match self {
      Self::Network => "network",
      Self::Cache => "cache",
      Self::StandIn => "stand-in",
      Self::Passthrough => "passthrough",
    };
    f.write_str(name)
  }
}

/// Result of handling one request.
#[derive(Debug)]
pub struct Interception {
  pub response: StoredResponse,
  pub source: ResponseSource,
  /// Background write of the network response into the cache, if one was started.
  /// Dropping the handle does not cancel the write.
  pub pending_store: Option<JoinHandle<()>>,
}

impl Interception {
  pub fn new(response: StoredResponse, source: ResponseSource) -> Self {
    Self {
      response,
      source,
      pending_store: None,
    }
  }

  /// Wait for the background cache write to finish.
  pub async fn settle(&mut self) {
    if let Some(store) = self.pending_store.take() {
      if let Err(e) = store.await {
        tracing::warn!(error = %e, "background cache write did not complete");
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn relative_targets_resolve_against_origin() {
    let origin = Url::parse("https://app.test").unwrap();
    let request = ResourceRequest::parse("get", "/_next/static/chunks/42.js", Some(&origin)).unwrap();
    assert_eq!(request.method, "GET");
    assert_eq!(request.url.as_str(), "https://app.test/_next/static/chunks/42.js");
  }

  #[test]
  fn relative_target_without_origin_is_rejected() {
    assert!(ResourceRequest::parse("GET", "/a.js", None).is_err());
  }

  #[test]
  fn absolute_targets_ignore_origin() {
    let origin = Url::parse("https://app.test").unwrap();
    let request = ResourceRequest::parse("GET", "https://cdn.test/x.js", Some(&origin)).unwrap();
    assert_eq!(request.url.host_str(), Some("cdn.test"));
  }
}
