use color_eyre::{eyre::eyre, Result};
use std::future::Future;
use std::time::Duration;

use crate::cache::StoredResponse;

use super::types::ResourceRequest;

/// Network access used by the interceptor.
///
/// A returned `Err` means the request never produced a response (connection
/// refused, DNS failure, timeout). Error statuses come back as `Ok`.
pub trait Fetcher: Send + Sync + 'static {
  fn fetch(&self, request: &ResourceRequest)
    -> impl Future<Output = Result<StoredResponse>> + Send;
}

/// HTTP fetcher backed by reqwest.
#[derive(Clone)]
pub struct ReqwestFetcher {
  client: reqwest::Client,
}

impl ReqwestFetcher {
  pub fn new(timeout: Duration) -> Result<Self> {
    let client = reqwest::Client::builder()
      .timeout(timeout)
      .user_agent(concat!("chunkguard/", env!("CARGO_PKG_VERSION")))
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self { client })
  }
}

impl Fetcher for ReqwestFetcher {
  async fn fetch(&self, request: &ResourceRequest) -> Result<StoredResponse> {
    let method = reqwest::Method::from_bytes(request.method.as_bytes())
      .map_err(|e| eyre!("Invalid method {}: {}", request.method, e))?;

    let response = self
      .client
      .request(method, request.url.clone())
      .send()
      .await
      .map_err(|e| eyre!("Failed to fetch {}: {}", request.url, e))?;

    let status = response.status().as_u16();
    let headers = response
      .headers()
      .iter()
      .filter_map(|(name, value)| {
        value
          .to_str()
          .ok()
          .map(|v| (name.as_str().to_string(), v.to_string()))
      })
      .collect();

    let body = response
      .bytes()
      .await
      .map_err(|e| eyre!("Failed to read body of {}: {}", request.url, e))?;

    Ok(StoredResponse::new(status, headers, body.to_vec()))
  }
}
