//! Test doubles for the network side.

use color_eyre::{eyre::eyre, Result};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::cache::StoredResponse;

use super::client::Fetcher;
use super::types::ResourceRequest;

/// Fetcher that serves canned responses and fails for everything else.
#[derive(Default)]
pub struct FakeFetcher {
  responses: Mutex<HashMap<String, StoredResponse>>,
  calls: AtomicUsize,
}

impl FakeFetcher {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn respond(&self, url: &str, response: StoredResponse) {
    self
      .responses
      .lock()
      .unwrap()
      .insert(url.to_string(), response);
  }

  pub fn calls(&self) -> usize {
    self.calls.load(Ordering::SeqCst)
  }
}

impl Fetcher for FakeFetcher {
  async fn fetch(&self, request: &ResourceRequest) -> Result<StoredResponse> {
    self.calls.fetch_add(1, Ordering::SeqCst);
    let hit = self
      .responses
      .lock()
      .unwrap()
      .get(request.url.as_str())
      .cloned();
    hit.ok_or_else(|| eyre!("connection refused: {}", request.url))
  }
}

pub fn script(body: &str) -> StoredResponse {
  StoredResponse::new(
    200,
    vec![("content-type".to_string(), "application/javascript".to_string())],
    body.as_bytes().to_vec(),
  )
}
