//! Page-wide detector for bundle failures raised outside any boundary.

use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info};

use crate::cache::CacheStorage;

use super::detect::PageError;
use super::page::RecoveryActions;

const CONFIRM_PROMPT: &str =
  "Part of this page failed to load. Clear cached files and reload the page?";

/// What the listener did with an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GlobalOutcome {
  /// Not a bundle failure
  Ignored,
  /// The user declined the reload
  Declined,
  /// Caches cleared and page reloaded
  Recovered,
}

/// Watches every uncaught page error, independently of error boundaries.
pub struct GlobalErrorListener<S: CacheStorage> {
  actions: Arc<RecoveryActions<S>>,
}

impl<S: CacheStorage> GlobalErrorListener<S> {
  pub fn new(actions: Arc<RecoveryActions<S>>) -> Self {
    Self { actions }
  }

  pub fn handle(&self, error: &PageError) -> GlobalOutcome {
    if !error.is_chunk_load_failure() {
      return GlobalOutcome::Ignored;
    }

    if self.actions.host().confirm(CONFIRM_PROMPT) {
      info!(%error, "user accepted reload after bundle failure");
      self.actions.clear_and_reload();
      GlobalOutcome::Recovered
    } else {
      error!(%error, "bundle failed to load and reload was declined");
      GlobalOutcome::Declined
    }
  }

  /// Consume uncaught errors until the page goes away.
  pub async fn run(self, mut errors: mpsc::UnboundedReceiver<PageError>) {
    while let Some(error) = errors.recv().await {
      self.handle(&error);
    }
  }
}
