//! Error boundary with exponential-backoff retries for bundle failures.

use color_eyre::{eyre::eyre, Result};
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::cache::CacheStorage;

use super::detect::PageError;
use super::page::RecoveryActions;
use super::policy::RetryPolicy;

/// Where a boundary is in its recovery cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoundaryState {
  /// Rendering normally
  Healthy,
  /// Waiting for retry timer number `n` (zero-based)
  Retrying(u32),
  /// No more automatic retries; the fallback must be shown
  Exhausted,
  /// Fallback is on screen with manual reload / home actions
  FallbackShown,
}

impl BoundaryState {
  fn offers_manual_recovery(self) -> bool {
    matches!(self, Self::Exhausted | Self::FallbackShown)
  }
}

/// A protected region of a page.
///
/// Retry timers are tasks in a set owned by the boundary, so unmounting (or
/// dropping) the boundary cancels them and no state change can happen
/// afterwards. Must be used from within a tokio runtime.
pub struct ErrorBoundary<S: CacheStorage> {
  state: BoundaryState,
  attempts: u32,
  policy: RetryPolicy,
  timers: JoinSet<u32>,
  actions: Arc<RecoveryActions<S>>,
}

impl<S: CacheStorage> ErrorBoundary<S> {
  pub fn new(policy: RetryPolicy, actions: Arc<RecoveryActions<S>>) -> Self {
    Self {
      state: BoundaryState::Healthy,
      attempts: 0,
      policy,
      timers: JoinSet::new(),
      actions,
    }
  }

  pub fn state(&self) -> BoundaryState {
    self.state
  }

  /// Retries that have already fired.
  pub fn attempts(&self) -> u32 {
    self.attempts
  }

  pub fn pending_timers(&self) -> usize {
    self.timers.len()
  }

  /// Handle a failure raised while rendering the protected region.
  pub fn catch(&mut self, error: &PageError) -> BoundaryState {
    if self.state != BoundaryState::Healthy {
      debug!(state = ?self.state, %error, "boundary not rendering, failure ignored");
      return self.state;
    }

    if !error.is_chunk_load_failure() {
      warn!(%error, "unrecoverable render failure");
      self.state = BoundaryState::Exhausted;
      return self.state;
    }

    if self.attempts >= self.policy.max_retries {
      warn!(attempts = self.attempts, %error, "bundle retries exhausted");
      self.state = BoundaryState::Exhausted;
      return self.state;
    }

    let attempt = self.attempts;
    let delay = self.policy.delay(attempt);
    info!(attempt, delay_ms = delay.as_millis() as u64, "scheduling bundle retry");

    self.timers.spawn(async move {
      tokio::time::sleep(delay).await;
      attempt
    });
    self.state = BoundaryState::Retrying(attempt);
    self.state
  }

  /// Wait for the pending retry timer and re-arm the boundary.
  ///
  /// Returns the new attempt count, or `None` when no retry is pending.
  pub async fn next_retry(&mut self) -> Option<u32> {
    match self.timers.join_next().await? {
      Ok(attempt) => {
        self.attempts = attempt + 1;
        self.state = BoundaryState::Healthy;
        debug!(attempts = self.attempts, "retrying render");
        Some(self.attempts)
      }
      Err(e) => {
        warn!(error = %e, "retry timer did not complete");
        None
      }
    }
  }

  /// Record that the fallback is on screen.
  pub fn show_fallback(&mut self) -> BoundaryState {
    if self.state == BoundaryState::Exhausted {
      self.state = BoundaryState::FallbackShown;
    }
    self.state
  }

  /// Manual "Reload": clear bundle caches and reload the page.
  pub fn reload(&self) -> Result<()> {
    if !self.state.offers_manual_recovery() {
      return Err(eyre!("Reload is only offered once retries are exhausted (state {:?})", self.state));
    }
    self.actions.clear_and_reload();
    Ok(())
  }

  /// Manual "Go home".
  pub fn go_home(&self) -> Result<()> {
    if !self.state.offers_manual_recovery() {
      return Err(eyre!("Go home is only offered once retries are exhausted (state {:?})", self.state));
    }
    self.actions.host().navigate_home();
    Ok(())
  }

  /// Tear down the boundary, cancelling pending timers. Returns how many were cancelled.
  pub fn unmount(mut self) -> usize {
    let pending = self.timers.len();
    self.timers.abort_all();
    debug!(pending, "boundary unmounted");
    pending
  }
}
