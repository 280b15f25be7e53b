//! Background execution context that owns the interceptor.
//!
//! Pages never touch the interceptor directly. They post [`ClientMessage`]s
//! through a [`WorkerPort`] and subscribe to [`WorkerMessage`] broadcasts.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::cache::{default_max_age, CacheStorage};

use super::client::Fetcher;
use super::interceptor::Interceptor;
use super::messages::{ClientMessage, WorkerMessage};

/// Settings for the worker loop.
#[derive(Debug, Clone)]
pub struct WorkerOptions {
  /// How often expired bundles are swept
  pub sweep_interval: Duration,
  /// Age after which a stored bundle is swept
  pub retention: chrono::Duration,
}

impl Default for WorkerOptions {
  fn default() -> Self {
    Self {
      sweep_interval: Duration::from_secs(300), // 5 minutes
      retention: default_max_age(),
    }
  }
}

/// Sending side for pages.
#[derive(Debug, Clone)]
pub struct WorkerPort {
  tx: mpsc::UnboundedSender<ClientMessage>,
}

impl WorkerPort {
  /// Post a message; returns false once the worker has stopped.
  pub fn post(&self, message: ClientMessage) -> bool {
    self.tx.send(message).is_ok()
  }
}

/// Handle for controlling a running worker.
pub struct WorkerHandle {
  port: WorkerPort,
  broadcast: broadcast::Sender<WorkerMessage>,
  shutdown_tx: oneshot::Sender<()>,
  task: JoinHandle<()>,
}

impl WorkerHandle {
  /// Spawn the worker loop for `interceptor`.
  pub fn spawn<F, S>(interceptor: Arc<Interceptor<F, S>>, options: WorkerOptions) -> Self
  where
    F: Fetcher,
    S: CacheStorage + 'static,
  {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let (broadcast_tx, _) = broadcast::channel(16);
    let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();

    let pages = broadcast_tx.clone();
    let task = tokio::spawn(async move {
      let mut sweep = tokio::time::interval(options.sweep_interval);
      // Skip the first tick (immediate)
      sweep.tick().await;

      loop {
        tokio::select! {
          message = rx.recv() => {
            match message {
              Some(ClientMessage::ChunkError) => {
                let notice = interceptor.clear_bundle_cache().await;
                if pages.send(notice).is_err() {
                  debug!("no pages subscribed to cache notices");
                }
              }
              None => break,
            }
          }
          _ = sweep.tick() => {
            interceptor.sweep(options.retention).await;
          }
          _ = &mut shutdown_rx => {
            break;
          }
        }
      }

      info!("worker stopped");
    });

    Self {
      port: WorkerPort { tx },
      broadcast: broadcast_tx,
      shutdown_tx,
      task,
    }
  }

  pub fn port(&self) -> WorkerPort {
    self.port.clone()
  }

  /// Subscribe a page to worker broadcasts.
  pub fn subscribe(&self) -> broadcast::Receiver<WorkerMessage> {
    self.broadcast.subscribe()
  }

  /// Stop the worker and wait for the loop to exit.
  pub async fn shutdown(self) {
    let _ = self.shutdown_tx.send(());
    let _ = self.task.await;
  }
}
