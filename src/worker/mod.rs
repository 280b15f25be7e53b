//! Bundle fetch interceptor and the background context that owns it.

mod classify;
mod client;
mod interceptor;
mod messages;
mod runtime;
#[cfg(test)]
pub(crate) mod testing;
mod types;

pub use classify::{Classifier, RequestClass, DEFAULT_BUNDLE_MARKERS, DEFAULT_SCRIPT_EXTENSIONS};
pub use client::{Fetcher, ReqwestFetcher};
pub use interceptor::{stand_in, Interceptor};
pub use messages::{ClientMessage, WorkerMessage};
pub use runtime::{WorkerHandle, WorkerOptions, WorkerPort};
pub use types::{Interception, ResourceRequest, ResponseSource};
