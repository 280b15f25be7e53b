//! Client recovery controller.
//!
//! Two independent detectors feed the same recovery action:
//! - [`ErrorBoundary`] catches failures inside a protected region and retries
//!   with exponential backoff before showing a fallback
//! - [`GlobalErrorListener`] catches failures outside any boundary (for example
//!   during initial module evaluation) and asks the user before reloading

mod boundary;
mod detect;
mod global;
mod page;
mod policy;
#[cfg(test)]
pub(crate) mod testing;

pub use boundary::{BoundaryState, ErrorBoundary};
pub use detect::PageError;
pub use global::{GlobalErrorListener, GlobalOutcome};
pub use page::{forward_worker_notices, PageHost, RecoveryActions, DEFAULT_PARTITION_MARKERS};
pub use policy::RetryPolicy;
