//! Resilient delivery of code bundles.
//!
//! - [`cache`]: partitioned response store with expiry sweeping
//! - [`worker`]: fetch interceptor running in its own background context
//! - [`recovery`]: page-side retry/backoff and cache-clearing reload

pub mod cache;
pub mod commands;
pub mod config;
pub mod logging;
pub mod recovery;
pub mod worker;
