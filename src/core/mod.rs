//! Core services shared by plugins and pipelines.
//!
//! This module contains configuration loading, retry with backoff for
//! outgoing deliveries, and cooperative cancellation.

mod cancel;
mod config;
mod retry;

pub use cancel::CancelFlag;
pub use config::{GeneralConfig, PortalConfig, SchedulerConfig, LOCAL_CONFIG_FILE};
pub use retry::{retry, retry_if, RetryConfig, RetryResult};
