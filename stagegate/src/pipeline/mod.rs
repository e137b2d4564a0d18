//! Pipeline composition and bounded polling.
//!
//! This module provides:
//! - The fail-fast stage orchestrator
//! - Retry and backoff policies
//! - The readiness poller built on them

mod orchestrator;
mod retry;

pub use orchestrator::{Pipeline, PipelineResult, STANDARD_STAGES, SUMMARY_BANNER, SUMMARY_SEPARATOR};
pub use retry::{poll_until, BackoffStrategy, JitterStrategy, PollOutcome, RetryConfig, RetryState};
