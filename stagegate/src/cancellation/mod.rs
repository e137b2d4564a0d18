//! Structured cancellation and cleanup utilities.
//!
//! This module provides:
//! - CancellationToken for cooperative, awaitable cancellation
//! - CleanupRegistry for LIFO teardown of runtime resources

mod cleanup;
mod token;

pub use cleanup::{CleanupAction, CleanupRegistry};
pub use token::CancellationToken;
