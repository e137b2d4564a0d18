//! Testing utilities for stagegate pipelines.
//!
//! This module provides:
//! - A scripted container runtime and shared cache store
//! - Recording stages
//! - Temporary module trees
//! - Assertions for stage results and errors

mod assertions;
mod fixtures;
mod mocks;

pub use assertions::{assert_banner, assert_failed_at_phase, assert_stage_failed, assert_transcript_order};
pub use fixtures::ModuleTreeFixture;
pub use mocks::{CacheStore, MockRuntime, RecordingStage};
