//! # Stagegate
//!
//! A containerised build and verification pipeline for a modular Rust ERP
//! workspace.
//!
//! Stagegate provides:
//!
//! - **Reproducible environments**: one immutable build context shared by every stage
//! - **Persistent caches**: named volumes for the registry, git checkouts and build output
//! - **Ephemeral services**: a throwaway database bound under a network alias
//! - **Stage executors**: compile check, lint, unit tests and a module lifecycle test
//! - **Module validation**: five static passes over the module tree
//! - **Fail-fast composition**: the full run stops at the first failing stage
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use stagegate::prelude::*;
//!
//! let runtime = Arc::new(DockerRuntime::new());
//! let pipeline = Pipeline::standard(runtime, &PipelineConfig::default());
//!
//! let result = pipeline.run(&SourceTree::new("."), &CancellationToken::new()).await?;
//! println!("{}", result.summary());
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod cancellation;
pub mod config;
pub mod context;
pub mod errors;
pub mod observability;
pub mod pipeline;
pub mod runtime;
pub mod stages;
pub mod testing;
pub mod validation;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cancellation::{CancellationToken, CleanupRegistry};
    pub use crate::config::PipelineConfig;
    pub use crate::context::{
        EnvironmentBuilder, ExecStep, ExecutionContext, Script, ServiceSpec, SourceTree, Step,
        StepPolicy,
    };
    pub use crate::errors::{StageError, StagegateError};
    pub use crate::pipeline::{poll_until, Pipeline, PipelineResult, PollOutcome, RetryConfig};
    pub use crate::runtime::{execute, ContainerRuntime, DockerRuntime, ExecOutput, Session};
    pub use crate::stages::{Stage, StageKind, StageResult};
    pub use crate::validation::{ModuleValidator, ValidationReport};
    pub use std::sync::Arc;
}
