//! Execution context management.
//!
//! This module provides:
//! - Source trees with exclusion lists
//! - Typed steps with explicit failure policies
//! - Immutable execution contexts
//! - The environment builder and service provisioner

mod builder;
mod execution;
mod source;
mod step;

pub use builder::EnvironmentBuilder;
pub use execution::{CacheMount, ExecutionContext, ServiceBinding, ServiceSpec, SourceMount};
pub use source::SourceTree;
pub use step::{ExecStep, Script, ScriptLine, Step, StepPolicy, WaitStep};
