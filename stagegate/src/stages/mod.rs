//! Stage trait and implementations.
//!
//! Stages are the units of pipeline work. Each one builds its execution
//! context from the shared environment, runs it, and either returns its
//! output or fails with a [`StageError`](crate::errors::StageError) naming
//! the stage.

mod command;
mod integration;
mod kind;
mod module_lint;
mod result;

pub use command::CommandStage;
pub use integration::IntegrationTestStage;
pub use kind::StageKind;
pub use module_lint::ModuleLintStage;
pub use result::StageResult;

use crate::cancellation::CancellationToken;
use crate::config::PipelineConfig;
use crate::context::SourceTree;
use crate::errors::{Result, StageError, StagegateError};
use crate::runtime::ContainerRuntime;
use async_trait::async_trait;
use std::fmt::Debug;
use std::sync::Arc;

/// Trait for pipeline stages.
#[async_trait]
pub trait Stage: Send + Sync + Debug {
    /// Which stage this is.
    fn kind(&self) -> StageKind;

    /// Runs the stage against a source tree.
    ///
    /// # Errors
    ///
    /// Returns [`StagegateError::Stage`] when the stage's work fails and
    /// [`StagegateError::Cancelled`] when `cancel` fires first.
    async fn run(&self, source: &SourceTree, cancel: &CancellationToken) -> Result<StageResult>;
}

/// Builds the stage for `kind`.
#[must_use]
pub fn build(kind: StageKind, runtime: Arc<dyn ContainerRuntime>, config: &PipelineConfig) -> Arc<dyn Stage> {
    match kind {
        StageKind::IntegrationTest => Arc::new(IntegrationTestStage::new(runtime, config.clone())),
        StageKind::ModuleLint => Arc::new(ModuleLintStage::new(config.clone())),
        StageKind::Check
        | StageKind::Fmt
        | StageKind::Lint
        | StageKind::UnitTest
        | StageKind::SecurityAudit
        | StageKind::TailwindBuild => Arc::new(CommandStage::new(kind, runtime, config.clone())),
    }
}

/// Maps a failure to a stage error, leaving cancellation untouched.
pub(crate) fn attribute(kind: StageKind, err: StagegateError) -> StagegateError {
    match err {
        StagegateError::Cancelled(_) | StagegateError::Stage(_) => err,
        other => StageError::new(kind, other.to_string()).into(),
    }
}
