//! Module tree validation stage.

use super::{Stage, StageKind, StageResult};
use crate::cancellation::CancellationToken;
use crate::config::PipelineConfig;
use crate::context::SourceTree;
use crate::errors::{Result, StageError, StagegateError};
use crate::validation::ModuleValidator;
use async_trait::async_trait;
use chrono::Utc;
use tracing::{instrument, warn};

/// Validates the module tree on the host.
///
/// The tree is read with the build environment's exclusions applied, so
/// the validator sees exactly what a container build would.
#[derive(Debug, Clone)]
pub struct ModuleLintStage {
    validator: ModuleValidator,
    exclude: Vec<String>,
}

impl ModuleLintStage {
    /// Creates the stage.
    #[must_use]
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            validator: ModuleValidator::new(config.validation),
            exclude: config.environment.exclude,
        }
    }
}

#[async_trait]
impl Stage for ModuleLintStage {
    fn kind(&self) -> StageKind {
        StageKind::ModuleLint
    }

    #[instrument(skip_all, fields(stage = %StageKind::ModuleLint))]
    async fn run(&self, source: &SourceTree, cancel: &CancellationToken) -> Result<StageResult> {
        if cancel.is_cancelled() {
            return Err(StagegateError::Cancelled(
                cancel.reason().unwrap_or_else(|| "cancelled".to_string()),
            ));
        }

        let started_at = Utc::now();
        let tree = source.with_exclude(self.exclude.iter().cloned());
        let validator = self.validator.clone();

        let report = tokio::task::spawn_blocking(move || validator.validate(&tree))
            .await
            .map_err(|e| StagegateError::Runtime(format!("validation task failed: {e}")))?
            .map_err(|e| StageError::new(StageKind::ModuleLint, e.to_string()))?;

        if report.success() {
            Ok(StageResult::completed(StageKind::ModuleLint, report.transcript(), started_at))
        } else {
            warn!(errors = report.errors(), warnings = report.warnings(), "Module validation failed");
            Err(StageError::new(StageKind::ModuleLint, report.transcript()).into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ModuleTreeFixture;

    #[tokio::test]
    async fn test_clean_tree_passes_with_transcript() {
        let fixture = ModuleTreeFixture::new().with_module("todo_list");
        let result = ModuleLintStage::new(PipelineConfig::default())
            .run(&fixture.tree(), &CancellationToken::new())
            .await
            .unwrap();

        assert!(result.output.starts_with("=== Module Lint ===\n[1/5]"));
        assert!(result.output.ends_with("Errors: 0, Warnings: 0\n"));
    }

    #[tokio::test]
    async fn test_errors_fail_with_full_transcript() {
        let fixture = ModuleTreeFixture::new().with_module("crm");
        fixture.write("modules/crm/views/form.xml", "<form><field></form>");

        let err = ModuleLintStage::new(PipelineConfig::default())
            .run(&fixture.tree(), &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(err.stage(), Some(StageKind::ModuleLint));
        let text = err.to_string();
        assert!(text.contains("ERROR: modules/crm/views/form.xml is not well-formed XML"));
        assert!(text.contains("Errors: 1, Warnings: 0"));
    }

    #[tokio::test]
    async fn test_warnings_alone_pass() {
        let fixture = ModuleTreeFixture::new().with_module("crm");
        fixture.write("modules/crm/src/lib.rs", "pub fn f() { todo!() }\n");

        let result = ModuleLintStage::new(PipelineConfig::default())
            .run(&fixture.tree(), &CancellationToken::new())
            .await
            .unwrap();
        assert!(result.output.contains("Errors: 0, Warnings: 1"));
    }

    #[tokio::test]
    async fn test_build_exclusions_apply() {
        let fixture = ModuleTreeFixture::new().with_module("crm");
        fixture.write("modules/legacy/manifest.toml", "broken\n");

        let mut config = PipelineConfig::default();
        config.environment.exclude.push("modules/legacy/".to_string());

        let result = ModuleLintStage::new(config)
            .run(&fixture.tree(), &CancellationToken::new())
            .await
            .unwrap();
        assert!(result.output.contains("Errors: 0"));
    }
}
