//! Single-command stages: check, fmt, lint, unit tests, security audit and
//! the stylesheet build.

use super::{attribute, Stage, StageKind, StageResult};
use crate::cancellation::CancellationToken;
use crate::config::PipelineConfig;
use crate::context::{EnvironmentBuilder, ExecStep, ExecutionContext, SourceTree};
use crate::errors::Result;
use crate::runtime::{execute, ContainerRuntime};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tracing::{info, instrument};

/// Runs one tool over the build environment and prefixes a banner.
#[derive(Debug, Clone)]
pub struct CommandStage {
    kind: StageKind,
    commands: Vec<ExecStep>,
    runtime: Arc<dyn ContainerRuntime>,
    builder: EnvironmentBuilder,
}

impl CommandStage {
    /// Creates the stage with its standard commands.
    #[must_use]
    pub fn new(kind: StageKind, runtime: Arc<dyn ContainerRuntime>, config: PipelineConfig) -> Self {
        Self {
            kind,
            commands: Self::commands_for(kind, &config),
            runtime,
            builder: EnvironmentBuilder::new(config),
        }
    }

    /// The commands a stage runs, in order. Empty for stages that are not
    /// single commands.
    #[must_use]
    pub fn commands_for(kind: StageKind, config: &PipelineConfig) -> Vec<ExecStep> {
        match kind {
            StageKind::Check => vec![ExecStep::new(["cargo", "check", "--workspace"])],
            StageKind::Fmt => vec![ExecStep::new(["cargo", "fmt", "--all", "--", "--check"])],
            StageKind::Lint => vec![ExecStep::new([
                "cargo",
                "clippy",
                "--workspace",
                "--all-targets",
                "--",
                "-D",
                "warnings",
            ])],
            StageKind::UnitTest => vec![ExecStep::new(["cargo", "test", "--workspace", "--lib"])],
            StageKind::SecurityAudit => vec![
                ExecStep::new(["cargo", "install", "cargo-audit"]),
                ExecStep::new(["cargo", "audit"]),
            ],
            StageKind::TailwindBuild => vec![
                ExecStep::new(["npm", "ci"]),
                ExecStep::new([
                    "npx",
                    "@tailwindcss/cli",
                    "-i",
                    config.frontend.input_css.as_str(),
                    "-o",
                    config.frontend.output_css.as_str(),
                    "--minify",
                ]),
            ],
            StageKind::IntegrationTest | StageKind::ModuleLint => Vec::new(),
        }
    }

    /// The execution context the stage runs.
    #[must_use]
    pub fn context(&self, source: &SourceTree) -> ExecutionContext {
        let base = match self.kind {
            StageKind::TailwindBuild => self.builder.node_base(source),
            _ => self.builder.rust_base(source),
        };
        self.commands
            .iter()
            .fold(base, |ctx, step| ctx.with_exec(step.clone()))
    }
}

#[async_trait]
impl Stage for CommandStage {
    fn kind(&self) -> StageKind {
        self.kind
    }

    #[instrument(skip_all, fields(stage = %self.kind))]
    async fn run(&self, source: &SourceTree, cancel: &CancellationToken) -> Result<StageResult> {
        let started_at = Utc::now();
        let ctx = self.context(source);

        let stdout = execute(self.runtime.as_ref(), &ctx, cancel)
            .await
            .map_err(|e| attribute(self.kind, e))?;

        info!("Stage passed");
        let output = match self.kind.banner() {
            Some(banner) => format!("{banner}\n{stdout}"),
            None => stdout,
        };
        Ok(StageResult::completed(self.kind, output, started_at))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Step;
    use crate::errors::StagegateError;
    use crate::runtime::ExecOutput;
    use crate::testing::MockRuntime;
    use pretty_assertions::assert_eq;

    fn stage(kind: StageKind, runtime: &Arc<MockRuntime>) -> CommandStage {
        CommandStage::new(kind, runtime.clone(), PipelineConfig::default())
    }

    #[tokio::test]
    async fn test_check_success_has_banner() {
        let runtime = Arc::new(MockRuntime::new().respond("cargo check", ExecOutput::ok("Finished dev\n")));
        let result = stage(StageKind::Check, &runtime)
            .run(&SourceTree::new("/src"), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(result.output, "Compile check passed.\nFinished dev\n");
        assert_eq!(result.kind, StageKind::Check);
    }

    #[tokio::test]
    async fn test_lint_failure_names_stage_and_keeps_diagnostic() {
        let runtime = Arc::new(
            MockRuntime::new().respond("cargo clippy", ExecOutput::failed(101, "error: unused variable: `x`")),
        );
        let err = stage(StageKind::Lint, &runtime)
            .run(&SourceTree::new("/src"), &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(err.stage(), Some(StageKind::Lint));
        let text = err.to_string();
        assert!(text.contains("lint"));
        assert!(text.contains("error: unused variable: `x`"));
    }

    #[tokio::test]
    async fn test_unit_test_command() {
        let runtime = Arc::new(MockRuntime::new());
        let result = stage(StageKind::UnitTest, &runtime)
            .run(&SourceTree::new("/src"), &CancellationToken::new())
            .await
            .unwrap();

        assert!(result.output.starts_with("All unit tests passed.\n"));
        assert_eq!(runtime.commands().last().unwrap(), "cargo test --workspace --lib");
    }

    #[tokio::test]
    async fn test_security_audit_installs_then_audits() {
        let runtime = Arc::new(MockRuntime::new().respond("cargo audit", ExecOutput::ok("0 vulnerabilities\n")));
        let result = stage(StageKind::SecurityAudit, &runtime)
            .run(&SourceTree::new("/src"), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(result.output, "Security audit passed.\n0 vulnerabilities\n");
        let commands = runtime.commands();
        assert_eq!(&commands[commands.len() - 2..], ["cargo install cargo-audit", "cargo audit"]);
    }

    #[tokio::test]
    async fn test_cancellation_is_not_attributed() {
        let runtime = Arc::new(MockRuntime::new());
        let cancel = CancellationToken::new();
        cancel.cancel("deadline");

        let err = stage(StageKind::Check, &runtime)
            .run(&SourceTree::new("/src"), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, StagegateError::Cancelled(_)));
    }

    #[tokio::test]
    async fn test_tailwind_build_runs_in_node_environment() {
        let runtime = Arc::new(
            MockRuntime::new().respond("npx @tailwindcss/cli", ExecOutput::ok("Done in 212ms\n")),
        );
        let result = stage(StageKind::TailwindBuild, &runtime)
            .run(&SourceTree::new("/src"), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(result.output, "CSS build complete.\nDone in 212ms\n");
        assert_eq!(
            runtime.commands(),
            vec![
                "npm ci",
                "npx @tailwindcss/cli -i css/input.css -o css/main.css --minify"
            ]
        );
        let ctx = &runtime.started_contexts()[0];
        assert_eq!(ctx.base_image(), "node:22-slim");
        assert_eq!(ctx.cache_mounts()[0].name, "npm-cache");
    }

    #[tokio::test]
    async fn test_tailwind_build_failure_names_stage() {
        let runtime = Arc::new(MockRuntime::new().respond("npm ci", ExecOutput::failed(1, "npm ERR! missing lockfile")));
        let err = stage(StageKind::TailwindBuild, &runtime)
            .run(&SourceTree::new("/src"), &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(err.stage(), Some(StageKind::TailwindBuild));
        assert!(err.to_string().contains("missing lockfile"));
        assert_eq!(runtime.count_of("npx"), 0);
    }

    #[test]
    fn test_context_appends_single_exec() {
        let runtime = Arc::new(MockRuntime::new());
        let ctx = stage(StageKind::Fmt, &runtime).context(&SourceTree::new("/src"));

        assert_eq!(ctx.steps().len(), 1);
        let Step::Exec(step) = &ctx.steps()[0] else {
            panic!("expected exec step");
        };
        assert_eq!(step.display(), "cargo fmt --all -- --check");
    }
}
