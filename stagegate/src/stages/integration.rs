//! Module lifecycle test against an ephemeral database.

use super::{attribute, Stage, StageKind, StageResult};
use crate::cancellation::CancellationToken;
use crate::config::PipelineConfig;
use crate::context::{EnvironmentBuilder, ExecStep, ExecutionContext, Script, SourceTree, StepPolicy};
use crate::errors::Result;
use crate::runtime::{execute, ContainerRuntime};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tracing::{info, instrument};

/// Builds the server, then installs, verifies and uninstalls a module
/// against a fresh database.
///
/// The result is the raw lifecycle transcript. Lifecycle commands are
/// tolerant unless `integration.strict_lifecycle` is set; the verification
/// probes always fail the stage when the query itself fails.
#[derive(Debug, Clone)]
pub struct IntegrationTestStage {
    runtime: Arc<dyn ContainerRuntime>,
    builder: EnvironmentBuilder,
}

impl IntegrationTestStage {
    /// Creates the stage.
    #[must_use]
    pub fn new(runtime: Arc<dyn ContainerRuntime>, config: PipelineConfig) -> Self {
        Self {
            runtime,
            builder: EnvironmentBuilder::new(config),
        }
    }

    /// The execution context the stage runs.
    #[must_use]
    pub fn context(&self, source: &SourceTree) -> ExecutionContext {
        let config = self.builder.config();
        let db = &config.database;

        self.builder
            .rust_base(source)
            .with_service_binding(&db.alias, self.builder.database_service())
            .with_env("DATABASE_URL", db.url())
            .with_env("RUST_LOG", &config.integration.rust_log)
            .with_wait_for(db.readiness_probe(), db.readiness_policy())
            .with_exec(ExecStep::new([
                "cargo",
                "build",
                "--release",
                "--package",
                config.integration.server_package.as_str(),
            ]))
            .with_script(self.lifecycle_script())
    }

    /// The eight-step lifecycle procedure.
    #[must_use]
    pub fn lifecycle_script(&self) -> Script {
        let config = self.builder.config();
        let it = &config.integration;
        let url = config.database.url();
        let module = it.target_module.as_str();
        let table = it.target_table.as_str();

        let policy = if it.strict_lifecycle {
            StepPolicy::FailFast
        } else {
            StepPolicy::Tolerant
        };
        let server = |args: &[&str]| {
            let argv = std::iter::once(it.server_binary.as_str()).chain(args.iter().copied());
            ExecStep::new(argv).with_policy(policy)
        };
        let psql = |sql: String| vec!["psql".to_string(), url.clone(), "-t".to_string(), "-c".to_string(), sql];

        let records_sql = format!("SELECT COUNT(*) FROM ir_model_data WHERE module = '{module}'");
        let table_sql = format!("SELECT 1 FROM information_schema.tables WHERE table_name = '{table}'");

        Script::new("module-lifecycle")
            .echo("=== Integration Test: Module Lifecycle ===")
            .echo("[1/8] Running migrations...")
            .run(server(&["migrate"]))
            .echo("[2/8] Seeding base data...")
            .run(server(&["seed"]))
            .echo("[3/8] Installing base module...")
            .run(server(&["module", "install", it.base_module.as_str()]))
            .echo(format!("[4/8] Installing {module} module..."))
            .run(server(&["module", "install", module]))
            .echo(format!("[5/8] Verifying {module} records..."))
            .probe(format!("{module} records"), psql(records_sql.clone()))
            .echo(format!("[6/8] Verifying {table} table..."))
            .probe(format!("{table} table exists"), psql(format!("SELECT EXISTS ({table_sql})")))
            .echo(format!("[7/8] Uninstalling {module} module..."))
            .run(server(&["module", "uninstall", module]))
            .echo("[8/8] Verifying cleanup...")
            .probe("Remaining records", psql(records_sql))
            .probe("Table dropped", psql(format!("SELECT NOT EXISTS ({table_sql})")))
            .echo("")
            .echo("=== Integration Test Complete ===")
    }
}

#[async_trait]
impl Stage for IntegrationTestStage {
    fn kind(&self) -> StageKind {
        StageKind::IntegrationTest
    }

    #[instrument(skip_all, fields(stage = %StageKind::IntegrationTest))]
    async fn run(&self, source: &SourceTree, cancel: &CancellationToken) -> Result<StageResult> {
        let started_at = Utc::now();
        let ctx = self.context(source);

        let transcript = execute(self.runtime.as_ref(), &ctx, cancel)
            .await
            .map_err(|e| attribute(StageKind::IntegrationTest, e))?;

        info!("Lifecycle script finished");
        Ok(StageResult::completed(StageKind::IntegrationTest, transcript, started_at))
    }
}
