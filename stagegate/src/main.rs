use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use stagegate::cancellation::CancellationToken;
use stagegate::config::PipelineConfig;
use stagegate::context::SourceTree;
use stagegate::errors::StagegateError;
use stagegate::observability::init_tracing;
use stagegate::pipeline::Pipeline;
use stagegate::runtime::{ContainerRuntime, DockerRuntime};
use stagegate::stages::{self, StageKind, StageResult};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "stagegate")]
#[command(author, version, about = "Containerised build and verification pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Workspace root to build and validate
    #[arg(long, global = true, default_value = ".")]
    source: PathBuf,

    /// JSON configuration file overriding the defaults
    #[arg(long, global = true, env = "STAGEGATE_CONFIG")]
    config: Option<PathBuf>,

    /// Prefix isolating this run's cache volumes
    #[arg(long, global = true)]
    cache_namespace: Option<String>,

    /// Cancel the run after this many seconds
    #[arg(long, global = true)]
    timeout: Option<u64>,

    /// Output format
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    log_json: bool,

    /// Container CLI to drive
    #[arg(long, global = true, default_value = "docker")]
    runtime: String,
}

#[derive(Subcommand, Clone, Copy)]
enum Command {
    /// Compile-check the whole workspace
    Check,
    /// Check formatting
    Fmt,
    /// Run clippy with warnings denied
    Lint,
    /// Run library unit tests
    Test,
    /// Run the module lifecycle test against a fresh database
    IntegrationTest,
    /// Validate the module tree
    ModuleLint,
    /// Audit dependencies for known vulnerabilities
    SecurityAudit,
    /// Build the minified Tailwind stylesheet
    TailwindBuild,
    /// Run check, lint, test and module-lint, stopping at the first failure
    All,
}

impl Command {
    fn kind(self) -> Option<StageKind> {
        match self {
            Self::Check => Some(StageKind::Check),
            Self::Fmt => Some(StageKind::Fmt),
            Self::Lint => Some(StageKind::Lint),
            Self::Test => Some(StageKind::UnitTest),
            Self::IntegrationTest => Some(StageKind::IntegrationTest),
            Self::ModuleLint => Some(StageKind::ModuleLint),
            Self::SecurityAudit => Some(StageKind::SecurityAudit),
            Self::TailwindBuild => Some(StageKind::TailwindBuild),
            Self::All => None,
        }
    }

    fn name(self) -> &'static str {
        self.kind().map_or("all", StageKind::token)
    }
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let mut config = match &cli.config {
        Some(path) => PipelineConfig::load(path)?,
        None => PipelineConfig::default(),
    };
    if let Some(ns) = &cli.cache_namespace {
        config = config.with_cache_namespace(ns);
    }
    config.validate()?;

    let root = cli
        .source
        .canonicalize()
        .with_context(|| format!("source directory {} not found", cli.source.display()))?;
    let source = SourceTree::new(root);

    let cancel = Arc::new(CancellationToken::new());
    let interrupt = Arc::clone(&cancel);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling");
            interrupt.cancel("interrupted");
        }
    });
    if let Some(secs) = cli.timeout {
        CancellationToken::cancel_after(&cancel, Duration::from_secs(secs));
    }

    let runtime: Arc<dyn ContainerRuntime> = Arc::new(DockerRuntime::new().with_binary(&cli.runtime));
    let started = Instant::now();
    info!(command = cli.command.name(), source = %source.root().display(), "Starting");

    let outcome = match cli.command.kind() {
        Some(kind) => stages::build(kind, runtime, &config)
            .run(&source, &cancel)
            .await
            .map(|result| (result.output.clone(), vec![result])),
        None => Pipeline::standard(runtime, &config)
            .run(&source, &cancel)
            .await
            .map(|result| (result.summary(), result.stages)),
    };

    let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
    report(cli.format, cli.command.name(), &outcome, duration_ms)?;

    Ok(if outcome.is_ok() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn report(
    format: OutputFormat,
    command: &str,
    outcome: &Result<(String, Vec<StageResult>), StagegateError>,
    duration_ms: u64,
) -> anyhow::Result<()> {
    match format {
        OutputFormat::Text => match outcome {
            Ok((output, _)) => print!("{output}"),
            Err(err) => eprintln!("Error: {err}"),
        },
        OutputFormat::Json => {
            let mut doc = serde_json::json!({
                "command": command,
                "success": outcome.is_ok(),
                "duration_ms": duration_ms,
            });
            match outcome {
                Ok((output, stages)) => {
                    doc["output"] = serde_json::json!(output);
                    doc["stages"] = serde_json::json!(stages.iter().map(StageResult::to_dict).collect::<Vec<_>>());
                }
                Err(err) => {
                    doc["error"] = serde_json::json!(err.to_dict());
                    doc["stages"] = serde_json::json!([]);
                }
            }
            println!("{}", serde_json::to_string_pretty(&doc)?);
        }
    }
    Ok(())
}
