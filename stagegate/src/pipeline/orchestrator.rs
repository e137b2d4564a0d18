//! Sequential fail-fast composition of stages.

use crate::cancellation::CancellationToken;
use crate::config::PipelineConfig;
use crate::context::SourceTree;
use crate::errors::{Result, StagegateError};
use crate::observability::{SpanTimer, StageSpanAttributes};
use crate::runtime::ContainerRuntime;
use crate::stages::{self, Stage, StageKind, StageResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// Stages of the standard full run, in order.
///
/// The integration test and the stylesheet build are run on their own and
/// never composed here.
pub const STANDARD_STAGES: [StageKind; 4] = [
    StageKind::Check,
    StageKind::Lint,
    StageKind::UnitTest,
    StageKind::ModuleLint,
];

/// Banner opening the summary of a full run.
pub const SUMMARY_BANNER: &str = "\n=== Full CI Pipeline Complete ===\n";

/// Separator between stage outputs in the summary.
pub const SUMMARY_SEPARATOR: &str = "\n---\n";

/// An ordered list of stages run one after another.
#[derive(Debug, Clone, Default)]
pub struct Pipeline {
    stages: Vec<Arc<dyn Stage>>,
}

impl Pipeline {
    /// Creates an empty pipeline.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The standard full run: check, lint, unit tests, module lint.
    #[must_use]
    pub fn standard(runtime: Arc<dyn ContainerRuntime>, config: &PipelineConfig) -> Self {
        Self::of(&STANDARD_STAGES, runtime, config)
    }

    /// A pipeline of the given stage kinds.
    #[must_use]
    pub fn of(kinds: &[StageKind], runtime: Arc<dyn ContainerRuntime>, config: &PipelineConfig) -> Self {
        kinds.iter().fold(Self::new(), |pipeline, kind| {
            pipeline.with_stage(stages::build(*kind, Arc::clone(&runtime), config))
        })
    }

    /// Appends a stage.
    #[must_use]
    pub fn with_stage(mut self, stage: Arc<dyn Stage>) -> Self {
        self.stages.push(stage);
        self
    }

    /// Stage kinds in run order.
    #[must_use]
    pub fn kinds(&self) -> Vec<StageKind> {
        self.stages.iter().map(|s| s.kind()).collect()
    }

    /// Runs every stage in order, stopping at the first failure.
    ///
    /// # Errors
    ///
    /// Returns [`StagegateError::Phase`] naming the one-based position and
    /// stage that failed, or [`StagegateError::Cancelled`] if `cancel`
    /// fired between stages.
    pub async fn run(&self, source: &SourceTree, cancel: &CancellationToken) -> Result<PipelineResult> {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let mut results = Vec::with_capacity(self.stages.len());
        info!(run_id = %run_id, stages = self.stages.len(), "Pipeline started");

        for (index, stage) in self.stages.iter().enumerate() {
            let phase = index + 1;
            let kind = stage.kind();

            if cancel.is_cancelled() {
                return Err(StagegateError::Cancelled(
                    cancel.reason().unwrap_or_else(|| "cancelled".to_string()),
                ));
            }

            info!(run_id = %run_id, phase, stage = %kind, "Stage started");
            let timer = SpanTimer::start(kind.token());
            let outcome = stage.run(source, cancel).await;
            let attrs = StageSpanAttributes::new(kind)
                .with_phase(phase)
                .with_duration_ms(timer.finish());

            match outcome {
                Ok(result) => {
                    attrs.with_status("passed").emit();
                    results.push(result);
                }
                Err(err) => {
                    attrs.with_status("failed").with_error(err.to_string()).emit();
                    return Err(StagegateError::phase(phase, kind, err));
                }
            }
        }

        Ok(PipelineResult {
            run_id,
            stages: results,
            started_at,
            ended_at: Utc::now(),
        })
    }
}

/// Outputs of a pipeline that completed every stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineResult {
    /// Run identifier.
    pub run_id: Uuid,
    /// Stage results in run order.
    pub stages: Vec<StageResult>,
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// When the run ended.
    pub ended_at: DateTime<Utc>,
}

impl PipelineResult {
    /// The banner followed by every stage's output.
    #[must_use]
    pub fn summary(&self) -> String {
        let outputs: Vec<&str> = self.stages.iter().map(|s| s.output.as_str()).collect();
        format!("{SUMMARY_BANNER}{}", outputs.join(SUMMARY_SEPARATOR))
    }

    /// Returns the duration in milliseconds.
    #[must_use]
    pub fn duration_ms(&self) -> i64 {
        (self.ended_at - self.started_at).num_milliseconds()
    }

    /// Converts to a dictionary representation.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let mut map = HashMap::new();
        map.insert("run_id".to_string(), serde_json::json!(self.run_id.to_string()));
        map.insert(
            "stages".to_string(),
            serde_json::json!(self.stages.iter().map(StageResult::to_dict).collect::<Vec<_>>()),
        );
        map.insert("duration_ms".to_string(), serde_json::json!(self.duration_ms()));
        map
    }
}
