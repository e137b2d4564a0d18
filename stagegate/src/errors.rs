//! Error types for stagegate.
//!
//! Every failure path carries human-readable text naming the stage that
//! failed and the diagnostic produced by the underlying command.

use crate::runtime::CommandFailure;
use crate::stages::StageKind;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// The main error type for stagegate operations.
#[derive(Debug, Error)]
pub enum StagegateError {
    /// An external command run by a stage exited unsuccessfully.
    #[error("{0}")]
    Stage(#[from] StageError),

    /// A fail-fast command exited unsuccessfully.
    #[error("{0}")]
    Command(#[from] CommandFailure),

    /// A stage inside a composed pipeline failed; later stages were not run.
    #[error("phase {phase} ({stage}) failed: {source}")]
    Phase {
        /// One-based position of the failing stage.
        phase: usize,
        /// The failing stage.
        stage: StageKind,
        /// The stage's own failure.
        #[source]
        source: Box<StagegateError>,
    },

    /// The run was cancelled or its deadline elapsed.
    #[error("Pipeline cancelled: {0}")]
    Cancelled(String),

    /// The container runtime could not be driven.
    #[error("Runtime error: {0}")]
    Runtime(String),

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl StagegateError {
    /// Wraps a stage failure with its position in a composed pipeline.
    #[must_use]
    pub fn phase(phase: usize, stage: StageKind, source: Self) -> Self {
        Self::Phase {
            phase,
            stage,
            source: Box::new(source),
        }
    }

    /// Returns the stage this error originated from, if any.
    #[must_use]
    pub fn stage(&self) -> Option<StageKind> {
        match self {
            Self::Stage(err) => Some(err.stage),
            Self::Phase { stage, .. } => Some(*stage),
            _ => None,
        }
    }

    /// Returns true if this error came from cancellation.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        match self {
            Self::Cancelled(_) => true,
            Self::Phase { source, .. } => source.is_cancelled(),
            _ => false,
        }
    }

    /// Converts to a dictionary representation.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let mut map = HashMap::new();
        let kind = match self {
            Self::Stage(_) => "StageFailure",
            Self::Command(_) => "CommandFailure",
            Self::Phase { .. } => "CompositionFailure",
            Self::Cancelled(_) => "Cancelled",
            Self::Runtime(_) => "RuntimeError",
            Self::Config(_) => "ConfigError",
            Self::Io(_) => "IoError",
        };
        map.insert("type".to_string(), serde_json::json!(kind));
        if let Some(stage) = self.stage() {
            map.insert("stage".to_string(), serde_json::json!(stage.token()));
        }
        if let Self::Phase { phase, .. } = self {
            map.insert("phase".to_string(), serde_json::json!(phase));
        }
        map.insert("message".to_string(), serde_json::json!(self.to_string()));
        map
    }
}

/// Error raised when a stage's command fails.
///
/// Carries the stage identity and the diagnostic text verbatim. No
/// structured exit code is kept.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("stage '{stage}' failed: {message}")]
pub struct StageError {
    /// Stage that failed.
    pub stage: StageKind,
    /// Original diagnostic.
    pub message: String,
}

impl StageError {
    /// Creates a new stage error.
    #[must_use]
    pub fn new(stage: StageKind, message: impl Into<String>) -> Self {
        Self {
            stage,
            message: message.into(),
        }
    }
}

/// Result alias used across the crate.
pub type Result<T, E = StagegateError> = std::result::Result<T, E>;
