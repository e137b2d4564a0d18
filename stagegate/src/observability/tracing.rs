//! Log subscriber setup and stage span helpers.

use crate::stages::StageKind;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Instant;
use tracing_subscriber::EnvFilter;

/// Environment variable holding the log filter.
pub const LOG_ENV: &str = "STAGEGATE_LOG";

/// Installs the global subscriber, writing to stderr.
///
/// The filter comes from `STAGEGATE_LOG` and defaults to `info`. Stdout is
/// left for stage output. Calling this twice is harmless: the second
/// installation is ignored.
pub fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    let installed = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    if installed.is_err() {
        tracing::debug!("Tracing subscriber already installed");
    }
}

/// Attributes describing one stage execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageSpanAttributes {
    /// Stage identity.
    pub stage: StageKind,
    /// One-based position inside a composed run.
    pub phase: Option<usize>,
    /// Final status.
    pub status: Option<String>,
    /// Duration in milliseconds.
    pub duration_ms: Option<f64>,
    /// Error message if failed.
    pub error: Option<String>,
}

impl StageSpanAttributes {
    /// Creates attributes for a stage.
    #[must_use]
    pub fn new(stage: StageKind) -> Self {
        Self {
            stage,
            phase: None,
            status: None,
            duration_ms: None,
            error: None,
        }
    }

    /// Sets the phase.
    #[must_use]
    pub fn with_phase(mut self, phase: usize) -> Self {
        self.phase = Some(phase);
        self
    }

    /// Sets the status.
    #[must_use]
    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    /// Sets the duration.
    #[must_use]
    pub fn with_duration_ms(mut self, duration_ms: f64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }

    /// Sets the error.
    #[must_use]
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    /// Flattens into dotted keys.
    #[must_use]
    pub fn to_attributes(&self) -> HashMap<String, String> {
        let mut attrs = HashMap::new();
        attrs.insert("stage.name".to_string(), self.stage.token().to_string());

        if let Some(v) = self.phase {
            attrs.insert("stage.phase".to_string(), v.to_string());
        }
        if let Some(ref v) = self.status {
            attrs.insert("stage.status".to_string(), v.clone());
        }
        if let Some(v) = self.duration_ms {
            attrs.insert("stage.duration_ms".to_string(), v.to_string());
        }
        if let Some(ref v) = self.error {
            attrs.insert("stage.error".to_string(), v.clone());
        }
        attrs
    }

    /// Emits the attributes as one log event.
    pub fn emit(&self) {
        let attributes = self.to_attributes();
        if self.error.is_some() {
            tracing::error!(stage = %self.stage, ?attributes, "Stage failed");
        } else {
            tracing::info!(stage = %self.stage, ?attributes, "Stage finished");
        }
    }
}

/// Simple span timing helper.
#[derive(Debug)]
pub struct SpanTimer {
    start: Instant,
    name: String,
}

impl SpanTimer {
    /// Starts a new span timer.
    #[must_use]
    pub fn start(name: impl Into<String>) -> Self {
        Self {
            start: Instant::now(),
            name: name.into(),
        }
    }

    /// Returns the elapsed time in milliseconds.
    #[must_use]
    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }

    /// Returns the span name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Finishes the span and returns the duration.
    #[must_use]
    pub fn finish(self) -> f64 {
        self.elapsed_ms()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_span_attributes() {
        let attrs = StageSpanAttributes::new(StageKind::Lint)
            .with_phase(2)
            .with_status("failed")
            .with_error("clippy found 3 warnings");

        let flat = attrs.to_attributes();
        assert_eq!(flat.get("stage.name"), Some(&"lint".to_string()));
        assert_eq!(flat.get("stage.phase"), Some(&"2".to_string()));
        assert_eq!(flat.get("stage.status"), Some(&"failed".to_string()));
        assert!(!flat.contains_key("stage.duration_ms"));
    }

    #[test]
    fn test_span_timer() {
        let timer = SpanTimer::start("module-lint");
        std::thread::sleep(std::time::Duration::from_millis(10));
        assert_eq!(timer.name(), "module-lint");
        assert!(timer.finish() >= 10.0);
    }

    #[test]
    fn test_init_tracing_twice() {
        init_tracing(false);
        init_tracing(true);
    }
}
