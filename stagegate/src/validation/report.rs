//! Validation findings and the printed report.

use serde::{Deserialize, Serialize};
use std::fmt;

/// How serious a finding is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Fails validation.
    Error,
    /// Reported only.
    Warning,
}

/// The pass that produced a finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckId {
    /// Manifest structure and declared data files.
    Manifest,
    /// XML well-formedness.
    XmlWellFormed,
    /// Duplicate record ids within a module.
    DuplicateIds,
    /// SQL assembled with string formatting.
    UnsafeSql,
    /// Abort macros in non-test code.
    AbortMacros,
}

impl CheckId {
    /// Every pass, in execution order.
    pub const ALL: [Self; 5] = [
        Self::Manifest,
        Self::XmlWellFormed,
        Self::DuplicateIds,
        Self::UnsafeSql,
        Self::AbortMacros,
    ];

    /// Progress title printed when the pass starts.
    #[must_use]
    pub const fn title(self) -> &'static str {
        match self {
            Self::Manifest => "Checking module manifests...",
            Self::XmlWellFormed => "Checking XML data files...",
            Self::DuplicateIds => "Checking for duplicate record IDs...",
            Self::UnsafeSql => "Checking for unsafe SQL patterns...",
            Self::AbortMacros => "Checking for panic patterns...",
        }
    }
}

/// One problem found by a pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    /// Severity.
    pub severity: Severity,
    /// Originating pass.
    pub check: CheckId,
    /// Human-readable description.
    pub message: String,
}

impl Finding {
    /// Creates an error finding.
    #[must_use]
    pub fn error(check: CheckId, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            check,
            message: message.into(),
        }
    }

    /// Creates a warning finding.
    #[must_use]
    pub fn warning(check: CheckId, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            check,
            message: message.into(),
        }
    }
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.severity {
            Severity::Error => write!(f, "ERROR: {}", self.message),
            Severity::Warning => write!(f, "WARNING: {}", self.message),
        }
    }
}

/// Printed lines plus error and warning counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    lines: Vec<String>,
    errors: usize,
    warnings: usize,
}

impl ValidationReport {
    /// Creates an empty report.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a plain line.
    pub fn line(&mut self, text: impl Into<String>) {
        self.lines.push(text.into());
    }

    /// Prints a finding and bumps the matching counter.
    pub fn record(&mut self, finding: &Finding) {
        match finding.severity {
            Severity::Error => self.errors += 1,
            Severity::Warning => self.warnings += 1,
        }
        self.lines.push(finding.to_string());
    }

    /// Number of errors.
    #[must_use]
    pub fn errors(&self) -> usize {
        self.errors
    }

    /// Number of warnings.
    #[must_use]
    pub fn warnings(&self) -> usize {
        self.warnings
    }

    /// True when no errors were recorded. Warnings never fail validation.
    #[must_use]
    pub fn success(&self) -> bool {
        self.errors == 0
    }

    /// Lines in print order.
    #[must_use]
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// The full transcript, one line per entry.
    #[must_use]
    pub fn transcript(&self) -> String {
        let mut out = self.lines.join("\n");
        out.push('\n');
        out
    }
}
