//! Stage identities.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The named units of pipeline work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StageKind {
    /// Whole-workspace compile validation.
    Check,
    /// Formatting check.
    Fmt,
    /// Static analysis with every warning denied.
    Lint,
    /// Library-level unit tests.
    UnitTest,
    /// Release build plus module lifecycle script against a database.
    IntegrationTest,
    /// Static validation of the module tree.
    ModuleLint,
    /// Dependency vulnerability audit.
    SecurityAudit,
    /// Minified stylesheet build in a Node environment.
    TailwindBuild,
}

impl StageKind {
    /// Every stage, in CLI order.
    pub const ALL: [Self; 8] = [
        Self::Check,
        Self::Fmt,
        Self::Lint,
        Self::UnitTest,
        Self::IntegrationTest,
        Self::ModuleLint,
        Self::SecurityAudit,
        Self::TailwindBuild,
    ];

    /// Short identity token used in logs and failure messages.
    #[must_use]
    pub const fn token(self) -> &'static str {
        match self {
            Self::Check => "check",
            Self::Fmt => "fmt",
            Self::Lint => "lint",
            Self::UnitTest => "test",
            Self::IntegrationTest => "integration-test",
            Self::ModuleLint => "module-lint",
            Self::SecurityAudit => "security-audit",
            Self::TailwindBuild => "tailwind-build",
        }
    }

    /// Fixed banner prefixed to the output of single-command stages.
    ///
    /// Stages that return a raw transcript have no banner.
    #[must_use]
    pub const fn banner(self) -> Option<&'static str> {
        match self {
            Self::Check => Some("Compile check passed."),
            Self::Fmt => Some("Format check passed."),
            Self::Lint => Some("Lint passed (clippy -D warnings)."),
            Self::UnitTest => Some("All unit tests passed."),
            Self::SecurityAudit => Some("Security audit passed."),
            Self::TailwindBuild => Some("CSS build complete."),
            Self::IntegrationTest | Self::ModuleLint => None,
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}
