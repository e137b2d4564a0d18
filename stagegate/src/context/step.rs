//! Typed steps executed against a context.
//!
//! Multi-step procedures are explicit lists of steps. Whether a failing
//! step aborts the run or is swallowed is the [`StepPolicy`] on that step.

use crate::pipeline::RetryConfig;
use serde::{Deserialize, Serialize};

/// What happens when a step's command exits unsuccessfully.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepPolicy {
    /// Abort the run and surface the failure.
    #[default]
    FailFast,
    /// Record the failure and continue with the next step.
    Tolerant,
}

/// A single command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecStep {
    /// Program and arguments.
    pub argv: Vec<String>,
    /// Failure policy.
    pub policy: StepPolicy,
}

impl ExecStep {
    /// Creates a fail-fast step.
    #[must_use]
    pub fn new<I, S>(argv: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            argv: argv.into_iter().map(Into::into).collect(),
            policy: StepPolicy::FailFast,
        }
    }

    /// Sets the failure policy.
    #[must_use]
    pub fn with_policy(mut self, policy: StepPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Renders the command for logs and diagnostics.
    #[must_use]
    pub fn display(&self) -> String {
        self.argv.join(" ")
    }
}

/// Bounded wait for a dependency to become reachable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaitStep {
    /// Probe command; exit status 0 means ready.
    pub probe: Vec<String>,
    /// Attempt budget and spacing.
    pub policy: RetryConfig,
}

/// One line of a [`Script`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScriptLine {
    /// Print a line to the transcript.
    Echo {
        /// Text to print.
        text: String,
    },
    /// Run a command, appending its stdout and then its stderr to the
    /// transcript.
    ///
    /// The streams are captured separately, so lines the command wrote to
    /// both are not interleaved in write order.
    Run {
        /// The command and its policy.
        step: ExecStep,
    },
    /// Run a query and print `label: value` with whitespace stripped.
    ///
    /// Stderr is discarded. A failing probe aborts the script.
    Probe {
        /// Text printed before the value.
        label: String,
        /// Query command.
        argv: Vec<String>,
    },
}

/// An ordered procedure whose combined output is one transcript.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Script {
    /// Script name, used in logs.
    pub name: String,
    /// Lines in execution order.
    pub lines: Vec<ScriptLine>,
}

impl Script {
    /// Creates an empty script.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            lines: Vec::new(),
        }
    }

    /// Appends an echo line.
    #[must_use]
    pub fn echo(mut self, text: impl Into<String>) -> Self {
        self.lines.push(ScriptLine::Echo { text: text.into() });
        self
    }

    /// Appends a command.
    #[must_use]
    pub fn run(mut self, step: ExecStep) -> Self {
        self.lines.push(ScriptLine::Run { step });
        self
    }

    /// Appends a labelled probe.
    #[must_use]
    pub fn probe<I, S>(mut self, label: impl Into<String>, argv: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.lines.push(ScriptLine::Probe {
            label: label.into(),
            argv: argv.into_iter().map(Into::into).collect(),
        });
        self
    }

    /// Iterates over the commands the script runs, with their policies.
    pub fn commands(&self) -> impl Iterator<Item = (&[String], StepPolicy)> {
        self.lines.iter().filter_map(|line| match line {
            ScriptLine::Echo { .. } => None,
            ScriptLine::Run { step } => Some((step.argv.as_slice(), step.policy)),
            ScriptLine::Probe { argv, .. } => Some((argv.as_slice(), StepPolicy::FailFast)),
        })
    }
}

/// A step appended to a context after the environment is built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Step {
    /// Run one command.
    Exec(ExecStep),
    /// Wait for a dependency.
    WaitFor(WaitStep),
    /// Run a multi-line procedure.
    Script(Script),
}

impl Step {
    /// Returns true if this step's output becomes the run's result.
    #[must_use]
    pub fn produces_output(&self) -> bool {
        !matches!(self, Self::WaitFor(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exec_step_defaults_to_fail_fast() {
        let step = ExecStep::new(["cargo", "check"]);
        assert_eq!(step.policy, StepPolicy::FailFast);
        assert_eq!(step.display(), "cargo check");
        assert_eq!(
            step.with_policy(StepPolicy::Tolerant).policy,
            StepPolicy::Tolerant
        );
    }

    #[test]
    fn test_script_commands_report_policies() {
        let script = Script::new("lifecycle")
            .echo("[1/2] migrate")
            .run(ExecStep::new(["server", "migrate"]).with_policy(StepPolicy::Tolerant))
            .echo("[2/2] verify")
            .probe("records", ["psql", "-c", "SELECT 1"]);

        let commands: Vec<_> = script.commands().collect();
        assert_eq!(commands.len(), 2);
        assert_eq!(commands[0].1, StepPolicy::Tolerant);
        assert_eq!(commands[1].1, StepPolicy::FailFast);
        assert_eq!(commands[1].0[0], "psql");
    }

    #[test]
    fn test_wait_step_produces_no_output() {
        let wait = Step::WaitFor(WaitStep {
            probe: vec!["pg_isready".to_string()],
            policy: RetryConfig::default(),
        });
        assert!(!wait.produces_output());
        assert!(Step::Exec(ExecStep::new(["true"])).produces_output());
    }
}
