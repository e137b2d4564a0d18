//! Container runtimes and the step executor.
//!
//! A [`ContainerRuntime`] turns an [`ExecutionContext`] into a live
//! [`Session`]; [`execute`] then drives the context's setup and steps
//! through that session and returns the captured output.

mod docker;
mod executor;
mod snapshot;

pub use docker::DockerRuntime;
pub use executor::execute;
pub use snapshot::{snapshot_tree, SnapshotSummary};

use crate::cancellation::CancellationToken;
use crate::context::ExecutionContext;
use crate::errors::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Debug};
use thiserror::Error;

/// Captured result of one command.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecOutput {
    /// Exit status; `None` when the process was killed by a signal.
    pub exit_code: Option<i32>,
    /// Standard output.
    pub stdout: String,
    /// Standard error.
    pub stderr: String,
}

impl ExecOutput {
    /// A successful result with the given stdout.
    #[must_use]
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            exit_code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// A failed result with the given exit code and stderr.
    #[must_use]
    pub fn failed(exit_code: i32, stderr: impl Into<String>) -> Self {
        Self {
            exit_code: Some(exit_code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    /// Returns true if the command exited with status 0.
    #[must_use]
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// A command that exited unsuccessfully.
///
/// Both streams are kept verbatim so the caller sees exactly what the tool
/// printed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub struct CommandFailure {
    /// The command, rendered as a single line.
    pub command: String,
    /// Exit status, if the process exited normally.
    pub exit_code: Option<i32>,
    /// Captured stdout.
    pub stdout: String,
    /// Captured stderr.
    pub stderr: String,
}

impl CommandFailure {
    /// Builds a failure from a command and its output.
    #[must_use]
    pub fn new(command: impl Into<String>, output: ExecOutput) -> Self {
        Self {
            command: command.into(),
            exit_code: output.exit_code,
            stdout: output.stdout,
            stderr: output.stderr,
        }
    }
}

impl fmt::Display for CommandFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.exit_code {
            Some(code) => write!(f, "command `{}` exited with status {code}", self.command)?,
            None => write!(f, "command `{}` was terminated by a signal", self.command)?,
        }
        if !self.stdout.trim().is_empty() {
            write!(f, "\nstdout:\n{}", self.stdout.trim_end())?;
        }
        if !self.stderr.trim().is_empty() {
            write!(f, "\nstderr:\n{}", self.stderr.trim_end())?;
        }
        Ok(())
    }
}

/// Materialises execution contexts.
#[async_trait]
pub trait ContainerRuntime: Send + Sync + Debug {
    /// Runtime name, used in logs.
    fn name(&self) -> &str;

    /// Creates the isolated environment described by `ctx`: mounts, env and
    /// bound services. Steps are not run here.
    async fn start(
        &self,
        ctx: &ExecutionContext,
        cancel: &CancellationToken,
    ) -> Result<Box<dyn Session>>;
}

/// A live environment commands can be run in.
#[async_trait]
pub trait Session: Send + Sync {
    /// Runs one command to completion.
    ///
    /// A non-zero exit is not an error at this layer; it is reported in
    /// the returned [`ExecOutput`].
    async fn exec(&self, argv: &[String], cancel: &CancellationToken) -> Result<ExecOutput>;

    /// Releases everything the session created.
    async fn shutdown(self: Box<Self>) -> Result<()>;
}
