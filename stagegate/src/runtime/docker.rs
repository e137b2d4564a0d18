//! Docker CLI runtime.
//!
//! Each session gets its own network, one detached container per bound
//! service, and a long-lived main container that steps are `docker exec`ed
//! into. Cache volumes are named Docker volumes, so identical names share
//! storage across runs. The source tree is snapshotted into a temporary
//! directory and bind-mounted at the context's source path.

use super::{snapshot_tree, ContainerRuntime, ExecOutput, Session};
use crate::cancellation::{CancellationToken, CleanupRegistry};
use crate::context::ExecutionContext;
use crate::errors::{Result, StagegateError};
use async_trait::async_trait;
use futures::FutureExt;
use std::process::Stdio;
use std::time::Duration;
use tempfile::TempDir;
use tracing::{debug, info, warn};

/// Total time given to tearing down one session.
const TEARDOWN_TIMEOUT: Duration = Duration::from_secs(60);

/// Runs contexts with the local `docker` CLI.
#[derive(Debug, Clone)]
pub struct DockerRuntime {
    binary: String,
}

impl Default for DockerRuntime {
    fn default() -> Self {
        Self {
            binary: "docker".to_string(),
        }
    }
}

impl DockerRuntime {
    /// Creates a runtime using `docker` from `PATH`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses a different CLI binary, such as `podman`.
    #[must_use]
    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    /// Runs one CLI invocation and fails unless it exits 0.
    async fn docker(&self, args: &[String], cancel: &CancellationToken) -> Result<String> {
        let out = run_process(&self.binary, args, cancel).await?;
        if out.success() {
            Ok(out.stdout.trim().to_string())
        } else {
            Err(StagegateError::Runtime(format!(
                "`{} {}` failed: {}",
                self.binary,
                args.join(" "),
                out.stderr.trim()
            )))
        }
    }

    async fn provision(
        &self,
        ctx: &ExecutionContext,
        run_id: &str,
        cleanup: &CleanupRegistry,
        cancel: &CancellationToken,
    ) -> Result<(String, Option<TempDir>)> {
        let network = format!("stagegate-{run_id}");
        let with_network = !ctx.services().is_empty();

        if with_network {
            self.docker(&args(["network", "create", network.as_str()]), cancel)
                .await?;
            self.register_removal(cleanup, ["network", "rm"], &network);
        }

        for binding in ctx.services() {
            let name = format!("stagegate-{run_id}-{}", binding.alias);
            let mut run = args(["run", "-d", "--name", name.as_str(), "--network", network.as_str()]);
            run.extend(args(["--network-alias", binding.alias.as_str()]));
            for (key, value) in &binding.service.env {
                run.push("-e".to_string());
                run.push(format!("{key}={value}"));
            }
            run.push(binding.service.image.clone());

            self.docker(&run, cancel).await?;
            self.register_removal(cleanup, ["rm", "-f"], &name);
            info!(alias = %binding.alias, image = %binding.service.image, "Service started");
        }

        let snapshot = match ctx.source() {
            Some(mount) => {
                let dir = tempfile::Builder::new().prefix("stagegate-src-").tempdir()?;
                let tree = mount.tree.clone();
                let dest = dir.path().to_path_buf();
                let summary = tokio::task::spawn_blocking(move || snapshot_tree(&tree, &dest))
                    .await
                    .map_err(|e| StagegateError::Runtime(format!("snapshot task failed: {e}")))??;
                info!(
                    files = summary.files,
                    bytes = summary.bytes,
                    digest = %summary.digest,
                    "Source snapshot taken"
                );
                Some((dir, mount.path.clone()))
            }
            None => None,
        };

        let container = format!("stagegate-{run_id}-main");
        let mut run = args(["run", "-d", "--name", container.as_str()]);
        if with_network {
            run.extend(args(["--network", network.as_str()]));
        }
        for mount in ctx.cache_mounts() {
            run.push("-v".to_string());
            run.push(format!("{}:{}", mount.name, mount.path));
        }
        if let Some((dir, path)) = &snapshot {
            run.push("-v".to_string());
            run.push(format!("{}:{path}", dir.path().display()));
        }
        for (key, value) in ctx.env() {
            run.push("-e".to_string());
            run.push(format!("{key}={value}"));
        }
        run.extend(args(["-w", ctx.workdir(), "--entrypoint", "sleep", ctx.base_image(), "infinity"]));

        self.docker(&run, cancel).await?;
        self.register_removal(cleanup, ["rm", "-f"], &container);

        Ok((container, snapshot.map(|(dir, _)| dir)))
    }

    fn register_removal<const N: usize>(&self, cleanup: &CleanupRegistry, verb: [&str; N], target: &str) {
        let binary = self.binary.clone();
        let mut argv = args(verb);
        argv.push(target.to_string());
        let name = format!("{} {target}", verb.join(" "));

        cleanup.register(name, move || {
            async move {
                let out = run_process(&binary, &argv, &CancellationToken::new())
                    .await
                    .map_err(|e| e.to_string())?;
                if out.success() {
                    Ok(())
                } else {
                    Err(out.stderr.trim().to_string())
                }
            }
            .boxed()
        });
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    fn name(&self) -> &str {
        &self.binary
    }

    async fn start(
        &self,
        ctx: &ExecutionContext,
        cancel: &CancellationToken,
    ) -> Result<Box<dyn Session>> {
        let run_id = uuid::Uuid::new_v4().simple().to_string()[..12].to_string();
        let cleanup = CleanupRegistry::new();

        match self.provision(ctx, &run_id, &cleanup, cancel).await {
            Ok((container, snapshot)) => {
                debug!(run_id = %run_id, container = %container, "Session started");
                Ok(Box::new(DockerSession {
                    binary: self.binary.clone(),
                    container,
                    workdir: ctx.workdir().to_string(),
                    cleanup,
                    _snapshot: snapshot,
                }))
            }
            Err(e) => {
                for (name, msg) in cleanup.run_all(TEARDOWN_TIMEOUT).await {
                    warn!(resource = %name, error = %msg, "Teardown after failed start");
                }
                Err(e)
            }
        }
    }
}

struct DockerSession {
    binary: String,
    container: String,
    workdir: String,
    cleanup: CleanupRegistry,
    _snapshot: Option<TempDir>,
}

#[async_trait]
impl Session for DockerSession {
    async fn exec(&self, argv: &[String], cancel: &CancellationToken) -> Result<ExecOutput> {
        let mut full = args(["exec", "-w", self.workdir.as_str(), self.container.as_str()]);
        full.extend(argv.iter().cloned());
        run_process(&self.binary, &full, cancel).await
    }

    async fn shutdown(self: Box<Self>) -> Result<()> {
        let failures = self.cleanup.run_all(TEARDOWN_TIMEOUT).await;
        for (name, msg) in &failures {
            warn!(resource = %name, error = %msg, "Teardown failed");
        }
        if failures.is_empty() {
            Ok(())
        } else {
            Err(StagegateError::Runtime(format!(
                "{} resource(s) could not be removed",
                failures.len()
            )))
        }
    }
}

/// Runs a process to completion, killing it if `cancel` fires first.
async fn run_process(binary: &str, argv: &[String], cancel: &CancellationToken) -> Result<ExecOutput> {
    let child = tokio::process::Command::new(binary)
        .args(argv)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| StagegateError::Runtime(format!("cannot spawn {binary}: {e}")))?;

    tokio::select! {
        output = child.wait_with_output() => {
            let output = output?;
            Ok(ExecOutput {
                exit_code: output.status.code(),
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            })
        }
        () = cancel.cancelled() => Err(StagegateError::Cancelled(
            cancel.reason().unwrap_or_else(|| "cancelled".to_string()),
        )),
    }
}

fn args<'a, I>(parts: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a str>,
{
    parts.into_iter().map(str::to_string).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_run_process_captures_streams() {
        let out = run_process(
            "sh",
            &args(["-c", "echo out; echo err >&2; exit 3"]),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(out.exit_code, Some(3));
        assert_eq!(out.stdout, "out\n");
        assert_eq!(out.stderr, "err\n");
    }

    #[tokio::test]
    async fn test_run_process_cancellation_kills_child() {
        let cancel = std::sync::Arc::new(CancellationToken::new());
        let _timer = CancellationToken::cancel_after(&cancel, Duration::from_millis(50));

        let err = run_process("sleep", &args(["30"]), &cancel).await.unwrap_err();
        assert!(err.is_cancelled());
    }

    #[tokio::test]
    async fn test_missing_binary_is_runtime_error() {
        let runtime = DockerRuntime::new().with_binary("/nonexistent/docker");
        let err = runtime
            .docker(&args(["version"]), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, StagegateError::Runtime(_)));
    }
}
