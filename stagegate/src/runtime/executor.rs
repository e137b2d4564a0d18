//! Drives an execution context's steps through a session.

use super::{CommandFailure, ContainerRuntime, ExecOutput, Session};
use crate::cancellation::CancellationToken;
use crate::context::{ExecStep, ExecutionContext, Script, ScriptLine, Step, StepPolicy, WaitStep};
use crate::errors::{Result, StagegateError};
use crate::pipeline::{poll_until, PollOutcome};
use tracing::{debug, info, warn};

/// Materialises `ctx` on `runtime` and runs it to completion.
///
/// Setup commands run first and are always fail-fast. The returned text is
/// the output of the last output-producing step: the stdout of an exec
/// step, or the transcript of a script. The session is shut down whether
/// the steps succeed, fail, or are cancelled.
pub async fn execute(
    runtime: &dyn ContainerRuntime,
    ctx: &ExecutionContext,
    cancel: &CancellationToken,
) -> Result<String> {
    ensure_active(cancel)?;
    debug!(runtime = runtime.name(), image = ctx.base_image(), "Starting session");

    let session = runtime.start(ctx, cancel).await?;
    let result = run_steps(session.as_ref(), ctx, cancel).await;

    if let Err(e) = session.shutdown().await {
        warn!(error = %e, "Session shutdown failed");
    }

    result
}

async fn run_steps(
    session: &dyn Session,
    ctx: &ExecutionContext,
    cancel: &CancellationToken,
) -> Result<String> {
    for setup in ctx.setup() {
        ensure_active(cancel)?;
        run_exec(session, setup, cancel).await?;
    }

    let mut output = String::new();
    for step in ctx.steps() {
        ensure_active(cancel)?;
        match step {
            Step::Exec(exec) => {
                output = run_exec(session, exec, cancel).await?.stdout;
            }
            Step::WaitFor(wait) => wait_for(session, wait, cancel).await?,
            Step::Script(script) => {
                output = run_script(session, script, cancel).await?;
            }
        }
    }

    Ok(output)
}

async fn run_exec(
    session: &dyn Session,
    step: &ExecStep,
    cancel: &CancellationToken,
) -> Result<ExecOutput> {
    debug!(command = %step.display(), policy = ?step.policy, "Running command");
    let out = session.exec(&step.argv, cancel).await?;

    if !out.success() {
        match step.policy {
            StepPolicy::FailFast => return Err(CommandFailure::new(step.display(), out).into()),
            StepPolicy::Tolerant => warn!(
                command = %step.display(),
                exit_code = ?out.exit_code,
                "Tolerant step failed, continuing"
            ),
        }
    }

    Ok(out)
}

async fn wait_for(
    session: &dyn Session,
    wait: &WaitStep,
    cancel: &CancellationToken,
) -> Result<()> {
    let key = wait.probe.join(" ");
    let probe = wait.probe.as_slice();

    let outcome = poll_until(&wait.policy, &key, cancel, |_| async move {
        session
            .exec(probe, cancel)
            .await
            .map(|out| out.success())
            .unwrap_or(false)
    })
    .await;

    match outcome {
        PollOutcome::Ready { attempts } => {
            info!(probe = %key, attempts, "Dependency ready");
            Ok(())
        }
        PollOutcome::Exhausted { attempts } => {
            // Readiness is attempted, not guaranteed; later steps surface the fallout.
            warn!(probe = %key, attempts, "Dependency not ready, proceeding anyway");
            Ok(())
        }
        PollOutcome::Cancelled { .. } => Err(cancelled(cancel)),
    }
}

async fn run_script(
    session: &dyn Session,
    script: &Script,
    cancel: &CancellationToken,
) -> Result<String> {
    let mut transcript = String::new();

    for line in &script.lines {
        ensure_active(cancel)?;
        match line {
            ScriptLine::Echo { text } => {
                transcript.push_str(text);
                transcript.push('\n');
            }
            ScriptLine::Run { step } => {
                let out = session.exec(&step.argv, cancel).await?;
                // Stdout block first, then stderr block.
                transcript.push_str(&out.stdout);
                transcript.push_str(&out.stderr);

                if !out.success() {
                    if step.policy == StepPolicy::FailFast {
                        return Err(script_failure(step.display(), &transcript, out).into());
                    }
                    warn!(
                        script = %script.name,
                        command = %step.display(),
                        exit_code = ?out.exit_code,
                        "Tolerant step failed, continuing"
                    );
                }
            }
            ScriptLine::Probe { label, argv } => {
                let out = session.exec(argv, cancel).await?;
                if !out.success() {
                    return Err(script_failure(argv.join(" "), &transcript, out).into());
                }
                let value: String = out.stdout.chars().filter(|c| !c.is_whitespace()).collect();
                transcript.push_str(&format!("{label}: {value}\n"));
            }
        }
    }

    Ok(transcript)
}

fn script_failure(command: String, transcript: &str, out: ExecOutput) -> CommandFailure {
    CommandFailure::new(
        command,
        ExecOutput {
            exit_code: out.exit_code,
            stdout: transcript.to_string(),
            stderr: out.stderr,
        },
    )
}

fn ensure_active(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        Err(cancelled(cancel))
    } else {
        Ok(())
    }
}

fn cancelled(cancel: &CancellationToken) -> StagegateError {
    StagegateError::Cancelled(cancel.reason().unwrap_or_else(|| "cancelled".to_string()))
}
