//! Mock runtime and stages for testing.

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::cancellation::CancellationToken;
use crate::context::{ExecutionContext, SourceTree};
use crate::errors::{Result, StageError, StagegateError};
use crate::runtime::{ContainerRuntime, ExecOutput, Session};
use crate::stages::{Stage, StageKind, StageResult};

#[derive(Debug)]
struct Rule {
    prefix: String,
    output: ExecOutput,
    remaining: Option<usize>,
}

#[derive(Debug, Default)]
struct MockState {
    rules: Mutex<Vec<Rule>>,
    commands: Mutex<Vec<String>>,
    contexts: Mutex<Vec<ExecutionContext>>,
    shutdowns: AtomicUsize,
    caches: Option<CacheStore>,
}

/// A runtime that answers commands from canned rules.
///
/// Commands are matched by the prefix of their space-joined argv; the first
/// rule with uses left wins. Unmatched commands succeed with empty output.
#[derive(Debug, Clone, Default)]
pub struct MockRuntime {
    state: Arc<MockState>,
}

impl MockRuntime {
    /// Creates a runtime where every command succeeds.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a runtime that mounts caches into `store`.
    #[must_use]
    pub fn with_cache_store(store: CacheStore) -> Self {
        Self {
            state: Arc::new(MockState {
                caches: Some(store),
                ..MockState::default()
            }),
        }
    }

    /// Answers commands starting with `prefix` with `output`.
    #[must_use]
    pub fn respond(self, prefix: impl Into<String>, output: ExecOutput) -> Self {
        self.push_rule(prefix.into(), output, None);
        self
    }

    /// Like [`respond`](Self::respond), but only for the next `times` matches.
    #[must_use]
    pub fn respond_times(self, prefix: impl Into<String>, output: ExecOutput, times: usize) -> Self {
        self.push_rule(prefix.into(), output, Some(times));
        self
    }

    fn push_rule(&self, prefix: String, output: ExecOutput, remaining: Option<usize>) {
        self.state.rules.lock().push(Rule {
            prefix,
            output,
            remaining,
        });
    }

    /// Every command run so far, space-joined.
    #[must_use]
    pub fn commands(&self) -> Vec<String> {
        self.state.commands.lock().clone()
    }

    /// Number of commands run that start with `prefix`.
    #[must_use]
    pub fn count_of(&self, prefix: &str) -> usize {
        self.state
            .commands
            .lock()
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }

    /// Contexts sessions were started from.
    #[must_use]
    pub fn started_contexts(&self) -> Vec<ExecutionContext> {
        self.state.contexts.lock().clone()
    }

    /// Number of sessions started.
    #[must_use]
    pub fn starts(&self) -> usize {
        self.state.contexts.lock().len()
    }

    /// Number of sessions shut down.
    #[must_use]
    pub fn shutdowns(&self) -> usize {
        self.state.shutdowns.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContainerRuntime for MockRuntime {
    fn name(&self) -> &str {
        "mock"
    }

    async fn start(
        &self,
        ctx: &ExecutionContext,
        _cancel: &CancellationToken,
    ) -> Result<Box<dyn Session>> {
        if let Some(store) = &self.state.caches {
            for mount in ctx.cache_mounts() {
                store.mount(&mount.name);
            }
        }
        self.state.contexts.lock().push(ctx.clone());
        Ok(Box::new(MockSession {
            state: Arc::clone(&self.state),
        }))
    }
}

struct MockSession {
    state: Arc<MockState>,
}

#[async_trait]
impl Session for MockSession {
    async fn exec(&self, argv: &[String], cancel: &CancellationToken) -> Result<ExecOutput> {
        if cancel.is_cancelled() {
            return Err(StagegateError::Cancelled(
                cancel.reason().unwrap_or_else(|| "cancelled".to_string()),
            ));
        }

        let command = argv.join(" ");
        self.state.commands.lock().push(command.clone());

        let mut rules = self.state.rules.lock();
        let rule = rules
            .iter_mut()
            .find(|r| command.starts_with(&r.prefix) && r.remaining != Some(0));
        Ok(match rule {
            Some(rule) => {
                if let Some(left) = rule.remaining.as_mut() {
                    *left -= 1;
                }
                rule.output.clone()
            }
            None => ExecOutput::ok(""),
        })
    }

    async fn shutdown(self: Box<Self>) -> Result<()> {
        self.state.shutdowns.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// In-memory stand-in for named cache volumes.
///
/// Clones share storage, so a store handed to several runtimes behaves like
/// volumes that outlive individual runs.
#[derive(Debug, Clone, Default)]
pub struct CacheStore {
    volumes: Arc<DashMap<String, CacheVolume>>,
}

#[derive(Debug, Default)]
struct CacheVolume {
    mounts: usize,
    entries: BTreeMap<String, String>,
}

impl CacheStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a mount of `name`, creating the volume on first use.
    pub fn mount(&self, name: &str) {
        self.volumes.entry(name.to_string()).or_default().mounts += 1;
    }

    /// Times `name` has been mounted.
    #[must_use]
    pub fn mounts(&self, name: &str) -> usize {
        self.volumes.get(name).map_or(0, |v| v.mounts)
    }

    /// Stores an entry in a volume.
    pub fn put(&self, name: &str, key: impl Into<String>, value: impl Into<String>) {
        self.volumes
            .entry(name.to_string())
            .or_default()
            .entries
            .insert(key.into(), value.into());
    }

    /// Reads an entry from a volume.
    #[must_use]
    pub fn get(&self, name: &str, key: &str) -> Option<String> {
        self.volumes.get(name).and_then(|v| v.entries.get(key).cloned())
    }

    /// Names of every volume, sorted.
    #[must_use]
    pub fn volume_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.volumes.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }
}

/// A stage with a fixed outcome that records its calls.
#[derive(Debug)]
pub struct RecordingStage {
    kind: StageKind,
    outcome: std::result::Result<String, String>,
    calls: AtomicUsize,
    sources: Mutex<Vec<PathBuf>>,
}

impl RecordingStage {
    /// A stage that succeeds with `output`.
    #[must_use]
    pub fn passing(kind: StageKind, output: impl Into<String>) -> Arc<Self> {
        Arc::new(Self::with_outcome(kind, Ok(output.into())))
    }

    /// A stage that fails with `message`.
    #[must_use]
    pub fn failing(kind: StageKind, message: impl Into<String>) -> Arc<Self> {
        Arc::new(Self::with_outcome(kind, Err(message.into())))
    }

    fn with_outcome(kind: StageKind, outcome: std::result::Result<String, String>) -> Self {
        Self {
            kind,
            outcome,
            calls: AtomicUsize::new(0),
            sources: Mutex::new(Vec::new()),
        }
    }

    /// Returns the number of times the stage was run.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Source roots the stage was run against.
    #[must_use]
    pub fn sources(&self) -> Vec<PathBuf> {
        self.sources.lock().clone()
    }
}

#[async_trait]
impl Stage for RecordingStage {
    fn kind(&self) -> StageKind {
        self.kind
    }

    async fn run(&self, source: &SourceTree, _cancel: &CancellationToken) -> Result<StageResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.sources.lock().push(source.root().to_path_buf());

        match &self.outcome {
            Ok(output) => Ok(StageResult::completed(self.kind, output.clone(), Utc::now())),
            Err(message) => Err(StageError::new(self.kind, message.clone()).into()),
        }
    }
}
