//! Immutable execution contexts.
//!
//! An [`ExecutionContext`] describes an isolated environment and the steps to
//! run in it. Nothing happens until a runtime materialises it. Every
//! deriving method borrows `self` and returns a new context, so a base
//! environment can be shared by many stages without any of them observing
//! another's additions.

use super::{ExecStep, Script, SourceTree, Step, WaitStep};
use crate::pipeline::RetryConfig;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A persistent volume keyed by name, mounted at a container path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheMount {
    /// Volume name. Identical names share storage across runs.
    pub name: String,
    /// Mount path inside the container.
    pub path: String,
}

/// An ephemeral dependent service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceSpec {
    /// Image identifier.
    pub image: String,
    /// Environment variables.
    pub env: BTreeMap<String, String>,
    /// The single exposed port.
    pub port: u16,
}

/// A service attached to a context under a network alias.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceBinding {
    /// Hostname the service answers to inside the context.
    pub alias: String,
    /// The bound service.
    pub service: ServiceSpec,
}

/// The source tree and where it is mounted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceMount {
    /// Host tree, with exclusions.
    pub tree: SourceTree,
    /// Mount path inside the container.
    pub path: String,
}

/// Description of an isolated run environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionContext {
    base_image: String,
    setup: Vec<ExecStep>,
    cache_mounts: Vec<CacheMount>,
    workdir: String,
    source: Option<SourceMount>,
    env: BTreeMap<String, String>,
    services: Vec<ServiceBinding>,
    steps: Vec<Step>,
}

impl ExecutionContext {
    /// Creates an empty context on the given image.
    #[must_use]
    pub fn from_image(image: impl Into<String>) -> Self {
        Self {
            base_image: image.into(),
            setup: Vec::new(),
            cache_mounts: Vec::new(),
            workdir: "/".to_string(),
            source: None,
            env: BTreeMap::new(),
            services: Vec::new(),
            steps: Vec::new(),
        }
    }

    /// Appends an environment setup command.
    #[must_use]
    pub fn with_setup(&self, step: ExecStep) -> Self {
        let mut next = self.clone();
        next.setup.push(step);
        next
    }

    /// Mounts a cache volume, replacing any mount at the same path.
    #[must_use]
    pub fn with_mounted_cache(&self, path: impl Into<String>, name: impl Into<String>) -> Self {
        let mut next = self.clone();
        let mount = CacheMount {
            name: name.into(),
            path: path.into(),
        };
        next.cache_mounts.retain(|m| m.path != mount.path);
        next.cache_mounts.push(mount);
        next
    }

    /// Sets the working directory.
    #[must_use]
    pub fn with_workdir(&self, workdir: impl Into<String>) -> Self {
        let mut next = self.clone();
        next.workdir = workdir.into();
        next
    }

    /// Mounts a source tree.
    #[must_use]
    pub fn with_directory(&self, path: impl Into<String>, tree: SourceTree) -> Self {
        let mut next = self.clone();
        next.source = Some(SourceMount {
            tree,
            path: path.into(),
        });
        next
    }

    /// Sets an environment variable.
    #[must_use]
    pub fn with_env(&self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let mut next = self.clone();
        next.env.insert(key.into(), value.into());
        next
    }

    /// Binds a service under `alias`, replacing any service with that alias.
    #[must_use]
    pub fn with_service_binding(&self, alias: impl Into<String>, service: ServiceSpec) -> Self {
        let mut next = self.clone();
        let alias = alias.into();
        next.services.retain(|b| b.alias != alias);
        next.services.push(ServiceBinding { alias, service });
        next
    }

    /// Appends a command step.
    #[must_use]
    pub fn with_exec(&self, step: ExecStep) -> Self {
        self.with_step(Step::Exec(step))
    }

    /// Appends a bounded readiness wait.
    #[must_use]
    pub fn with_wait_for<I, S>(&self, probe: I, policy: RetryConfig) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.with_step(Step::WaitFor(WaitStep {
            probe: probe.into_iter().map(Into::into).collect(),
            policy,
        }))
    }

    /// Appends a script.
    #[must_use]
    pub fn with_script(&self, script: Script) -> Self {
        self.with_step(Step::Script(script))
    }

    /// Appends any step.
    #[must_use]
    pub fn with_step(&self, step: Step) -> Self {
        let mut next = self.clone();
        next.steps.push(step);
        next
    }

    /// Base image identifier.
    #[must_use]
    pub fn base_image(&self) -> &str {
        &self.base_image
    }

    /// Setup commands in order.
    #[must_use]
    pub fn setup(&self) -> &[ExecStep] {
        &self.setup
    }

    /// Cache mounts.
    #[must_use]
    pub fn cache_mounts(&self) -> &[CacheMount] {
        &self.cache_mounts
    }

    /// Working directory.
    #[must_use]
    pub fn workdir(&self) -> &str {
        &self.workdir
    }

    /// Mounted source, if any.
    #[must_use]
    pub fn source(&self) -> Option<&SourceMount> {
        self.source.as_ref()
    }

    /// Environment variables.
    #[must_use]
    pub fn env(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    /// Bound services.
    #[must_use]
    pub fn services(&self) -> &[ServiceBinding] {
        &self.services
    }

    /// Derived steps in order.
    #[must_use]
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }
}
