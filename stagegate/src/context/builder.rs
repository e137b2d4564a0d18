//! Environment builder and service provisioner.

use super::{ExecStep, ExecutionContext, ServiceSpec, SourceTree};
use crate::config::PipelineConfig;
use std::collections::BTreeMap;

/// Builds the standard execution contexts from configuration.
///
/// Pure construction: nothing is pulled, installed or started here.
#[derive(Debug, Clone)]
pub struct EnvironmentBuilder {
    config: PipelineConfig,
}

impl EnvironmentBuilder {
    /// Creates a builder.
    #[must_use]
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    /// The configuration the builder reads from.
    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// The Rust build environment with caches, source and env applied.
    ///
    /// The source tree's exclusions are extended with the configured list.
    #[must_use]
    pub fn rust_base(&self, source: &SourceTree) -> ExecutionContext {
        let env_cfg = &self.config.environment;
        let cache_cfg = &self.config.cache;

        let mut ctx = ExecutionContext::from_image(&env_cfg.base_image);
        for command in &env_cfg.setup_commands {
            ctx = ctx.with_setup(ExecStep::new(command.iter().cloned()));
        }
        for volume in &cache_cfg.volumes {
            ctx = ctx.with_mounted_cache(&volume.path, cache_cfg.volume_name(&volume.name));
        }
        ctx = ctx
            .with_workdir(&env_cfg.workdir)
            .with_directory(&env_cfg.workdir, source.with_exclude(env_cfg.exclude.iter().cloned()));
        for (key, value) in &env_cfg.env {
            ctx = ctx.with_env(key, value);
        }
        ctx
    }

    /// The Node environment for frontend builds.
    ///
    /// Only the static asset subtree is mounted. The package cache volume
    /// sits over its `node_modules`.
    #[must_use]
    pub fn node_base(&self, source: &SourceTree) -> ExecutionContext {
        let env_cfg = &self.config.environment;
        let frontend = &self.config.frontend;
        let assets = source
            .with_exclude(env_cfg.exclude.iter().cloned())
            .subtree(&frontend.static_dir);

        ExecutionContext::from_image(&frontend.image)
            .with_mounted_cache(&frontend.cache.path, self.config.cache.volume_name(&frontend.cache.name))
            .with_workdir(&frontend.workdir)
            .with_directory(&frontend.workdir, assets)
    }

    /// The database service for integration tests.
    #[must_use]
    pub fn database_service(&self) -> ServiceSpec {
        let db = &self.config.database;
        ServiceSpec {
            image: db.image.clone(),
            env: BTreeMap::from([
                ("POSTGRES_DB".to_string(), db.name.clone()),
                ("POSTGRES_USER".to_string(), db.user.clone()),
                ("POSTGRES_PASSWORD".to_string(), db.password.clone()),
            ]),
            port: db.port,
        }
    }
}
