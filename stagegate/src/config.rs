//! Pipeline configuration.
//!
//! Every literal the pipeline depends on (images, cache names, credentials,
//! validation patterns) is a default here. A JSON file may override any
//! subset of fields; missing fields keep their defaults.

use crate::errors::{Result, StagegateError};
use crate::pipeline::{BackoffStrategy, JitterStrategy, RetryConfig};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Build environment.
    pub environment: EnvironmentConfig,
    /// Persistent cache volumes.
    pub cache: CacheConfig,
    /// Ephemeral database service.
    pub database: DatabaseConfig,
    /// Integration test lifecycle.
    pub integration: IntegrationConfig,
    /// Module validation.
    pub validation: ValidationConfig,
    /// Frontend asset build.
    pub frontend: FrontendConfig,
}

impl PipelineConfig {
    /// Creates the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a configuration file, falling back to defaults for missing fields.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            StagegateError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        let config: Self = serde_json::from_str(&raw).map_err(|e| {
            StagegateError::Config(format!("invalid config {}: {e}", path.display()))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Sets the cache namespace.
    #[must_use]
    pub fn with_cache_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.cache.namespace = Some(namespace.into());
        self
    }

    /// Checks invariants that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.environment.base_image.trim().is_empty() {
            return Err(StagegateError::Config("environment.base_image is empty".into()));
        }
        if self.frontend.image.trim().is_empty() {
            return Err(StagegateError::Config("frontend.image is empty".into()));
        }
        if self.database.readiness_attempts == 0 {
            return Err(StagegateError::Config(
                "database.readiness_attempts must be at least 1".into(),
            ));
        }
        if let Some(ns) = &self.cache.namespace {
            let valid = !ns.is_empty()
                && ns
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
            if !valid {
                return Err(StagegateError::Config(format!(
                    "cache.namespace '{ns}' may only contain [A-Za-z0-9._-]"
                )));
            }
        }
        Ok(())
    }
}

/// The isolated build environment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvironmentConfig {
    /// Base image identifier.
    pub base_image: String,
    /// Dependency installation commands, run in order.
    pub setup_commands: Vec<Vec<String>>,
    /// Working directory inside the container.
    pub workdir: String,
    /// Subtrees removed from the source snapshot.
    pub exclude: Vec<String>,
    /// Environment variables.
    pub env: BTreeMap<String, String>,
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        Self {
            base_image: "rust:1.85-bookworm".to_string(),
            setup_commands: vec![
                argv(&["apt-get", "update"]),
                argv(&[
                    "apt-get",
                    "install",
                    "-y",
                    "libpq-dev",
                    "pkg-config",
                    "build-essential",
                    "postgresql-client",
                ]),
            ],
            workdir: "/app".to_string(),
            exclude: vec![
                "target/".to_string(),
                ".git/".to_string(),
                "ci/".to_string(),
                "erp_web/static/node_modules/".to_string(),
            ],
            env: BTreeMap::from([
                ("CARGO_TARGET_DIR".to_string(), "/app/target".to_string()),
                ("RUST_BACKTRACE".to_string(), "1".to_string()),
            ]),
        }
    }
}

/// A named cache volume and where it is mounted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheVolumeConfig {
    /// Stable volume name.
    pub name: String,
    /// Mount path inside the container.
    pub path: String,
}

/// Persistent cache volumes shared across runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Optional prefix isolating one run's caches from others.
    pub namespace: Option<String>,
    /// Volumes to mount.
    pub volumes: Vec<CacheVolumeConfig>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            namespace: None,
            volumes: vec![
                CacheVolumeConfig {
                    name: "cargo-registry".to_string(),
                    path: "/usr/local/cargo/registry".to_string(),
                },
                CacheVolumeConfig {
                    name: "cargo-git".to_string(),
                    path: "/usr/local/cargo/git".to_string(),
                },
                CacheVolumeConfig {
                    name: "cargo-target".to_string(),
                    path: "/app/target".to_string(),
                },
            ],
        }
    }
}

impl CacheConfig {
    /// Resolves a cache name to the volume that backs it.
    #[must_use]
    pub fn volume_name(&self, name: &str) -> String {
        match &self.namespace {
            Some(ns) => format!("{ns}-{name}"),
            None => name.to_string(),
        }
    }
}

/// The ephemeral database used by the integration test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Database image.
    pub image: String,
    /// Network alias the service is bound under.
    pub alias: String,
    /// Exposed port.
    pub port: u16,
    /// Database name.
    pub name: String,
    /// Database user.
    pub user: String,
    /// Database password.
    pub password: String,
    /// Maximum readiness probes.
    pub readiness_attempts: usize,
    /// Interval between readiness probes; the base delay for growing backoffs.
    pub readiness_interval_ms: u64,
    /// Upper bound on any one readiness delay.
    pub readiness_max_interval_ms: u64,
    /// How the delay grows between readiness probes.
    pub readiness_backoff: BackoffStrategy,
    /// Randomisation applied to each readiness delay.
    pub readiness_jitter: JitterStrategy,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            image: "postgres:18-alpine".to_string(),
            alias: "db".to_string(),
            port: 5432,
            name: "erp_test".to_string(),
            user: "erp".to_string(),
            password: "erp_password".to_string(),
            readiness_attempts: 30,
            readiness_interval_ms: 1000,
            readiness_max_interval_ms: 1000,
            readiness_backoff: BackoffStrategy::Constant,
            readiness_jitter: JitterStrategy::None,
        }
    }
}

impl DatabaseConfig {
    /// Connection string used inside the build container.
    #[must_use]
    pub fn url(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.user, self.password, self.alias, self.port, self.name
        )
    }

    /// Retry policy for the readiness poll. Defaults to a fixed one-second
    /// interval without jitter.
    #[must_use]
    pub fn readiness_policy(&self) -> RetryConfig {
        RetryConfig::new()
            .with_max_attempts(self.readiness_attempts)
            .with_base_delay_ms(self.readiness_interval_ms)
            .with_max_delay_ms(self.readiness_max_interval_ms.max(self.readiness_interval_ms))
            .with_backoff(self.readiness_backoff)
            .with_jitter(self.readiness_jitter)
    }

    /// The "accepting connections" probe command.
    #[must_use]
    pub fn readiness_probe(&self) -> Vec<String> {
        vec![
            "pg_isready".to_string(),
            "-h".to_string(),
            self.alias.clone(),
            "-p".to_string(),
            self.port.to_string(),
            "-U".to_string(),
            self.user.clone(),
        ]
    }
}

/// The module lifecycle exercised by the integration test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntegrationConfig {
    /// Cargo package of the server binary.
    pub server_package: String,
    /// Path of the built server binary, relative to the workdir.
    pub server_binary: String,
    /// Module installed first.
    pub base_module: String,
    /// Module installed, verified and uninstalled.
    pub target_module: String,
    /// Table the target module is expected to create.
    pub target_table: String,
    /// Log filter handed to the server.
    pub rust_log: String,
    /// Fail the stage when a lifecycle command fails.
    pub strict_lifecycle: bool,
}

impl Default for IntegrationConfig {
    fn default() -> Self {
        Self {
            server_package: "erp_server".to_string(),
            server_binary: "./target/release/erp-server".to_string(),
            base_module: "base".to_string(),
            target_module: "todo_list".to_string(),
            target_table: "todo_task".to_string(),
            rust_log: "info".to_string(),
            strict_lifecycle: false,
        }
    }
}

/// The Node environment that builds the frontend stylesheet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrontendConfig {
    /// Node image identifier.
    pub image: String,
    /// Static asset directory, relative to the source root. Only this
    /// subtree is mounted.
    pub static_dir: String,
    /// Working directory inside the container.
    pub workdir: String,
    /// Package cache volume.
    pub cache: CacheVolumeConfig,
    /// Stylesheet entry point, relative to the static directory.
    pub input_css: String,
    /// Minified stylesheet written by the build.
    pub output_css: String,
}

impl Default for FrontendConfig {
    fn default() -> Self {
        Self {
            image: "node:22-slim".to_string(),
            static_dir: "erp_web/static".to_string(),
            workdir: "/app".to_string(),
            cache: CacheVolumeConfig {
                name: "npm-cache".to_string(),
                path: "/app/node_modules".to_string(),
            },
            input_css: "css/input.css".to_string(),
            output_css: "css/main.css".to_string(),
        }
    }
}

/// Module tree validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// Directory holding one subdirectory per module.
    pub modules_dir: String,
    /// Manifest file name inside each module.
    pub manifest_file: String,
    /// Section header every manifest must contain.
    pub manifest_section: String,
    /// Key every manifest must declare.
    pub manifest_name_key: String,
    /// Extensions of data files a manifest may reference.
    pub data_extensions: Vec<String>,
    /// Module subdirectories holding XML that must be well-formed.
    pub xml_dirs: Vec<String>,
    /// Roots scanned by the source passes.
    pub source_roots: Vec<String>,
    /// Markers that make a formatted SQL line acceptable.
    pub safe_sql_markers: Vec<String>,
    /// Matches printed per file by the SQL pass.
    pub max_sql_matches: usize,
    /// Matches printed by the abort macro pass.
    pub max_abort_matches: usize,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            modules_dir: "modules".to_string(),
            manifest_file: "manifest.toml".to_string(),
            manifest_section: "module".to_string(),
            manifest_name_key: "name".to_string(),
            data_extensions: vec!["xml".to_string(), "csv".to_string()],
            xml_dirs: vec![
                "data".to_string(),
                "views".to_string(),
                "security".to_string(),
            ],
            source_roots: vec!["modules".to_string(), "erp_core/src".to_string()],
            safe_sql_markers: vec![
                "bind".to_string(),
                ".execute".to_string(),
                "sql_query".to_string(),
            ],
            max_sql_matches: 3,
            max_abort_matches: 5,
        }
    }
}

fn argv(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|p| (*p).to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn test_default_cache_names() {
        let config = PipelineConfig::default();
        let names: Vec<_> = config.cache.volumes.iter().map(|v| v.name.as_str()).collect();
        assert_eq!(names, vec!["cargo-registry", "cargo-git", "cargo-target"]);
    }

    #[test]
    fn test_frontend_defaults() {
        let frontend = FrontendConfig::default();
        assert_eq!(frontend.image, "node:22-slim");
        assert_eq!(frontend.static_dir, "erp_web/static");
        assert_eq!(frontend.cache.name, "npm-cache");
        assert_eq!(frontend.cache.path, "/app/node_modules");
    }

    #[test]
    fn test_volume_name_namespacing() {
        let mut cache = CacheConfig::default();
        assert_eq!(cache.volume_name("cargo-git"), "cargo-git");

        cache.namespace = Some("run42".to_string());
        assert_eq!(cache.volume_name("cargo-git"), "run42-cargo-git");
    }

    #[test]
    fn test_database_url() {
        let db = DatabaseConfig::default();
        assert_eq!(db.url(), "postgres://erp:erp_password@db:5432/erp_test");
    }

    #[test]
    fn test_readiness_policy() {
        let policy = DatabaseConfig::default().readiness_policy();
        assert_eq!(policy.max_attempts, 30);
        assert_eq!(policy.base_delay_ms, 1000);
        assert_eq!(policy.backoff_strategy, BackoffStrategy::Constant);
        assert_eq!(policy.jitter_strategy, JitterStrategy::None);
    }

    #[test]
    fn test_readiness_policy_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"database": {{"readiness_interval_ms": 200, "readiness_max_interval_ms": 5000,
                "readiness_backoff": "exponential", "readiness_jitter": "decorrelated"}}}}"#
        )
        .unwrap();

        let policy = PipelineConfig::load(file.path()).unwrap().database.readiness_policy();
        assert_eq!(policy.max_attempts, 30);
        assert_eq!(policy.base_delay_ms, 200);
        assert_eq!(policy.max_delay_ms, 5000);
        assert_eq!(policy.backoff_strategy, BackoffStrategy::Exponential);
        assert_eq!(policy.jitter_strategy, JitterStrategy::Decorrelated);
    }

    #[test]
    fn test_readiness_max_interval_never_below_base() {
        let db = DatabaseConfig {
            readiness_interval_ms: 1000,
            readiness_max_interval_ms: 10,
            ..DatabaseConfig::default()
        };
        assert_eq!(db.readiness_policy().max_delay_ms, 1000);
    }

    #[test]
    fn test_load_partial_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"integration": {{"strict_lifecycle": true}}, "cache": {{"namespace": "ci-7"}}}}"#
        )
        .unwrap();

        let config = PipelineConfig::load(file.path()).unwrap();
        assert!(config.integration.strict_lifecycle);
        assert_eq!(config.integration.target_module, "todo_list");
        assert_eq!(config.cache.namespace.as_deref(), Some("ci-7"));
        assert_eq!(config.cache.volumes.len(), 3);
    }

    #[test]
    fn test_load_rejects_bad_namespace() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"cache": {{"namespace": "a b"}}}}"#).unwrap();

        let err = PipelineConfig::load(file.path()).unwrap_err();
        assert!(matches!(err, StagegateError::Config(_)));
    }

    #[test]
    fn test_load_invalid_json_is_config_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"database": {{"port": "not a port"}}}}"#).unwrap();

        let err = PipelineConfig::load(file.path()).unwrap_err();
        assert!(matches!(err, StagegateError::Config(_)));
        assert!(err.to_string().contains("invalid config"));
    }

    #[test]
    fn test_load_missing_file() {
        let err = PipelineConfig::load(Path::new("/nonexistent/stagegate.json")).unwrap_err();
        assert!(err.to_string().contains("cannot read"));
    }
}
