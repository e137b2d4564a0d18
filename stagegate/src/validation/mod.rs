//! Static validation of the module tree.
//!
//! Five passes run in a fixed order over `<root>/modules` (and the extra
//! source roots for the Rust passes). Each pass prints a progress line and
//! its findings into a [`ValidationReport`]; errors fail validation,
//! warnings are reported only.

mod abort_macros;
mod duplicates;
mod manifest;
mod report;
mod sql;
mod xml;

pub use report::{CheckId, Finding, Severity, ValidationReport};
pub use xml::check_well_formed;

use crate::config::ValidationConfig;
use crate::context::SourceTree;
use crate::errors::{Result, StagegateError};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;

/// Runs the five validation passes.
#[derive(Debug, Clone, Default)]
pub struct ModuleValidator {
    config: ValidationConfig,
}

impl ModuleValidator {
    /// Creates a validator.
    #[must_use]
    pub fn new(config: ValidationConfig) -> Self {
        Self { config }
    }

    /// Validates `tree`, honouring its exclusion list.
    ///
    /// A tree without a modules directory validates cleanly.
    pub fn validate(&self, tree: &SourceTree) -> Result<ValidationReport> {
        let modules = ModuleTree::scan(tree, &self.config)?;
        let mut report = ValidationReport::new();
        report.line("=== Module Lint ===");

        for (index, check) in CheckId::ALL.into_iter().enumerate() {
            report.line(format!("[{}/{}] {}", index + 1, CheckId::ALL.len(), check.title()));
            let before = (report.errors(), report.warnings());
            match check {
                CheckId::Manifest => manifest::check(&modules, &mut report)?,
                CheckId::XmlWellFormed => xml::check(&modules, &mut report)?,
                CheckId::DuplicateIds => duplicates::check(&modules, &mut report)?,
                CheckId::UnsafeSql => sql::check(&modules, &mut report)?,
                CheckId::AbortMacros => abort_macros::check(&modules, &mut report)?,
            }
            debug!(
                check = ?check,
                errors = report.errors() - before.0,
                warnings = report.warnings() - before.1,
                "Validation pass finished"
            );
        }

        report.line("");
        report.line("=== Module Lint Complete ===");
        report.line(format!(
            "Errors: {}, Warnings: {}",
            report.errors(),
            report.warnings()
        ));

        info!(
            modules = modules.modules().len(),
            errors = report.errors(),
            warnings = report.warnings(),
            "Module validation complete"
        );
        Ok(report)
    }
}

/// The modules under validation and the helpers the passes share.
pub(crate) struct ModuleTree<'a> {
    tree: &'a SourceTree,
    config: &'a ValidationConfig,
    modules: Vec<PathBuf>,
}

impl<'a> ModuleTree<'a> {
    fn scan(tree: &'a SourceTree, config: &'a ValidationConfig) -> Result<Self> {
        let dir = tree.root().join(&config.modules_dir);
        let mut modules = Vec::new();

        if dir.is_dir() {
            for entry in std::fs::read_dir(&dir)? {
                let path = entry?.path();
                if path.is_dir() && !tree.is_excluded_path(&path) {
                    modules.push(path);
                }
            }
        } else {
            debug!(path = %dir.display(), "No modules directory, nothing to validate");
        }

        modules.sort();
        Ok(Self {
            tree,
            config,
            modules,
        })
    }

    pub(crate) fn config(&self) -> &ValidationConfig {
        self.config
    }

    /// Module directories, sorted by name.
    pub(crate) fn modules(&self) -> &[PathBuf] {
        &self.modules
    }

    /// `path` relative to the tree root, with forward slashes.
    pub(crate) fn display(&self, path: &Path) -> String {
        let rel = path.strip_prefix(self.tree.root()).unwrap_or(path);
        rel.to_string_lossy().replace('\\', "/")
    }

    /// Files under `dir` with the given extension, recursively and sorted.
    pub(crate) fn files_with_extension(&self, dir: &Path, extension: &str) -> Vec<PathBuf> {
        WalkDir::new(dir)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| !self.tree.is_excluded_path(e.path()))
            .filter_map(std::result::Result::ok)
            .filter(|e| e.file_type().is_file())
            .map(walkdir::DirEntry::into_path)
            .filter(|p| p.extension().and_then(|x| x.to_str()) == Some(extension))
            .collect()
    }

    /// Rust files under every configured source root.
    pub(crate) fn rust_sources(&self) -> Vec<PathBuf> {
        self.config
            .source_roots
            .iter()
            .map(|root| self.tree.root().join(root))
            .filter(|dir| dir.is_dir())
            .flat_map(|dir| self.files_with_extension(&dir, "rs"))
            .collect()
    }
}

/// Reads a file as text, replacing invalid UTF-8.
pub(crate) fn read_text(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Compiles a pattern built at runtime from configuration.
pub(crate) fn compile(pattern: &str) -> Result<regex::Regex> {
    regex::Regex::new(pattern)
        .map_err(|e| StagegateError::Config(format!("invalid validation pattern {pattern:?}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ModuleTreeFixture;
    use pretty_assertions::assert_eq;

    fn validate(fixture: &ModuleTreeFixture) -> ValidationReport {
        ModuleValidator::default()
            .validate(&fixture.tree())
            .unwrap()
    }

    #[test]
    fn test_clean_tree_passes() {
        let fixture = ModuleTreeFixture::new().with_module("todo_list");
        let report = validate(&fixture);

        assert!(report.success());
        assert_eq!(report.errors(), 0);
        assert_eq!(report.warnings(), 0);
        assert_eq!(report.lines().last().unwrap(), "Errors: 0, Warnings: 0");
    }

    #[test]
    fn test_pass_headers_in_order() {
        let report = validate(&ModuleTreeFixture::new());
        let headers: Vec<_> = report
            .lines()
            .iter()
            .filter(|l| l.starts_with('['))
            .cloned()
            .collect();

        assert_eq!(
            headers,
            vec![
                "[1/5] Checking module manifests...",
                "[2/5] Checking XML data files...",
                "[3/5] Checking for duplicate record IDs...",
                "[4/5] Checking for unsafe SQL patterns...",
                "[5/5] Checking for panic patterns...",
            ]
        );
    }

    #[test]
    fn test_missing_modules_dir_is_clean() {
        let fixture = ModuleTreeFixture::empty();
        let report = validate(&fixture);
        assert!(report.success());
        assert!(report.transcript().ends_with("=== Module Lint Complete ===\nErrors: 0, Warnings: 0\n"));
    }

    #[test]
    fn test_manifest_without_name_fails() {
        let fixture = ModuleTreeFixture::new().with_module("sales");
        fixture.write("modules/sales/manifest.toml", "[module]\nversion = \"1.0\"\n");

        let report = validate(&fixture);
        assert_eq!(report.errors(), 1);
        assert!(!report.success());
        assert!(report
            .lines()
            .contains(&"ERROR: modules/sales/manifest.toml missing 'name' key".to_string()));
    }

    #[test]
    fn test_duplicate_ids_only_warn() {
        let fixture = ModuleTreeFixture::new().with_module("sales");
        fixture.write(
            "modules/sales/data/records.xml",
            "<data><record id=\"a\"/><record id=\"a\"/></data>",
        );

        let report = validate(&fixture);
        assert_eq!(report.warnings(), 1);
        assert_eq!(report.errors(), 0);
        assert!(report.success());
    }

    #[test]
    fn test_excluded_module_is_skipped() {
        let fixture = ModuleTreeFixture::new().with_module("broken");
        fixture.write("modules/broken/manifest.toml", "nothing here\n");

        let tree = fixture.tree().with_exclude(["modules/broken/"]);
        let report = ModuleValidator::default().validate(&tree).unwrap();
        assert!(report.success());
    }
}
