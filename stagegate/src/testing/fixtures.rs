//! On-disk fixtures for validation and snapshot tests.

use crate::context::SourceTree;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

/// A temporary source tree, removed on drop.
///
/// Fixture helpers panic on I/O failure; they exist for tests.
#[derive(Debug)]
pub struct ModuleTreeFixture {
    dir: TempDir,
}

impl ModuleTreeFixture {
    /// Creates a tree with an empty `modules/` directory.
    ///
    /// # Panics
    ///
    /// Panics if the temporary directory cannot be created.
    #[must_use]
    pub fn new() -> Self {
        let fixture = Self::empty();
        fs::create_dir_all(fixture.root().join("modules")).expect("create modules dir");
        fixture
    }

    /// Creates a tree with nothing in it.
    ///
    /// # Panics
    ///
    /// Panics if the temporary directory cannot be created.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            dir: tempfile::tempdir().expect("create fixture dir"),
        }
    }

    /// Adds a module with a valid manifest and one data file.
    #[must_use]
    pub fn with_module(self, name: &str) -> Self {
        self.write(
            &format!("modules/{name}/manifest.toml"),
            &format!("[module]\nname = \"{name}\"\nversion = \"0.1.0\"\ndata = [\"data/{name}_data.xml\"]\n"),
        );
        self.write(
            &format!("modules/{name}/data/{name}_data.xml"),
            &format!("<?xml version=\"1.0\"?>\n<data>\n  <record id=\"{name}_root\" model=\"ir.module\"/>\n</data>\n"),
        );
        self
    }

    /// Writes `contents` to `relative`, creating parent directories.
    ///
    /// # Panics
    ///
    /// Panics if the file cannot be written.
    pub fn write(&self, relative: &str, contents: &str) {
        let path = self.root().join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create fixture parent");
        }
        fs::write(&path, contents).expect("write fixture file");
    }

    /// Root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// The tree as a source with no exclusions.
    #[must_use]
    pub fn tree(&self) -> SourceTree {
        SourceTree::new(self.root())
    }
}

impl Default for ModuleTreeFixture {
    fn default() -> Self {
        Self::new()
    }
}
