//! Host source trees and their exclusion lists.

use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};

/// A directory on the host plus the subtrees that must not be mounted.
///
/// Exclusions are directory prefixes relative to the root, written with a
/// trailing slash (`target/`, `erp_web/static/node_modules/`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceTree {
    root: PathBuf,
    exclude: Vec<String>,
}

impl SourceTree {
    /// Creates a source tree rooted at `root` with no exclusions.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            exclude: Vec::new(),
        }
    }

    /// Returns a copy with the given exclusions appended.
    #[must_use]
    pub fn with_exclude<I, S>(&self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut next = self.clone();
        next.exclude.extend(patterns.into_iter().map(Into::into));
        next
    }

    /// The subdirectory `relative` as a tree of its own.
    ///
    /// Exclusions that lie inside the subdirectory are rebased onto it;
    /// the rest no longer apply and are dropped.
    #[must_use]
    pub fn subtree(&self, relative: &str) -> Self {
        let prefix: Vec<&str> = relative.split('/').filter(|p| !p.is_empty()).collect();
        let exclude = self
            .exclude
            .iter()
            .filter_map(|pattern| {
                let parts: Vec<&str> = pattern.split('/').filter(|p| !p.is_empty()).collect();
                (parts.len() > prefix.len() && parts[..prefix.len()] == prefix[..])
                    .then(|| format!("{}/", parts[prefix.len()..].join("/")))
            })
            .collect();

        Self {
            root: prefix.iter().fold(self.root.clone(), |root, part| root.join(part)),
            exclude,
        }
    }

    /// The root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The exclusion patterns.
    #[must_use]
    pub fn exclude(&self) -> &[String] {
        &self.exclude
    }

    /// Returns true if `relative` lies inside an excluded subtree.
    #[must_use]
    pub fn is_excluded(&self, relative: &Path) -> bool {
        let parts: Vec<&str> = relative
            .components()
            .filter_map(|c| match c {
                Component::Normal(part) => part.to_str(),
                _ => None,
            })
            .collect();

        self.exclude.iter().any(|pattern| {
            let prefix: Vec<&str> = pattern.split('/').filter(|p| !p.is_empty()).collect();
            !prefix.is_empty()
                && parts.len() >= prefix.len()
                && parts.iter().zip(&prefix).all(|(a, b)| a == b)
        })
    }

    /// Returns true if the absolute `path` is under the root and excluded.
    #[must_use]
    pub fn is_excluded_path(&self, path: &Path) -> bool {
        path.strip_prefix(&self.root)
            .map(|rel| self.is_excluded(rel))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree() -> SourceTree {
        SourceTree::new("/src").with_exclude(["target/", ".git/", "erp_web/static/node_modules/"])
    }

    #[test]
    fn test_excludes_top_level_dirs() {
        let tree = tree();
        assert!(tree.is_excluded(Path::new("target")));
        assert!(tree.is_excluded(Path::new("target/debug/build.rs")));
        assert!(tree.is_excluded(Path::new(".git/HEAD")));
        assert!(!tree.is_excluded(Path::new("src/target.rs")));
        assert!(!tree.is_excluded(Path::new("modules/target/manifest.toml")));
    }

    #[test]
    fn test_excludes_nested_prefix() {
        let tree = tree();
        assert!(tree.is_excluded(Path::new("erp_web/static/node_modules/x/index.js")));
        assert!(!tree.is_excluded(Path::new("erp_web/static/css/main.css")));
    }

    #[test]
    fn test_excluded_absolute_path() {
        let tree = tree();
        assert!(tree.is_excluded_path(Path::new("/src/target/release")));
        assert!(!tree.is_excluded_path(Path::new("/elsewhere/target")));
    }

    #[test]
    fn test_subtree_rebases_inner_exclusions() {
        let sub = tree().subtree("erp_web/static");

        assert_eq!(sub.root(), Path::new("/src/erp_web/static"));
        assert_eq!(sub.exclude(), ["node_modules/".to_string()]);
        assert!(sub.is_excluded(Path::new("node_modules/tailwindcss/package.json")));
        assert!(!sub.is_excluded(Path::new("css/input.css")));
    }

    #[test]
    fn test_subtree_drops_outer_exclusions() {
        let sub = tree().subtree("erp_web/static/node_modules");
        assert!(sub.exclude().is_empty());
        assert!(tree().subtree("modules").exclude().is_empty());
    }

    #[test]
    fn test_with_exclude_does_not_mutate() {
        let base = SourceTree::new("/src");
        let derived = base.with_exclude(["ci/"]);
        assert!(base.exclude().is_empty());
        assert_eq!(derived.exclude(), ["ci/".to_string()]);
    }
}
