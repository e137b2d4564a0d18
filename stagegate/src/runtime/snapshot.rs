//! Source tree snapshots.
//!
//! The container sees a copy of the source tree with excluded subtrees
//! removed, so build artifacts on the host never leak into a run.

use crate::context::SourceTree;
use crate::errors::{Result, StagegateError};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::Path;
use walkdir::WalkDir;

/// What a snapshot copied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotSummary {
    /// Regular files copied.
    pub files: usize,
    /// Total bytes copied.
    pub bytes: u64,
    /// SHA-256 over relative paths and contents, in walk order.
    pub digest: String,
}

/// Copies `tree` into `dest`, skipping excluded subtrees.
///
/// Symlinks are not followed. The digest is stable for identical trees.
pub fn snapshot_tree(tree: &SourceTree, dest: &Path) -> Result<SnapshotSummary> {
    let root = tree.root();
    if !root.is_dir() {
        return Err(StagegateError::Runtime(format!(
            "source tree {} is not a directory",
            root.display()
        )));
    }

    let mut hasher = Sha256::new();
    let mut files = 0;
    let mut bytes = 0;

    let walker = WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| !tree.is_excluded_path(entry.path()));

    for entry in walker {
        let entry = entry.map_err(|e| StagegateError::Runtime(format!("walking source: {e}")))?;
        let Ok(relative) = entry.path().strip_prefix(root) else {
            continue;
        };
        if relative.as_os_str().is_empty() {
            continue;
        }
        let target = dest.join(relative);

        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)?;
        } else if entry.file_type().is_file() {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            let contents = fs::read(entry.path())?;
            hasher.update(relative.to_string_lossy().as_bytes());
            hasher.update([0]);
            hasher.update(&contents);
            fs::write(&target, &contents)?;
            files += 1;
            bytes += contents.len() as u64;
        }
    }

    Ok(SnapshotSummary {
        files,
        bytes,
        digest: hex::encode(hasher.finalize()),
    })
}
