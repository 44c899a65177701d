//! Content snapshots of the workspace's Rust sources.
//!
//! Taken around each remediation step so the report can say which files a
//! step rewrote.

use std::collections::BTreeMap;
use std::io;
use std::path::Path;

use walkdir::{DirEntry, WalkDir};

use keel_core::{sha256_hex, Result, WorkspaceRoot};

const SKIPPED_DIRS: &[&str] = &["target", ".git"];

/// SHA-256 of every `*.rs` file, keyed by `/`-separated path relative to the root.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TreeSnapshot {
    files: BTreeMap<String, String>,
}

impl TreeSnapshot {
    pub fn capture(root: &WorkspaceRoot) -> Result<Self> {
        let mut files = BTreeMap::new();
        let walker = WalkDir::new(root.path())
            .follow_links(false)
            .into_iter()
            .filter_entry(|e| !is_skipped(e));

        for entry in walker {
            let entry = entry.map_err(io::Error::from)?;
            if !entry.file_type().is_file() || !is_rust_source(entry.path()) {
                continue;
            }
            let rel = entry
                .path()
                .strip_prefix(root.path())
                .unwrap_or(entry.path());
            let content = std::fs::read(entry.path())?;
            files.insert(relative_key(rel), sha256_hex(&content));
        }
        Ok(Self { files })
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Files added, removed or modified between `self` and `after`, sorted.
    pub fn changed_since(&self, after: &TreeSnapshot) -> Vec<String> {
        let mut changed: Vec<String> = after
            .files
            .iter()
            .filter(|(path, digest)| self.files.get(*path) != Some(*digest))
            .map(|(path, _)| path.clone())
            .collect();
        changed.extend(
            self.files
                .keys()
                .filter(|path| !after.files.contains_key(*path))
                .cloned(),
        );
        changed.sort();
        changed
    }
}

fn is_skipped(entry: &DirEntry) -> bool {
    entry.depth() > 0
        && entry.file_type().is_dir()
        && entry
            .file_name()
            .to_str()
            .is_some_and(|name| SKIPPED_DIRS.contains(&name))
}

fn is_rust_source(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "rs")
}

fn relative_key(rel: &Path) -> String {
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
