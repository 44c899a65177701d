//! Workspace root resolution.
//!
//! Pipelines never rely on the process working directory. The root is found
//! once, from an explicit starting point, and passed into every invocation.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{PipelineError, Result};

/// Absolute path of a cargo workspace root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspaceRoot(PathBuf);

impl WorkspaceRoot {
    /// Find the workspace containing `start`.
    ///
    /// Walks up from `start` and returns the nearest ancestor whose
    /// `Cargo.toml` has a `workspace` table. A lone package manifest is
    /// accepted when no workspace manifest exists above it.
    pub fn discover(start: &Path) -> Result<Self> {
        discover_with(start, None)
    }

    /// Like [`discover`](Self::discover), but step over manifests that belong
    /// to the tool itself.
    ///
    /// A manifest belongs to the tool when it is the `tool_crate` package or
    /// depends on it, directly or through `[workspace.dependencies]`. This
    /// finds the workspace keel is checked out in, not keel's own.
    pub fn discover_skipping(start: &Path, tool_crate: &str) -> Result<Self> {
        discover_with(start, Some(tool_crate))
    }

    pub fn path(&self) -> &Path {
        &self.0
    }

    pub fn join(&self, relative: impl AsRef<Path>) -> PathBuf {
        self.0.join(relative)
    }
}

fn discover_with(start: &Path, skip: Option<&str>) -> Result<WorkspaceRoot> {
    let start = start.canonicalize().map_err(|e| {
        PipelineError::Configuration(format!(
            "workspace start {} is not accessible: {e}",
            start.display()
        ))
    })?;

    let mut package_root = None;
    for dir in start.ancestors() {
        let manifest = dir.join("Cargo.toml");
        if !manifest.is_file() {
            continue;
        }
        let doc = read_manifest(&manifest)?;
        if skip.is_some_and(|tool| belongs_to(&doc, tool)) {
            continue;
        }
        if doc.contains_key("workspace") {
            return Ok(WorkspaceRoot(dir.to_path_buf()));
        }
        if package_root.is_none() && doc.contains_key("package") {
            package_root = Some(dir.to_path_buf());
        }
    }

    package_root.map(WorkspaceRoot).ok_or_else(|| {
        PipelineError::Configuration(format!(
            "no Cargo.toml found at or above {}",
            start.display()
        ))
    })
}

fn read_manifest(manifest: &Path) -> Result<toml::Table> {
    let content = fs::read_to_string(manifest)?;
    content.parse::<toml::Table>().map_err(|e| {
        PipelineError::Configuration(format!("{} is not valid TOML: {e}", manifest.display()))
    })
}

fn belongs_to(doc: &toml::Table, tool: &str) -> bool {
    let table = |path: &[&str]| {
        path.iter()
            .try_fold(doc, |t, key| t.get(*key).and_then(toml::Value::as_table))
    };
    let is_tool = table(&["package"])
        .and_then(|p| p.get("name"))
        .and_then(toml::Value::as_str)
        == Some(tool);
    let depends = table(&["dependencies"]).is_some_and(|d| d.contains_key(tool));
    let shares = table(&["workspace", "dependencies"]).is_some_and(|d| d.contains_key(tool));
    is_tool || depends || shares
}
