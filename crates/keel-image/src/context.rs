//! Build inputs: the per-invocation context and the fixed release layout.

use serde::{Deserialize, Serialize};
use std::path::Path;

use keel_core::{PipelineError, Result, WorkspaceRoot};

use crate::image_ref::ImageRef;

/// Default builder image: compiler toolchain at a fixed version on a minimal base.
pub const DEFAULT_BUILDER_IMAGE: &str = "rust:1.81-slim-bookworm";

/// Default runtime base image. Must share the builder's libc.
pub const DEFAULT_RUNTIME_IMAGE: &str = "debian:bookworm-slim";

/// Dockerfile `ARG` carrying the builder image reference.
pub const BUILDER_IMAGE_ARG: &str = "RUST_BUILDER_IMAGE";

/// Port the packaged server listens on.
pub const SERVER_PORT: u16 = 8536;

/// Inputs consumed by a single build invocation.
#[derive(Debug, Clone)]
pub struct BuildContext {
    root: WorkspaceRoot,
    builder_image: ImageRef,
}

impl BuildContext {
    /// Create a context for `root`.
    ///
    /// `builder_image` of `None` selects [`DEFAULT_BUILDER_IMAGE`]; an empty or
    /// malformed reference is a configuration error.
    pub fn new(root: WorkspaceRoot, builder_image: Option<&str>) -> Result<Self> {
        let builder_image = builder_image.unwrap_or(DEFAULT_BUILDER_IMAGE).parse()?;
        Ok(Self {
            root,
            builder_image,
        })
    }

    pub fn root(&self) -> &WorkspaceRoot {
        &self.root
    }

    pub fn builder_image(&self) -> &ImageRef {
        &self.builder_image
    }
}

/// The non-privileged user the server runs as.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeUser {
    pub name: String,
    pub uid: u32,
    pub gid: u32,
}

impl RuntimeUser {
    /// `uid:gid` form used for `USER` and `--chown`.
    pub fn numeric(&self) -> String {
        format!("{}:{}", self.uid, self.gid)
    }
}

impl Default for RuntimeUser {
    fn default() -> Self {
        Self {
            name: "lemmy".to_string(),
            uid: 1000,
            gid: 1000,
        }
    }
}

/// Fixed shape of the release image.
///
/// Only the builder image is operator-controlled; everything here is part of
/// the release definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReleaseLayout {
    /// Base image of the runtime stages.
    pub runtime_image: ImageRef,

    /// OS packages needed to link the server.
    pub build_packages: Vec<String>,

    /// OS packages needed to run the server.
    pub runtime_packages: Vec<String>,

    /// Working directory inside the build stages.
    pub build_dir: String,

    /// Name of the binary cargo produces.
    pub binary_name: String,

    /// Source file the version constant is written to, relative to the workspace.
    pub version_file: String,

    /// Path of the artifact inside the runtime image.
    pub install_path: String,

    pub user: RuntimeUser,

    pub port: u16,
}

impl ReleaseLayout {
    /// Where the compile stages leave the artifact for the runtime stages.
    pub fn artifact_path(&self) -> String {
        format!("{}/{}", self.build_dir.trim_end_matches('/'), self.binary_name)
    }

    /// Reject layouts that would run as root or escape the build directory.
    pub fn validate(&self) -> Result<()> {
        if self.user.uid == 0 || self.user.gid == 0 {
            return Err(PipelineError::Configuration(
                "runtime user must not be root".to_string(),
            ));
        }
        if self.binary_name.is_empty() || self.binary_name.contains('/') {
            return Err(PipelineError::Configuration(format!(
                "binary name '{}' is not a plain file name",
                self.binary_name
            )));
        }
        let version_file = Path::new(&self.version_file);
        if version_file.is_absolute()
            || version_file
                .components()
                .any(|c| matches!(c, std::path::Component::ParentDir))
        {
            return Err(PipelineError::Configuration(format!(
                "version file '{}' must be relative to the workspace",
                self.version_file
            )));
        }
        if !self.install_path.starts_with('/') || !self.build_dir.starts_with('/') {
            return Err(PipelineError::Configuration(
                "build directory and install path must be absolute".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for ReleaseLayout {
    fn default() -> Self {
        let strings = |items: &[&str]| -> Vec<String> { items.iter().map(|s| s.to_string()).collect() };
        Self {
            runtime_image: ImageRef::from_parts("debian", "bookworm-slim"),
            build_packages: strings(&["libpq-dev", "libssl-dev", "pkg-config"]),
            runtime_packages: strings(&["libpq5", "libssl3", "ca-certificates", "postgresql-client"]),
            build_dir: "/app".to_string(),
            binary_name: "lemmy_server".to_string(),
            version_file: "crates/utils/src/version.rs".to_string(),
            install_path: "/app/lemmy".to_string(),
            user: RuntimeUser::default(),
            port: SERVER_PORT,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn root() -> (tempfile::TempDir, WorkspaceRoot) {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("Cargo.toml"), "[workspace]\n").unwrap();
        let root = WorkspaceRoot::discover(dir.path()).unwrap();
        (dir, root)
    }

    #[test]
    fn test_default_builder_image() {
        let (_dir, root) = root();
        let ctx = BuildContext::new(root, None).unwrap();
        assert_eq!(ctx.builder_image().to_string(), DEFAULT_BUILDER_IMAGE);
    }

    #[test]
    fn test_override_builder_image() {
        let (_dir, root) = root();
        let ctx = BuildContext::new(root, Some("ghcr.io/cross-rs/aarch64:0.2.5")).unwrap();
        assert_eq!(ctx.builder_image().repository(), "ghcr.io/cross-rs/aarch64");
    }

    #[test]
    fn test_empty_builder_image_is_configuration_error() {
        let (_dir, root) = root();
        let err = BuildContext::new(root, Some("")).unwrap_err();
        assert!(matches!(err, PipelineError::Configuration(_)));
    }

    #[test]
    fn test_default_layout() {
        let layout = ReleaseLayout::default();
        layout.validate().unwrap();
        assert_eq!(layout.artifact_path(), "/app/lemmy_server");
        assert_eq!(layout.user.numeric(), "1000:1000");
        assert_eq!(layout.port, 8536);
        assert_eq!(layout.runtime_image.to_string(), DEFAULT_RUNTIME_IMAGE);
    }

    #[test]
    fn test_root_user_rejected() {
        let mut layout = ReleaseLayout::default();
        layout.user.uid = 0;
        assert!(layout.validate().is_err());
    }

    #[test]
    fn test_escaping_version_file_rejected() {
        let mut layout = ReleaseLayout::default();
        layout.version_file = "../outside.rs".to_string();
        assert!(layout.validate().is_err());
    }
}
