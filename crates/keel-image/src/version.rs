//! Version tags derived from source control.
//!
//! The tag is resolved with `git describe --tags` before anything is built and
//! is compiled into the server as a `VERSION` constant. There is no fallback:
//! a checkout without reachable tags cannot produce a release.

use serde::{Deserialize, Serialize};
use std::fmt;

use keel_core::{PipelineError, Result, ToolInvocation, ToolRunner, WorkspaceRoot};

/// Output of `git describe --tags`, e.g. `0.17.2-14-g3c0ffee`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionTag(String);

impl VersionTag {
    /// Validate a describe string.
    ///
    /// The value ends up inside a shell command and a Rust string literal, so
    /// only `[A-Za-z0-9._+/-]` is accepted.
    pub fn parse(raw: &str) -> Result<Self> {
        let value = raw.trim();
        if value.is_empty() {
            return Err(PipelineError::VersionResolution(
                "git describe returned no output".to_string(),
            ));
        }
        if value.lines().count() > 1 {
            return Err(PipelineError::VersionResolution(format!(
                "git describe returned multiple lines: {value:?}"
            )));
        }
        if let Some(bad) = value
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '+' | '/' | '-')))
        {
            return Err(PipelineError::VersionResolution(format!(
                "version {value:?} contains unsupported character {bad:?}"
            )));
        }
        Ok(Self(value.to_string()))
    }

    /// Resolve the version of the tree at `root`.
    pub async fn resolve(runner: &dyn ToolRunner, root: &WorkspaceRoot) -> Result<Self> {
        let invocation = describe_invocation(root);
        let output = runner.run(&invocation).await?;
        if !output.passed() {
            return Err(PipelineError::VersionResolution(format!(
                "`{}` failed (shallow or tagless checkout?): {}",
                invocation.command_line(),
                output.failure_summary()
            )));
        }
        Self::parse(output.stdout_trimmed())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Rust source of the generated version module.
    pub fn rust_source(&self) -> String {
        format!("pub const VERSION: &str = \"{}\";", self.0)
    }
}

impl fmt::Display for VersionTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// `git describe --tags` in the workspace root.
pub fn describe_invocation(root: &WorkspaceRoot) -> ToolInvocation {
    ToolInvocation::new("git", root.path()).args(["describe", "--tags"])
}

#[cfg(test)]
mod tests {
    use super::*;
    use keel_core::fakes::{failed, ok, ScriptedRunner};
    use std::path::Path;
    use std::process::Command;

    fn run_git(repo_dir: &Path, args: &[&str]) {
        let output = Command::new("git")
            .args(args)
            .current_dir(repo_dir)
            .output()
            .unwrap();
        assert!(
            output.status.success(),
            "git {:?} failed: {}",
            args,
            String::from_utf8_lossy(&output.stderr)
        );
    }

    fn make_git_repo() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("Cargo.toml"), "[workspace]\n").unwrap();
        run_git(dir.path(), &["init", "-q"]);
        run_git(dir.path(), &["config", "user.name", "test-user"]);
        run_git(dir.path(), &["config", "user.email", "test@example.com"]);
        run_git(dir.path(), &["config", "commit.gpgsign", "false"]);
        run_git(dir.path(), &["config", "tag.gpgsign", "false"]);
        run_git(dir.path(), &["commit", "-q", "--allow-empty", "-m", "initial"]);
        dir
    }

    #[test]
    fn test_parse_describe_output() {
        let tag = VersionTag::parse("0.17.2-14-g3c0ffee\n").unwrap();
        assert_eq!(tag.as_str(), "0.17.2-14-g3c0ffee");
        assert_eq!(
            tag.rust_source(),
            "pub const VERSION: &str = \"0.17.2-14-g3c0ffee\";"
        );
    }

    #[test]
    fn test_parse_rejects_malformed() {
        for raw in ["", "  \n", "v1\nv2", "v1\"; rm -rf /", "v1 beta", "v1'x"] {
            let err = VersionTag::parse(raw).unwrap_err();
            assert!(
                matches!(err, PipelineError::VersionResolution(_)),
                "expected version error for {raw:?}"
            );
        }
    }

    #[tokio::test]
    async fn test_resolve_uses_describe_in_root() {
        let repo = make_git_repo();
        let root = WorkspaceRoot::discover(repo.path()).unwrap();
        let runner = ScriptedRunner::new().respond("git", &["describe"], ok("v0.1.0\n"));

        let tag = VersionTag::resolve(&runner, &root).await.unwrap();
        assert_eq!(tag.as_str(), "v0.1.0");

        let calls = runner.calls_to("git");
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].args, vec!["describe", "--tags"]);
        assert_eq!(calls[0].current_dir, root.path());
    }

    #[tokio::test]
    async fn test_resolve_failure_is_version_error() {
        let repo = make_git_repo();
        let root = WorkspaceRoot::discover(repo.path()).unwrap();
        let runner = ScriptedRunner::new().respond(
            "git",
            &["describe"],
            failed(128, "fatal: No names found, cannot describe anything."),
        );

        let err = VersionTag::resolve(&runner, &root).await.unwrap_err();
        match err {
            PipelineError::VersionResolution(msg) => assert!(msg.contains("No names found")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_real_git_tagless_repo_fails() {
        let repo = make_git_repo();
        let root = WorkspaceRoot::discover(repo.path()).unwrap();
        let err = VersionTag::resolve(&keel_core::ProcessRunner::new(), &root)
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::VersionResolution(_)));
    }

    #[tokio::test]
    async fn test_real_git_tagged_repo_resolves() {
        let repo = make_git_repo();
        run_git(repo.path(), &["tag", "0.17.0"]);
        run_git(repo.path(), &["commit", "-q", "--allow-empty", "-m", "next"]);
        let root = WorkspaceRoot::discover(repo.path()).unwrap();

        let tag = VersionTag::resolve(&keel_core::ProcessRunner::new(), &root)
            .await
            .unwrap();
        assert!(tag.as_str().starts_with("0.17.0-1-g"), "got {tag}");
    }
}
