//! External tool invocation.
//!
//! Every call to `docker`, `git` or `cargo` goes through the [`ToolRunner`]
//! trait so pipelines can be driven by [`crate::fakes::ScriptedRunner`] in
//! tests. [`ProcessRunner`] is the real implementation on `tokio::process`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Instant;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tracing::debug;

use crate::error::{PipelineError, Result};

/// A fully specified external command.
///
/// The working directory is always explicit; nothing depends on the
/// process-wide current directory.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ToolInvocation {
    /// Executable name or path.
    pub program: String,

    /// Arguments, excluding the program.
    pub args: Vec<String>,

    /// Directory the command runs in.
    pub current_dir: PathBuf,
}

impl ToolInvocation {
    /// Create an invocation of `program` running in `current_dir`.
    pub fn new(program: impl Into<String>, current_dir: &Path) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            current_dir: current_dir.to_path_buf(),
        }
    }

    /// Append a single argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append multiple arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Add a path as an argument.
    pub fn arg_path(mut self, path: &Path) -> Self {
        self.args.push(path.to_string_lossy().into_owned());
        self
    }

    /// Render the command line for logs and reports.
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Captured outcome of a finished tool invocation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ToolOutput {
    /// Exit code (-1 when terminated by a signal).
    pub exit_code: i32,

    /// Captured stdout.
    pub stdout: String,

    /// Captured stderr.
    pub stderr: String,

    /// Duration in milliseconds.
    pub duration_ms: u64,
}

impl ToolOutput {
    /// Whether the tool exited with status 0.
    pub fn passed(&self) -> bool {
        self.exit_code == 0
    }

    pub fn stdout_trimmed(&self) -> &str {
        self.stdout.trim()
    }

    /// Short failure description: exit code plus the last stderr lines.
    pub fn failure_summary(&self) -> String {
        let tail: Vec<&str> = self
            .stderr
            .lines()
            .rev()
            .filter(|l| !l.trim().is_empty())
            .take(5)
            .collect();
        if tail.is_empty() {
            format!("exit code {}", self.exit_code)
        } else {
            let tail: Vec<&str> = tail.into_iter().rev().collect();
            format!("exit code {}:\n{}", self.exit_code, tail.join("\n"))
        }
    }
}

/// Seam for executing external tools.
#[async_trait]
pub trait ToolRunner: Send + Sync {
    /// Run the invocation to completion.
    ///
    /// A non-zero exit is returned as a [`ToolOutput`], not an error; callers
    /// classify failures. Errors are reserved for tools that cannot start.
    async fn run(&self, invocation: &ToolInvocation) -> Result<ToolOutput>;
}

/// Runs tools as child processes with captured output.
///
/// Stderr is also echoed line by line to our own stderr as it arrives, so the
/// operator sees build logs and compiler diagnostics live.
#[derive(Debug, Clone, Copy)]
pub struct ProcessRunner {
    echo_stderr: bool,
}

impl ProcessRunner {
    pub fn new() -> Self {
        Self { echo_stderr: true }
    }

    /// Capture stderr without echoing it.
    pub fn quiet() -> Self {
        Self { echo_stderr: false }
    }
}

impl Default for ProcessRunner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ToolRunner for ProcessRunner {
    async fn run(&self, invocation: &ToolInvocation) -> Result<ToolOutput> {
        let start = Instant::now();
        debug!(command = %invocation.command_line(), dir = %invocation.current_dir.display(), "spawning tool");

        let mut child = Command::new(&invocation.program)
            .args(&invocation.args)
            .current_dir(&invocation.current_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| PipelineError::ToolUnavailable {
                program: invocation.program.clone(),
                source,
            })?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let read_stdout = async {
            let mut buf = Vec::new();
            if let Some(mut stdout) = stdout {
                stdout.read_to_end(&mut buf).await?;
            }
            Ok::<_, std::io::Error>(buf)
        };
        let read_stderr = async {
            let mut captured = Vec::new();
            if let Some(stderr) = stderr {
                let mut reader = BufReader::new(stderr);
                let mut line = Vec::new();
                while reader.read_until(b'\n', &mut line).await? > 0 {
                    if self.echo_stderr {
                        let mut out = tokio::io::stderr();
                        out.write_all(&line).await?;
                        out.flush().await?;
                    }
                    captured.append(&mut line);
                }
            }
            Ok::<_, std::io::Error>(captured)
        };

        let (stdout, stderr, status) = tokio::try_join!(read_stdout, read_stderr, child.wait())?;

        Ok(ToolOutput {
            exit_code: status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&stdout).into_owned(),
            stderr: String::from_utf8_lossy(&stderr).into_owned(),
            duration_ms: elapsed_ms(start),
        })
    }
}

/// Milliseconds since `start`, saturating.
pub fn elapsed_ms(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output(exit_code: i32, stderr: &str) -> ToolOutput {
        ToolOutput {
            exit_code,
            stdout: String::new(),
            stderr: stderr.to_string(),
            duration_ms: 1,
        }
    }

    #[test]
    fn test_command_line_rendering() {
        let inv = ToolInvocation::new("git", Path::new("/src"))
            .arg("describe")
            .args(["--tag"]);
        assert_eq!(inv.command_line(), "git describe --tag");
        assert_eq!(inv.current_dir, PathBuf::from("/src"));
    }

    #[test]
    fn test_failure_summary_keeps_stderr_tail() {
        let out = output(101, "line1\nline2\n\nerror: could not compile\n");
        let summary = out.failure_summary();
        assert!(summary.starts_with("exit code 101"));
        assert!(summary.contains("could not compile"));
        assert!(!out.passed());
    }

    #[test]
    fn test_failure_summary_without_stderr() {
        assert_eq!(output(2, "  \n").failure_summary(), "exit code 2");
    }

    #[tokio::test]
    async fn test_process_runner_captures_stdout() {
        let dir = tempfile::tempdir().unwrap();
        let inv = ToolInvocation::new("echo", dir.path()).arg("hello");
        let out = ProcessRunner::new().run(&inv).await.expect("echo failed");
        assert!(out.passed());
        assert_eq!(out.stdout_trimmed(), "hello");
    }

    #[tokio::test]
    async fn test_process_runner_reports_non_zero_exit() {
        let dir = tempfile::tempdir().unwrap();
        let inv = ToolInvocation::new("false", dir.path());
        let out = ProcessRunner::new().run(&inv).await.expect("false failed to spawn");
        assert!(!out.passed());
        assert_ne!(out.exit_code, 0);
    }

    #[tokio::test]
    async fn test_process_runner_captures_all_stderr_lines() {
        let dir = tempfile::tempdir().unwrap();
        let inv = ToolInvocation::new("sh", dir.path()).args([
            "-c",
            "echo 'error: first' >&2; echo '  --> app/src/main.rs:1:13' >&2; printf 'no newline' >&2; exit 3",
        ]);
        let out = ProcessRunner::quiet().run(&inv).await.unwrap();
        assert_eq!(out.exit_code, 3);
        assert_eq!(
            out.stderr,
            "error: first\n  --> app/src/main.rs:1:13\nno newline"
        );
    }

    #[test]
    fn test_elapsed_ms_is_small_for_now() {
        assert!(elapsed_ms(Instant::now()) < 1_000);
    }

    #[tokio::test]
    async fn test_process_runner_missing_program() {
        let dir = tempfile::tempdir().unwrap();
        let inv = ToolInvocation::new("keel-definitely-not-installed", dir.path());
        let err = ProcessRunner::new().run(&inv).await.unwrap_err();
        assert!(matches!(err, PipelineError::ToolUnavailable { .. }));
    }
}
