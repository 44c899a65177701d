//! Keel - release image builder and lint remediator CLI
//!
//! ## Commands
//!
//! - `release build`: build and tag the lemmy_server runtime image
//! - `release render`: print the Dockerfile a build would use
//! - `lint fix`: apply the clippy rule table, then format
//! - `lint rules`: show the rule table and its digest

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::{debug, info, Level};

use keel_core::{ProcessRunner, RunReport, ToolRunner, WorkspaceRoot};
use keel_image::{BuildContext, BuildProgress, ReleaseBuilder, BUILDER_IMAGE_ARG};
use keel_lint::{LintRemediator, LintStep, RuleSet};

/// Tag applied when `--tag` is not given.
const DEFAULT_TAG: &str = "lemmy:dev";

/// Every keel manifest names this crate; used to step over keel's own workspace.
const TOOL_CRATE: &str = "keel-core";

#[derive(Parser)]
#[command(name = "keel")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Release image builder and lint remediator", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the release image
    Release {
        #[command(subcommand)]
        action: ReleaseAction,
    },

    /// Remediate lint violations in the workspace
    Lint {
        #[command(subcommand)]
        action: LintAction,
    },
}

#[derive(Subcommand)]
enum ReleaseAction {
    /// Build and tag the runtime image
    Build {
        /// Builder image reference (compiler toolchain)
        #[arg(long, env = BUILDER_IMAGE_ARG)]
        builder_image: Option<String>,

        /// Tag for the final image
        #[arg(short, long, default_value = DEFAULT_TAG)]
        tag: String,

        /// Workspace root (default: the workspace keel is checked out in)
        #[arg(short, long)]
        workspace: Option<PathBuf>,

        /// Write a JSON run report to this path
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Print the Dockerfile without building
    Render {
        /// Builder image reference (compiler toolchain)
        #[arg(long, env = BUILDER_IMAGE_ARG)]
        builder_image: Option<String>,

        /// Workspace root (default: the workspace keel is checked out in)
        #[arg(short, long)]
        workspace: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum LintAction {
    /// Run clippy --fix under the rule table, then cargo +nightly fmt
    Fix {
        /// Workspace root (default: the workspace keel is checked out in)
        #[arg(short, long)]
        workspace: Option<PathBuf>,

        /// Write a JSON run report to this path
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// List the rule table
    Rules,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    keel_core::init_tracing(cli.json, level);

    let runner = ProcessRunner::new();
    match cli.command {
        Commands::Release { action } => match action {
            ReleaseAction::Build {
                builder_image,
                tag,
                workspace,
                report,
            } => {
                let root = resolve_workspace(workspace.as_deref())?;
                cmd_release_build(
                    runner,
                    root,
                    builder_image.as_deref(),
                    &tag,
                    report.as_deref(),
                )
                .await
            }
            ReleaseAction::Render {
                builder_image,
                workspace,
            } => {
                let root = resolve_workspace(workspace.as_deref())?;
                let dockerfile =
                    cmd_release_render(runner, root, builder_image.as_deref()).await?;
                print!("{dockerfile}");
                Ok(())
            }
        },
        Commands::Lint { action } => match action {
            LintAction::Fix { workspace, report } => {
                let root = resolve_workspace(workspace.as_deref())?;
                cmd_lint_fix(runner, &root, report.as_deref()).await
            }
            LintAction::Rules => cmd_lint_rules(cli.json),
        },
    }
}

/// The explicit `--workspace`, or the workspace found from the binary's
/// location, then from the current directory.
fn resolve_workspace(explicit: Option<&Path>) -> Result<WorkspaceRoot> {
    if let Some(path) = explicit {
        return WorkspaceRoot::discover(path)
            .with_context(|| format!("Failed to resolve workspace from {}", path.display()));
    }

    let mut starts = Vec::new();
    let exe = std::env::current_exe().ok();
    if let Some(dir) = exe.as_deref().and_then(Path::parent) {
        starts.push(dir.to_path_buf());
    }
    starts.push(std::env::current_dir().context("Failed to read the current directory")?);
    discover_target(&starts)
}

/// First workspace other than keel's own, trying `starts` in order.
fn discover_target(starts: &[PathBuf]) -> Result<WorkspaceRoot> {
    let mut last_err = None;
    for start in starts {
        match WorkspaceRoot::discover_skipping(start, TOOL_CRATE) {
            Ok(root) => {
                debug!(start = %start.display(), root = %root.path().display(), "resolved workspace");
                return Ok(root);
            }
            Err(err) => last_err = Some(err),
        }
    }
    match last_err {
        Some(err) => Err(err).context("No target workspace found; pass --workspace"),
        None => anyhow::bail!("No directory to resolve the workspace from"),
    }
}

fn write_report(report: &RunReport, path: Option<&Path>) -> Result<()> {
    if let Some(path) = path {
        report
            .write_json(path)
            .with_context(|| format!("Failed to write report to {}", path.display()))?;
        info!(path = %path.display(), "wrote run report");
    }
    Ok(())
}

async fn cmd_release_build<R: ToolRunner>(
    runner: R,
    root: WorkspaceRoot,
    builder_image: Option<&str>,
    tag: &str,
    report_path: Option<&Path>,
) -> Result<()> {
    let ctx = BuildContext::new(root, builder_image).context("Invalid build context")?;
    let builder = ReleaseBuilder::new(runner);

    println!("Building release image for workspace: {}", ctx.root().path().display());
    println!("Builder image: {}", ctx.builder_image());
    println!();

    let mut report = RunReport::begin(keel_image::COMPONENT, "");
    let mut progress = BuildProgress::new();
    let result = builder
        .build_recorded(&ctx, tag, &mut report, &mut progress)
        .await;
    write_report(&report, report_path)?;

    let image = result.with_context(|| format!("Release build stopped at {}", progress.current()))?;

    println!("Run ID: {}", report.run_id);
    println!("Image: {}", image.tag);
    println!("Version: {}", image.version);
    println!("User: {} ({})", image.user.name, image.user.numeric());
    println!("Port: {}/tcp", image.port);
    println!(
        "Steps: {} passed, {} failed",
        report.passed_count(),
        report.failed_count()
    );
    println!("Duration: {}ms", report.duration_ms);
    Ok(())
}

async fn cmd_release_render<R: ToolRunner>(
    runner: R,
    root: WorkspaceRoot,
    builder_image: Option<&str>,
) -> Result<String> {
    let ctx = BuildContext::new(root, builder_image).context("Invalid build context")?;
    let plan = ReleaseBuilder::new(runner)
        .plan(&ctx)
        .await
        .context("Failed to plan release")?;
    Ok(plan.dockerfile())
}

async fn cmd_lint_fix<R: ToolRunner>(
    runner: R,
    root: &WorkspaceRoot,
    report_path: Option<&Path>,
) -> Result<()> {
    let remediator = LintRemediator::new(runner);
    println!("Remediating workspace: {}", root.path().display());
    println!("Rule set: {} rules ({})", remediator.rules().len(), remediator.rules().digest());
    println!();

    let mut report = RunReport::begin(keel_lint::COMPONENT, &remediator.rules().digest());
    let result = remediator.remediate_recorded(root, &mut report).await;
    write_report(&report, report_path)?;
    result.context("Lint remediation failed")?;

    for step in LintStep::ORDER {
        let Some(record) = report.steps.iter().find(|s| s.name == step.name()) else {
            continue;
        };
        println!(
            "  ✓ {} ({}ms, {} files changed)",
            record.name,
            record.duration_ms,
            record.changed_files.len()
        );
        for file in &record.changed_files {
            println!("      {file}");
        }
    }
    Ok(())
}

fn cmd_lint_rules(json: bool) -> Result<()> {
    let rules = RuleSet::standard();
    if json {
        println!("{}", serde_json::to_string_pretty(&rules)?);
        return Ok(());
    }
    for rule in rules.rules() {
        println!("{:<6} {}", rule.level.name(), rule.name);
    }
    println!();
    println!("digest: {}", rules.digest());
    Ok(())
}
