//! Release build orchestration.

use std::io::Write as _;
use std::path::Path;
use std::time::Instant;

use tempfile::NamedTempFile;
use tracing::{info, warn, Instrument};

use keel_core::{
    elapsed_ms, emit_pipeline_finished, emit_pipeline_halted, emit_pipeline_started,
    emit_step_finished, emit_step_started, pipeline_span,
    PipelineError, Result, RunReport, StepRecord, ToolInvocation, ToolOutput, ToolRunner,
};

use crate::context::{BuildContext, ReleaseLayout, BUILDER_IMAGE_ARG};
use crate::image_ref::ImageRef;
use crate::inspect::{inspect_invocation, ImageConfig};
use crate::recipe::Stage;
use crate::stages::{ReleasePlan, RuntimeImage};
use crate::state::{BuildProgress, BuildState};
use crate::version::VersionTag;

/// Component name used in reports and logs.
pub const COMPONENT: &str = "release";

/// Result of a successful build.
#[derive(Debug, Clone)]
pub struct ReleaseOutcome {
    pub image: RuntimeImage,
    pub report: RunReport,
    /// States visited, `Start` through `Ready`.
    pub states: Vec<BuildState>,
}

/// Staged release image builder.
pub struct ReleaseBuilder<R> {
    runner: R,
    layout: ReleaseLayout,
}

impl<R: ToolRunner> ReleaseBuilder<R> {
    pub fn new(runner: R) -> Self {
        Self::with_layout(runner, ReleaseLayout::default())
    }

    pub fn with_layout(runner: R, layout: ReleaseLayout) -> Self {
        Self { runner, layout }
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    pub fn layout(&self) -> &ReleaseLayout {
        &self.layout
    }

    /// Resolve the version and plan the recipe without building anything.
    pub async fn plan(&self, ctx: &BuildContext) -> Result<ReleasePlan> {
        let version = VersionTag::resolve(&self.runner, ctx.root()).await?;
        info!(version = %version, builder_image = %ctx.builder_image(), "resolved release version");
        ReleasePlan::new(ctx, &self.layout, version)
    }

    /// Build and tag the release image.
    pub async fn build(&self, ctx: &BuildContext, tag: &str) -> Result<ReleaseOutcome> {
        let mut report = RunReport::begin(COMPONENT, "");
        let mut progress = BuildProgress::new();
        let image = self
            .build_recorded(ctx, tag, &mut report, &mut progress)
            .await?;
        Ok(ReleaseOutcome {
            image,
            report,
            states: progress.history().to_vec(),
        })
    }

    /// Build while recording into caller-owned report and progress.
    ///
    /// Both stay valid when the build fails, so callers can persist the
    /// report of a failed run.
    pub async fn build_recorded(
        &self,
        ctx: &BuildContext,
        tag: &str,
        report: &mut RunReport,
        progress: &mut BuildProgress,
    ) -> Result<RuntimeImage> {
        let span = pipeline_span(COMPONENT, &report.run_id);
        let started = Instant::now();

        let result = self
            .execute(ctx, tag, report, progress)
            .instrument(span.clone())
            .await;
        let _entered = span.enter();
        if let Err(err) = &result {
            emit_pipeline_halted(COMPONENT, progress.current().name(), err);
        }

        let duration_ms = elapsed_ms(started);
        report.finish(result.is_ok(), duration_ms);
        emit_pipeline_finished(COMPONENT, duration_ms, result.is_ok());
        result
    }

    async fn execute(
        &self,
        ctx: &BuildContext,
        tag: &str,
        report: &mut RunReport,
        progress: &mut BuildProgress,
    ) -> Result<RuntimeImage> {
        tag.parse::<ImageRef>()
            .map_err(|e| PipelineError::Configuration(format!("invalid image tag: {e}")))?;

        // Version resolution fails here, before any docker invocation.
        let plan = self.plan(ctx).await?;
        report.definition_digest = plan.recipe.digest();
        emit_pipeline_started(COMPONENT, &report.definition_digest);

        if !ctx.root().join(".dockerignore").is_file() {
            warn!(root = %ctx.root().path().display(), "no .dockerignore; target/ will be sent to the docker daemon");
        }

        let dockerfile = write_dockerfile(&plan)?;

        for stage in &plan.recipe.stages {
            let final_tag = stage.reaches.is_terminal().then_some(tag);
            let invocation = build_invocation(ctx, dockerfile.path(), &stage.name, final_tag);
            let output = self.run_step(&format!("stage:{}", stage.name), &invocation, report).await?;
            if !output.passed() {
                return Err(classify_failure(stage, &output));
            }
            progress.advance(stage.reaches)?;
        }

        let invocation = inspect_invocation(ctx.root(), tag);
        let output = self.run_step("inspect", &invocation, report).await?;
        let verified = if output.passed() {
            ImageConfig::from_json(&output.stdout).and_then(|config| config.verify(&plan.image))
        } else {
            Err(PipelineError::ImageVerification(format!(
                "could not inspect {tag}: {}",
                output.failure_summary()
            )))
        };
        if let Err(err) = verified {
            self.untag(ctx, tag).await;
            return Err(err);
        }

        info!(tag = %tag, version = %plan.version, "release image ready");
        let mut image = plan.image;
        image.tag = tag.to_string();
        Ok(image)
    }

    async fn run_step(
        &self,
        name: &str,
        invocation: &ToolInvocation,
        report: &mut RunReport,
    ) -> Result<ToolOutput> {
        emit_step_started(name, &invocation.command_line());
        let output = self.runner.run(invocation).await?;
        emit_step_finished(name, output.exit_code, output.duration_ms);
        report.push(StepRecord::from_output(name, invocation, &output));
        Ok(output)
    }

    /// Remove a tag that failed verification so no unusable image stays tagged.
    async fn untag(&self, ctx: &BuildContext, tag: &str) {
        let invocation = ToolInvocation::new("docker", ctx.root().path()).args(["image", "rm", tag]);
        match self.runner.run(&invocation).await {
            Ok(output) if output.passed() => info!(tag = %tag, "removed unverified image tag"),
            Ok(output) => warn!(tag = %tag, error = %output.failure_summary(), "failed to remove unverified image tag"),
            Err(err) => warn!(tag = %tag, error = %err, "failed to remove unverified image tag"),
        }
    }
}

/// `docker build` of a single stage. Only the final stage is tagged.
pub fn build_invocation(
    ctx: &BuildContext,
    dockerfile: &Path,
    target: &str,
    tag: Option<&str>,
) -> ToolInvocation {
    let mut invocation = ToolInvocation::new("docker", ctx.root().path())
        .arg("build")
        .arg("--file")
        .arg_path(dockerfile)
        .args(["--target", target])
        .arg("--build-arg")
        .arg(format!("{BUILDER_IMAGE_ARG}={}", ctx.builder_image()));
    if let Some(tag) = tag {
        invocation = invocation.args(["--tag", tag]);
    }
    invocation.arg_path(ctx.root().path())
}

/// Map a failed stage build to the error for the state it was meant to reach.
fn classify_failure(stage: &Stage, output: &ToolOutput) -> PipelineError {
    let detail = output.failure_summary();
    match stage.reaches {
        BuildState::DependenciesInstalled | BuildState::RuntimeAssembled => {
            PipelineError::DependencyInstall {
                stage: stage.name.clone(),
                detail,
            }
        }
        BuildState::VersionStamped => PipelineError::VersionResolution(format!(
            "could not write version constant in stage '{}': {detail}",
            stage.name
        )),
        BuildState::Compiled | BuildState::ArtifactExtracted => {
            PipelineError::Compilation(format!("stage '{}': {detail}", stage.name))
        }
        BuildState::Start
        | BuildState::SourceCopied
        | BuildState::OwnershipFixed
        | BuildState::Ready => PipelineError::ImageAssembly {
            stage: stage.name.clone(),
            detail,
        },
    }
}

fn write_dockerfile(plan: &ReleasePlan) -> Result<NamedTempFile> {
    let mut file = tempfile::Builder::new()
        .prefix("keel-")
        .suffix(".Dockerfile")
        .tempfile()?;
    file.write_all(plan.dockerfile().as_bytes())?;
    file.flush()?;
    Ok(file)
}

#[cfg(test)]
mod tests {
    use super::*;
    use keel_core::fakes::failed;

    fn stage(reaches: BuildState) -> Stage {
        Stage {
            name: "s".to_string(),
            base: crate::recipe::StageBase::Image("debian:bookworm-slim".to_string()),
            instructions: Vec::new(),
            reaches,
        }
    }

    #[test]
    fn test_failure_classification() {
        let out = failed(1, "boom");
        assert!(matches!(
            classify_failure(&stage(BuildState::DependenciesInstalled), &out),
            PipelineError::DependencyInstall { .. }
        ));
        assert!(matches!(
            classify_failure(&stage(BuildState::RuntimeAssembled), &out),
            PipelineError::DependencyInstall { .. }
        ));
        assert!(matches!(
            classify_failure(&stage(BuildState::VersionStamped), &out),
            PipelineError::VersionResolution(_)
        ));
        assert!(matches!(
            classify_failure(&stage(BuildState::Compiled), &out),
            PipelineError::Compilation(_)
        ));
        assert!(matches!(
            classify_failure(&stage(BuildState::ArtifactExtracted), &out),
            PipelineError::Compilation(_)
        ));
        assert!(matches!(
            classify_failure(&stage(BuildState::OwnershipFixed), &out),
            PipelineError::ImageAssembly { .. }
        ));
    }
}
