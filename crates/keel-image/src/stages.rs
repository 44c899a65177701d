//! Stage planning for the release image.
//!
//! Compilation stages end in a [`CompiledArtifact`]; the runtime stages are
//! planned from that value alone and never see the compilation filesystem.

use serde::{Deserialize, Serialize};

use crate::context::{BuildContext, ReleaseLayout, RuntimeUser, BUILDER_IMAGE_ARG};
use crate::recipe::{BuildArg, Instruction, Recipe, Stage, StageBase};
use crate::state::BuildState;
use crate::version::VersionTag;

pub const TOOLCHAIN_STAGE: &str = "toolchain";
pub const SOURCE_STAGE: &str = "source";
pub const STAMPED_STAGE: &str = "stamped";
pub const COMPILED_STAGE: &str = "compiled";
pub const ARTIFACT_STAGE: &str = "artifact";
pub const RUNTIME_BASE_STAGE: &str = "runtime-base";
pub const OWNED_STAGE: &str = "owned";
pub const RUNTIME_STAGE: &str = "runtime";

/// The single binary produced by compilation, as seen by later stages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompiledArtifact {
    /// Stage that holds the binary.
    pub stage: String,
    /// Absolute path of the binary inside that stage.
    pub path: String,
}

/// What the finished image looks like.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeImage {
    /// Tag applied to the final stage; empty until the image is built.
    pub tag: String,
    pub version: VersionTag,
    /// Path of the artifact inside the image.
    pub install_path: String,
    pub user: RuntimeUser,
    pub port: u16,
    /// Default command.
    pub command: Vec<String>,
}

/// Install OS packages without recommends and drop the apt lists.
fn apt_install(packages: &[String]) -> Instruction {
    Instruction::Run(format!(
        "apt-get update && apt-get install -y --no-install-recommends {} && rm -rf /var/lib/apt/lists/*",
        packages.join(" ")
    ))
}

/// Plan the compilation stages.
///
/// The version constant is written in its own stage, after the source copy
/// and before the compile stage, so it is compiled in rather than injected.
pub fn plan_compile(
    layout: &ReleaseLayout,
    version: &VersionTag,
) -> (Vec<Stage>, CompiledArtifact) {
    let artifact_path = layout.artifact_path();

    let stages = vec![
        Stage {
            name: TOOLCHAIN_STAGE.to_string(),
            base: StageBase::Arg(BUILDER_IMAGE_ARG.to_string()),
            instructions: vec![apt_install(&layout.build_packages)],
            reaches: BuildState::DependenciesInstalled,
        },
        Stage {
            name: SOURCE_STAGE.to_string(),
            base: StageBase::Stage(TOOLCHAIN_STAGE.to_string()),
            instructions: vec![
                Instruction::Workdir(layout.build_dir.clone()),
                Instruction::Copy {
                    src: ".".to_string(),
                    dest: ".".to_string(),
                },
            ],
            reaches: BuildState::SourceCopied,
        },
        Stage {
            name: STAMPED_STAGE.to_string(),
            base: StageBase::Stage(SOURCE_STAGE.to_string()),
            instructions: vec![Instruction::Run(format!(
                "echo '{}' > {}",
                version.rust_source(),
                layout.version_file
            ))],
            reaches: BuildState::VersionStamped,
        },
        Stage {
            name: COMPILED_STAGE.to_string(),
            base: StageBase::Stage(STAMPED_STAGE.to_string()),
            instructions: vec![Instruction::Run(
                "cargo build --release --workspace".to_string(),
            )],
            reaches: BuildState::Compiled,
        },
        Stage {
            name: ARTIFACT_STAGE.to_string(),
            base: StageBase::Stage(COMPILED_STAGE.to_string()),
            instructions: vec![Instruction::Run(format!(
                "cp ./target/release/{} {artifact_path}",
                layout.binary_name
            ))],
            reaches: BuildState::ArtifactExtracted,
        },
    ];

    let artifact = CompiledArtifact {
        stage: ARTIFACT_STAGE.to_string(),
        path: artifact_path,
    };
    (stages, artifact)
}

/// Plan the runtime stages from the compiled artifact.
pub fn plan_runtime(
    layout: &ReleaseLayout,
    artifact: &CompiledArtifact,
    version: &VersionTag,
) -> (Vec<Stage>, RuntimeImage) {
    let user = &layout.user;
    let command = vec![layout.install_path.clone()];

    let stages = vec![
        Stage {
            name: RUNTIME_BASE_STAGE.to_string(),
            base: StageBase::Image(layout.runtime_image.to_string()),
            instructions: vec![
                apt_install(&layout.runtime_packages),
                Instruction::Run(format!(
                    "groupadd -g {gid} {name} && useradd -M -u {uid} -g {gid} -s /usr/sbin/nologin {name}",
                    gid = user.gid,
                    uid = user.uid,
                    name = user.name
                )),
            ],
            reaches: BuildState::RuntimeAssembled,
        },
        Stage {
            name: OWNED_STAGE.to_string(),
            base: StageBase::Stage(RUNTIME_BASE_STAGE.to_string()),
            instructions: vec![Instruction::CopyFrom {
                stage: artifact.stage.clone(),
                src: artifact.path.clone(),
                dest: layout.install_path.clone(),
                chown: Some(user.numeric()),
            }],
            reaches: BuildState::OwnershipFixed,
        },
        Stage {
            name: RUNTIME_STAGE.to_string(),
            base: StageBase::Stage(OWNED_STAGE.to_string()),
            instructions: vec![
                Instruction::User(user.numeric()),
                Instruction::Expose {
                    port: layout.port,
                    protocol: "tcp".to_string(),
                },
                Instruction::Cmd(command.clone()),
            ],
            reaches: BuildState::Ready,
        },
    ];

    let image = RuntimeImage {
        tag: String::new(),
        version: version.clone(),
        install_path: layout.install_path.clone(),
        user: user.clone(),
        port: layout.port,
        command,
    };
    (stages, image)
}

/// A fully planned release: recipe plus the values it hands between stages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleasePlan {
    pub version: VersionTag,
    pub recipe: Recipe,
    pub artifact: CompiledArtifact,
    pub image: RuntimeImage,
}

impl ReleasePlan {
    /// Assemble and validate the complete recipe.
    ///
    /// The context's builder image becomes the default of the builder `ARG`,
    /// so a rendered Dockerfile reproduces the build on its own.
    pub fn new(
        ctx: &BuildContext,
        layout: &ReleaseLayout,
        version: VersionTag,
    ) -> keel_core::Result<Self> {
        layout.validate()?;

        let (mut stages, artifact) = plan_compile(layout, &version);
        let (runtime, image) = plan_runtime(layout, &artifact, &version);
        stages.extend(runtime);

        let recipe = Recipe {
            args: vec![BuildArg {
                name: BUILDER_IMAGE_ARG.to_string(),
                default: ctx.builder_image().to_string(),
            }],
            stages,
        };
        recipe.validate()?;

        Ok(Self {
            version,
            recipe,
            artifact,
            image,
        })
    }

    pub fn dockerfile(&self) -> String {
        self.recipe.render()
    }
}
