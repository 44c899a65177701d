//! Keel Image - staged release image builder
//!
//! Produces the lemmy_server runtime image:
//! - Resolves the release version from `git describe --tags`
//! - Plans a typed multi-stage recipe and renders it as a Dockerfile
//! - Builds one stage per state, so a failure is attributed to its stage
//! - Verifies the tagged image runs unprivileged on the expected port

pub mod builder;
pub mod context;
pub mod image_ref;
pub mod inspect;
pub mod recipe;
pub mod stages;
pub mod state;
pub mod version;

// Re-export key types
pub use builder::{build_invocation, ReleaseBuilder, ReleaseOutcome, COMPONENT};
pub use context::{
    BuildContext, ReleaseLayout, RuntimeUser, BUILDER_IMAGE_ARG, DEFAULT_BUILDER_IMAGE,
    DEFAULT_RUNTIME_IMAGE, SERVER_PORT,
};
pub use image_ref::ImageRef;
pub use inspect::ImageConfig;
pub use recipe::{Instruction, Recipe, Stage, StageBase};
pub use stages::{CompiledArtifact, ReleasePlan, RuntimeImage};
pub use state::{BuildProgress, BuildState};
pub use version::VersionTag;
