//! Keel Core - shared plumbing for keel pipelines
//!
//! Provides:
//! - The `ToolRunner` seam and a `tokio::process` implementation
//! - The pipeline error taxonomy
//! - Workspace root resolution
//! - Tracing setup and structured lifecycle events
//! - Digests and JSON run reports

pub mod digest;
pub mod error;
pub mod fakes;
pub mod obs;
pub mod process;
pub mod report;
pub mod telemetry;
pub mod workspace;

pub use digest::{ordered_digest, sha256_hex};
pub use error::{PipelineError, Result};
pub use obs::{
    emit_pipeline_finished, emit_pipeline_halted, emit_pipeline_started, emit_state_advanced,
    emit_step_finished, emit_step_started, pipeline_span,
};
pub use process::{elapsed_ms, ProcessRunner, ToolInvocation, ToolOutput, ToolRunner};
pub use report::{RunReport, StepRecord};
pub use telemetry::init_tracing;
pub use workspace::WorkspaceRoot;
