//! Structured observability hooks for keel pipeline runs.
//!
//! This module provides:
//! - Run-scoped tracing spans via [`pipeline_span`]
//! - Emission functions for lifecycle events: start, step start/finish,
//!   state transitions, finish
//!
//! Events are emitted at `info!` level; filter with `RUST_LOG`.

use tracing::info;

/// Span tagged with the component and run id.
///
/// Attach it to the pipeline future so every event carries both fields:
///
/// ```ignore
/// use tracing::Instrument;
/// pipeline.run().instrument(pipeline_span("release", &run_id)).await
/// ```
pub fn pipeline_span(component: &str, run_id: &str) -> tracing::Span {
    tracing::info_span!("keel.pipeline", component = %component, run_id = %run_id)
}

/// Emit event: pipeline started.
pub fn emit_pipeline_started(component: &str, definition_digest: &str) {
    info!(event = "pipeline.started", component = %component, digest = %definition_digest);
}

/// Emit event: a tool step is about to run.
pub fn emit_step_started(step: &str, command: &str) {
    info!(event = "step.started", step = %step, command = %command);
}

/// Emit event: a tool step finished.
pub fn emit_step_finished(step: &str, exit_code: i32, duration_ms: u64) {
    info!(
        event = "step.finished",
        step = %step,
        exit_code = exit_code,
        duration_ms = duration_ms,
    );
}

/// Emit event: build state machine advanced.
pub fn emit_state_advanced(from: &str, to: &str) {
    info!(event = "state.advanced", from = %from, to = %to);
}

/// Emit event: pipeline finished.
pub fn emit_pipeline_finished(component: &str, duration_ms: u64, success: bool) {
    info!(
        event = "pipeline.finished",
        component = %component,
        duration_ms = duration_ms,
        success = success,
    );
}

/// Emit event: pipeline halted (warning level).
pub fn emit_pipeline_halted(component: &str, at: &str, error: &dyn std::fmt::Display) {
    tracing::warn!(event = "pipeline.halted", component = %component, at = %at, error = %error);
}
