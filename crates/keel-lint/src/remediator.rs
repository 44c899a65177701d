//! Fix-then-format orchestration.

use std::time::Instant;

use tracing::{info, Instrument};

use keel_core::{
    elapsed_ms, emit_pipeline_finished, emit_pipeline_halted, emit_pipeline_started,
    emit_step_finished, emit_step_started, pipeline_span,
    PipelineError, Result, RunReport, StepRecord, ToolOutput, ToolRunner, WorkspaceRoot,
};

use crate::diagnostics::DiagnosticSummary;
use crate::rules::RuleSet;
use crate::snapshot::TreeSnapshot;
use crate::step::LintStep;

/// Component name used in reports and logs.
pub const COMPONENT: &str = "lint";

/// Result of a successful remediation.
#[derive(Debug, Clone)]
pub struct LintOutcome {
    pub report: RunReport,
}

impl LintOutcome {
    /// Files rewritten by `step`.
    pub fn changed_by(&self, step: LintStep) -> &[String] {
        self.report
            .steps
            .iter()
            .find(|s| s.name == step.name())
            .map(|s| s.changed_files.as_slice())
            .unwrap_or(&[])
    }

    /// Whether the run left the tree untouched.
    pub fn is_clean(&self) -> bool {
        self.report.steps.iter().all(|s| s.changed_files.is_empty())
    }
}

/// Applies the rule table with clippy's fixer, then formats.
pub struct LintRemediator<R> {
    runner: R,
    rules: RuleSet,
}

impl<R: ToolRunner> LintRemediator<R> {
    pub fn new(runner: R) -> Self {
        Self::with_rules(runner, RuleSet::standard())
    }

    pub fn with_rules(runner: R, rules: RuleSet) -> Self {
        Self { runner, rules }
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    /// Run both steps in `root`.
    pub async fn remediate(&self, root: &WorkspaceRoot) -> Result<LintOutcome> {
        let mut report = RunReport::begin(COMPONENT, &self.rules.digest());
        self.remediate_recorded(root, &mut report).await?;
        Ok(LintOutcome { report })
    }

    /// Run both steps, recording into a caller-owned report that stays
    /// valid when a step fails.
    pub async fn remediate_recorded(
        &self,
        root: &WorkspaceRoot,
        report: &mut RunReport,
    ) -> Result<()> {
        let span = pipeline_span(COMPONENT, &report.run_id);
        let started = Instant::now();

        let result = self.execute(root, report).instrument(span.clone()).await;
        let _entered = span.enter();
        if let Err(err) = &result {
            let at = report.steps.last().map_or("start", |s| s.name.as_str());
            emit_pipeline_halted(COMPONENT, at, err);
        }

        let duration_ms = elapsed_ms(started);
        report.finish(result.is_ok(), duration_ms);
        emit_pipeline_finished(COMPONENT, duration_ms, result.is_ok());
        result
    }

    async fn execute(&self, root: &WorkspaceRoot, report: &mut RunReport) -> Result<()> {
        report.definition_digest = self.rules.digest();
        emit_pipeline_started(COMPONENT, &report.definition_digest);

        for step in LintStep::ORDER {
            let output = self.run_step(step, root, report).await?;
            if !output.passed() {
                return Err(step_failure(step, &output));
            }
        }
        Ok(())
    }

    async fn run_step(
        &self,
        step: LintStep,
        root: &WorkspaceRoot,
        report: &mut RunReport,
    ) -> Result<ToolOutput> {
        let invocation = step.invocation(root, &self.rules);
        let before = TreeSnapshot::capture(root)?;

        emit_step_started(step.name(), &invocation.command_line());
        let output = self.runner.run(&invocation).await?;
        emit_step_finished(step.name(), output.exit_code, output.duration_ms);

        let after = TreeSnapshot::capture(root)?;
        let mut record = StepRecord::from_output(step.name(), &invocation, &output);
        record.changed_files = before.changed_since(&after);
        info!(
            step = step.name(),
            files = after.len(),
            changed = record.changed_files.len(),
            "step changed files"
        );
        report.push(record);
        Ok(output)
    }
}

fn step_failure(step: LintStep, output: &ToolOutput) -> PipelineError {
    match step {
        LintStep::Fix => {
            let summary = DiagnosticSummary::parse(&output.stderr);
            let diagnostics = output.stderr.trim_end();
            PipelineError::UnfixableLint {
                errors: summary.errors,
                first: summary
                    .first
                    .unwrap_or_else(|| output.failure_summary()),
                diagnostics: if diagnostics.is_empty() {
                    output.failure_summary()
                } else {
                    diagnostics.to_string()
                },
            }
        }
        LintStep::Format => PipelineError::Formatter(output.failure_summary()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keel_core::fakes::failed;

    #[test]
    fn test_fix_failure_is_unfixable_lint() {
        let out = failed(101, "error: used `dbg!` macro\nerror: could not compile `a`\n");
        match step_failure(LintStep::Fix, &out) {
            PipelineError::UnfixableLint {
                errors,
                first,
                diagnostics,
            } => {
                assert_eq!(errors, 1);
                assert_eq!(first, "error: used `dbg!` macro");
                assert!(diagnostics.ends_with("could not compile `a`"));
            }
            other => panic!("unexpected {other}"),
        }
    }

    #[test]
    fn test_fix_failure_without_diagnostics_keeps_stderr() {
        let out = failed(1, "toolchain 'nightly' is not installed");
        let err = step_failure(LintStep::Fix, &out);
        assert!(err.to_string().contains("not installed"));
    }

    #[test]
    fn test_format_failure() {
        let out = failed(1, "rustfmt: parse error");
        assert!(matches!(
            step_failure(LintStep::Format, &out),
            PipelineError::Formatter(_)
        ));
    }
}
