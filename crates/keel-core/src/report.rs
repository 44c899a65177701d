//! Run reports.
//!
//! A [`RunReport`] is the JSON record of one pipeline invocation, written when
//! the operator passes `--report`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use uuid::Uuid;

use crate::error::Result;
use crate::process::{ToolInvocation, ToolOutput};

/// Record of a single tool step.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StepRecord {
    /// Step name (e.g. "fix", "stage:compiled").
    pub name: String,

    /// Rendered command line.
    pub command: String,

    /// Exit code (0 = success).
    pub exit_code: i32,

    /// Duration in milliseconds.
    pub duration_ms: u64,

    /// Files changed by this step, when the pipeline tracks them.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub changed_files: Vec<String>,
}

impl StepRecord {
    pub fn from_output(name: &str, invocation: &ToolInvocation, output: &ToolOutput) -> Self {
        Self {
            name: name.to_string(),
            command: invocation.command_line(),
            exit_code: output.exit_code,
            duration_ms: output.duration_ms,
            changed_files: Vec::new(),
        }
    }

    pub fn passed(&self) -> bool {
        self.exit_code == 0
    }
}

/// Result of a complete pipeline invocation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunReport {
    /// Unique run id.
    pub run_id: String,

    /// "release" or "lint".
    pub component: String,

    /// When the run started.
    pub started_at: DateTime<Utc>,

    /// Digest of the pipeline definition (rendered Dockerfile or rule set).
    pub definition_digest: String,

    /// Steps in execution order.
    pub steps: Vec<StepRecord>,

    /// Whether every step passed.
    pub success: bool,

    /// Total duration in milliseconds.
    pub duration_ms: u64,
}

impl RunReport {
    /// Start a report for `component`.
    pub fn begin(component: &str, definition_digest: &str) -> Self {
        Self {
            run_id: Uuid::new_v4().to_string(),
            component: component.to_string(),
            started_at: Utc::now(),
            definition_digest: definition_digest.to_string(),
            steps: Vec::new(),
            success: false,
            duration_ms: 0,
        }
    }

    pub fn push(&mut self, step: StepRecord) {
        self.steps.push(step);
    }

    /// Mark the run finished.
    pub fn finish(&mut self, success: bool, duration_ms: u64) {
        self.success = success && self.steps.iter().all(StepRecord::passed);
        self.duration_ms = duration_ms;
    }

    /// Number of steps that passed.
    pub fn passed_count(&self) -> usize {
        self.steps.iter().filter(|s| s.passed()).count()
    }

    /// Number of steps that failed.
    pub fn failed_count(&self) -> usize {
        self.steps.iter().filter(|s| !s.passed()).count()
    }

    /// Write the report as pretty JSON.
    pub fn write_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}
