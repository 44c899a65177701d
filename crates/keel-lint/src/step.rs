//! The two remediation steps and their invocations.

use serde::{Deserialize, Serialize};

use keel_core::{ToolInvocation, WorkspaceRoot};

use crate::rules::RuleSet;

/// Remediation steps, in execution order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum LintStep {
    /// cargo clippy --workspace --fix ... -- <rules>
    Fix,

    /// cargo +nightly fmt
    Format,
}

impl LintStep {
    pub const ORDER: [LintStep; 2] = [LintStep::Fix, LintStep::Format];

    pub fn name(&self) -> &'static str {
        match self {
            LintStep::Fix => "fix",
            LintStep::Format => "format",
        }
    }

    /// Invocation of this step in `root`.
    pub fn invocation(&self, root: &WorkspaceRoot, rules: &RuleSet) -> ToolInvocation {
        let cargo = ToolInvocation::new("cargo", root.path());
        match self {
            LintStep::Fix => cargo
                .args([
                    "clippy",
                    "--workspace",
                    "--fix",
                    "--allow-staged",
                    "--allow-dirty",
                    "--tests",
                    "--all-targets",
                    "--all-features",
                    "--",
                ])
                .args(rules.args()),
            // Toolchain is selected explicitly, never through an override file.
            LintStep::Format => cargo.args(["+nightly", "fmt"]),
        }
    }
}
