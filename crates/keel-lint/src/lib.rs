//! Keel Lint - workspace lint remediation
//!
//! Runs clippy's fixer under a fixed rule table, then the nightly formatter,
//! and records which files each step rewrote.

pub mod diagnostics;
pub mod remediator;
pub mod rules;
pub mod snapshot;
pub mod step;

// Re-export key types
pub use diagnostics::DiagnosticSummary;
pub use remediator::{LintOutcome, LintRemediator, COMPONENT};
pub use rules::{LintLevel, LintRule, RuleSet};
pub use snapshot::TreeSnapshot;
pub use step::LintStep;
