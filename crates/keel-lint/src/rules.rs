//! The clippy rule table.

use serde::{Deserialize, Serialize};
use std::fmt;

use keel_core::ordered_digest;

/// Whether a rule is promoted to an error or silenced.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum LintLevel {
    /// `-D <rule>`
    Deny,
    /// `-A <rule>`
    Allow,
}

impl LintLevel {
    pub fn flag(&self) -> &'static str {
        match self {
            LintLevel::Deny => "-D",
            LintLevel::Allow => "-A",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            LintLevel::Deny => "deny",
            LintLevel::Allow => "allow",
        }
    }
}

/// One entry of the rule table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LintRule {
    pub level: LintLevel,
    /// Lint or lint group, e.g. `clippy::wildcard_imports`.
    pub name: String,
}

impl LintRule {
    pub fn deny(name: &str) -> Self {
        Self {
            level: LintLevel::Deny,
            name: name.to_string(),
        }
    }

    pub fn allow(name: &str) -> Self {
        Self {
            level: LintLevel::Allow,
            name: name.to_string(),
        }
    }
}

impl fmt::Display for LintRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.level.flag(), self.name)
    }
}

const DENIED: &[&str] = &[
    "warnings",
    "deprecated",
    "clippy::perf",
    "clippy::complexity",
    "clippy::style",
    "clippy::correctness",
    "clippy::suspicious",
    "clippy::dbg_macro",
    "clippy::inefficient_to_string",
    "clippy::items_after_statements",
    "clippy::implicit_clone",
    "clippy::wildcard_imports",
    "clippy::cast_lossless",
    "clippy::manual_string_new",
    "clippy::redundant_closure_for_method_calls",
    "clippy::unused_self",
];

const ALLOWED: &[&str] = &["clippy::uninlined_format_args"];

/// Ordered rule table passed to clippy after `--`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RuleSet {
    rules: Vec<LintRule>,
}

impl RuleSet {
    /// The workspace rule table. Order is preserved on the command line.
    pub fn standard() -> Self {
        let rules = DENIED
            .iter()
            .map(|name| LintRule::deny(name))
            .chain(ALLOWED.iter().map(|name| LintRule::allow(name)))
            .collect();
        Self { rules }
    }

    pub fn rules(&self) -> &[LintRule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Arguments for the clippy driver: `-D warnings -D deprecated ... -A ...`.
    pub fn args(&self) -> Vec<String> {
        self.rules
            .iter()
            .flat_map(|rule| [rule.level.flag().to_string(), rule.name.clone()])
            .collect()
    }

    /// Stable digest of the table, order included.
    pub fn digest(&self) -> String {
        ordered_digest(self.rules.iter().map(ToString::to_string))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_table_order() {
        let rules = RuleSet::standard();
        assert_eq!(rules.len(), 17);
        assert_eq!(rules.rules()[0], LintRule::deny("warnings"));
        assert_eq!(
            rules.rules().last(),
            Some(&LintRule::allow("clippy::uninlined_format_args"))
        );
        let denied = rules
            .rules()
            .iter()
            .filter(|r| r.level == LintLevel::Deny)
            .count();
        assert_eq!(denied, 16);
    }

    #[test]
    fn test_args_pair_flag_and_rule() {
        let args = RuleSet::standard().args();
        assert_eq!(&args[..4], ["-D", "warnings", "-D", "deprecated"]);
        assert_eq!(
            &args[args.len() - 2..],
            ["-A", "clippy::uninlined_format_args"]
        );
        let at = args
            .iter()
            .position(|a| a == "clippy::wildcard_imports")
            .unwrap();
        assert_eq!(args[at - 1], "-D");
    }

    #[test]
    fn test_digest_is_stable_and_order_sensitive() {
        let standard = RuleSet::standard();
        assert_eq!(standard.digest(), RuleSet::standard().digest());
        assert_eq!(standard.digest().len(), 64);

        let mut reversed = standard.clone();
        reversed.rules.reverse();
        assert_ne!(standard.digest(), reversed.digest());
    }
}
