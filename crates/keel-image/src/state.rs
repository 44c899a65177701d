//! Build state machine.
//!
//! A build walks the states strictly in order. Any failure leaves the
//! progress at the last state reached; there is no resumption.

use serde::{Deserialize, Serialize};
use std::fmt;

use keel_core::{emit_state_advanced, PipelineError, Result};

/// States of a single build invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildState {
    Start,
    DependenciesInstalled,
    SourceCopied,
    VersionStamped,
    Compiled,
    ArtifactExtracted,
    RuntimeAssembled,
    OwnershipFixed,
    Ready,
}

impl BuildState {
    /// Every state, in order.
    pub const ALL: [BuildState; 9] = [
        BuildState::Start,
        BuildState::DependenciesInstalled,
        BuildState::SourceCopied,
        BuildState::VersionStamped,
        BuildState::Compiled,
        BuildState::ArtifactExtracted,
        BuildState::RuntimeAssembled,
        BuildState::OwnershipFixed,
        BuildState::Ready,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            BuildState::Start => "Start",
            BuildState::DependenciesInstalled => "DependenciesInstalled",
            BuildState::SourceCopied => "SourceCopied",
            BuildState::VersionStamped => "VersionStamped",
            BuildState::Compiled => "Compiled",
            BuildState::ArtifactExtracted => "ArtifactExtracted",
            BuildState::RuntimeAssembled => "RuntimeAssembled",
            BuildState::OwnershipFixed => "OwnershipFixed",
            BuildState::Ready => "Ready",
        }
    }

    /// The state that follows this one, if any.
    pub fn next(&self) -> Option<BuildState> {
        let idx = Self::ALL.iter().position(|s| s == self)?;
        Self::ALL.get(idx + 1).copied()
    }

    pub fn is_terminal(&self) -> bool {
        *self == BuildState::Ready
    }
}

impl fmt::Display for BuildState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Tracks how far a build has progressed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildProgress {
    history: Vec<BuildState>,
}

impl BuildProgress {
    pub fn new() -> Self {
        Self {
            history: vec![BuildState::Start],
        }
    }

    pub fn current(&self) -> BuildState {
        self.history
            .last()
            .copied()
            .unwrap_or(BuildState::Start)
    }

    /// Move to `to`, which must be the immediate successor of the current state.
    pub fn advance(&mut self, to: BuildState) -> Result<()> {
        let from = self.current();
        if from.next() != Some(to) {
            return Err(PipelineError::InvalidTransition {
                from: from.to_string(),
                to: to.to_string(),
            });
        }
        emit_state_advanced(from.name(), to.name());
        self.history.push(to);
        Ok(())
    }

    /// States visited so far, starting with `Start`.
    pub fn history(&self) -> &[BuildState] {
        &self.history
    }

    pub fn is_ready(&self) -> bool {
        self.current().is_terminal()
    }
}

impl Default for BuildProgress {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_states_chain_in_order() {
        let mut state = BuildState::Start;
        let mut visited = vec![state];
        while let Some(next) = state.next() {
            visited.push(next);
            state = next;
        }
        assert_eq!(visited, BuildState::ALL.to_vec());
        assert!(state.is_terminal());
    }

    #[test]
    fn test_progress_walks_full_chain() {
        let mut progress = BuildProgress::new();
        for state in &BuildState::ALL[1..] {
            progress.advance(*state).unwrap();
        }
        assert!(progress.is_ready());
        assert_eq!(progress.history().len(), BuildState::ALL.len());
    }

    #[test]
    fn test_compile_cannot_precede_version_stamp() {
        let mut progress = BuildProgress::new();
        progress.advance(BuildState::DependenciesInstalled).unwrap();
        progress.advance(BuildState::SourceCopied).unwrap();

        let err = progress.advance(BuildState::Compiled).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidTransition { .. }));
        assert_eq!(progress.current(), BuildState::SourceCopied);
    }

    #[test]
    fn test_no_transition_after_ready() {
        let mut progress = BuildProgress::new();
        for state in &BuildState::ALL[1..] {
            progress.advance(*state).unwrap();
        }
        assert!(progress.advance(BuildState::Start).is_err());
    }

    #[test]
    fn test_serde_names() {
        let json = serde_json::to_string(&BuildState::VersionStamped).unwrap();
        assert_eq!(json, "\"version_stamped\"");
    }
}
