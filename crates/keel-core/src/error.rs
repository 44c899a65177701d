//! Error taxonomy for keel pipelines.
//!
//! Every variant is fatal: pipelines never retry and never report partial
//! success. The binary renders these through `anyhow` with a non-zero exit.

/// Pipeline errors shared by the release builder and the lint remediator.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("dependency installation failed in stage '{stage}': {detail}")]
    DependencyInstall { stage: String, detail: String },

    #[error("invalid build state transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("version resolution failed: {0}")]
    VersionResolution(String),

    #[error("compilation failed: {0}")]
    Compilation(String),

    #[error("image assembly failed in stage '{stage}': {detail}")]
    ImageAssembly { stage: String, detail: String },

    #[error("image verification failed: {0}")]
    ImageVerification(String),

    /// `diagnostics` is the analyzer's complete output, locations included.
    #[error("unfixable lint violations ({errors} error diagnostics):\n{diagnostics}")]
    UnfixableLint {
        errors: usize,
        first: String,
        diagnostics: String,
    },

    #[error("formatter failed: {0}")]
    Formatter(String),

    #[error("failed to launch '{program}': {source}")]
    ToolUnavailable {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for keel pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_errors_name_the_stage() {
        let err = PipelineError::DependencyInstall {
            stage: "toolchain".to_string(),
            detail: "apt-get exited with code 100".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("toolchain"));
        assert!(msg.contains("code 100"));

        let err = PipelineError::ImageAssembly {
            stage: "owned".to_string(),
            detail: "COPY failed".to_string(),
        };
        assert!(err.to_string().contains("owned"));
    }

    #[test]
    fn test_unfixable_lint_display() {
        let err = PipelineError::UnfixableLint {
            errors: 3,
            first: "error: usage of wildcard import".to_string(),
            diagnostics: "error: usage of wildcard import\n --> src/lib.rs:1:5".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("3 error diagnostics"));
        assert!(msg.contains("wildcard import"));
        assert!(msg.contains("--> src/lib.rs:1:5"));
    }

    #[test]
    fn test_tool_unavailable_keeps_source() {
        let err = PipelineError::ToolUnavailable {
            program: "docker".to_string(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "not found"),
        };
        assert!(err.to_string().contains("docker"));
        assert!(std::error::Error::source(&err).is_some());
    }
}
