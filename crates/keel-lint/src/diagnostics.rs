//! Summary of clippy's stderr when the fix step fails.

/// Error diagnostics found in compiler output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagnosticSummary {
    pub errors: usize,
    /// First error headline, if any.
    pub first: Option<String>,
}

impl DiagnosticSummary {
    pub fn parse(stderr: &str) -> Self {
        let headlines: Vec<&str> = stderr
            .lines()
            .map(str::trim_start)
            .filter(|line| is_error_headline(line))
            .collect();
        Self {
            errors: headlines.len(),
            first: headlines.first().map(|line| line.to_string()),
        }
    }
}

/// `error: ...` or `error[E0425]: ...`, but not cargo's closing summary lines.
fn is_error_headline(line: &str) -> bool {
    (line.starts_with("error:") || line.starts_with("error["))
        && !line.starts_with("error: could not compile")
        && !line.starts_with("error: aborting due to")
}
