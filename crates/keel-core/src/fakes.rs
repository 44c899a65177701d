//! In-memory fake for the tool runner (testing only)
//!
//! `ScriptedRunner` records every invocation and answers from a list of
//! scripted rules, so pipelines can be exercised without docker, git or cargo.

use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::{PipelineError, Result};
use crate::process::{ToolInvocation, ToolOutput, ToolRunner};

type Effect = Box<dyn Fn(&ToolInvocation) + Send + Sync>;

enum Outcome {
    Output(ToolOutput),
    Unavailable,
}

struct Rule {
    program: String,
    args_contain: Vec<String>,
    outcome: Outcome,
    effect: Option<Effect>,
}

impl Rule {
    fn matches(&self, invocation: &ToolInvocation) -> bool {
        self.program == invocation.program
            && self
                .args_contain
                .iter()
                .all(|needle| invocation.args.iter().any(|a| a == needle))
    }
}

/// Successful output with the given stdout.
pub fn ok(stdout: &str) -> ToolOutput {
    ToolOutput {
        exit_code: 0,
        stdout: stdout.to_string(),
        stderr: String::new(),
        duration_ms: 0,
    }
}

/// Failed output with the given exit code and stderr.
pub fn failed(exit_code: i32, stderr: &str) -> ToolOutput {
    ToolOutput {
        exit_code,
        stdout: String::new(),
        stderr: stderr.to_string(),
        duration_ms: 0,
    }
}

/// Tool runner answering from scripted rules.
///
/// Rules are checked in insertion order; the first rule whose program matches
/// and whose argument tokens all appear in the invocation wins. Unmatched
/// invocations succeed with empty output.
#[derive(Default)]
pub struct ScriptedRunner {
    rules: Vec<Rule>,
    calls: Mutex<Vec<ToolInvocation>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer matching invocations with `output`.
    pub fn respond(mut self, program: &str, args_contain: &[&str], output: ToolOutput) -> Self {
        self.rules.push(Rule {
            program: program.to_string(),
            args_contain: args_contain.iter().map(|s| s.to_string()).collect(),
            outcome: Outcome::Output(output),
            effect: None,
        });
        self
    }

    /// Answer matching invocations with `output` after running `effect`.
    ///
    /// Effects simulate tools that touch the filesystem (fixers, formatters).
    pub fn respond_with_effect<F>(
        mut self,
        program: &str,
        args_contain: &[&str],
        output: ToolOutput,
        effect: F,
    ) -> Self
    where
        F: Fn(&ToolInvocation) + Send + Sync + 'static,
    {
        self.rules.push(Rule {
            program: program.to_string(),
            args_contain: args_contain.iter().map(|s| s.to_string()).collect(),
            outcome: Outcome::Output(output),
            effect: Some(Box::new(effect)),
        });
        self
    }

    /// Make `program` impossible to launch.
    pub fn unavailable(mut self, program: &str) -> Self {
        self.rules.push(Rule {
            program: program.to_string(),
            args_contain: Vec::new(),
            outcome: Outcome::Unavailable,
            effect: None,
        });
        self
    }

    /// All invocations seen so far, in order.
    pub fn calls(&self) -> Vec<ToolInvocation> {
        self.calls.lock().unwrap().clone()
    }

    /// Invocations of a single program, in order.
    pub fn calls_to(&self, program: &str) -> Vec<ToolInvocation> {
        self.calls()
            .into_iter()
            .filter(|c| c.program == program)
            .collect()
    }
}

#[async_trait]
impl ToolRunner for ScriptedRunner {
    async fn run(&self, invocation: &ToolInvocation) -> Result<ToolOutput> {
        self.calls.lock().unwrap().push(invocation.clone());

        let Some(rule) = self.rules.iter().find(|r| r.matches(invocation)) else {
            return Ok(ok(""));
        };

        if let Some(effect) = &rule.effect {
            effect(invocation);
        }

        match &rule.outcome {
            Outcome::Output(output) => Ok(output.clone()),
            Outcome::Unavailable => Err(PipelineError::ToolUnavailable {
                program: invocation.program.clone(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "scripted as unavailable"),
            }),
        }
    }
}
