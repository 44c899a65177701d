//! Typed multi-stage image recipe and its Dockerfile rendering.
//!
//! Every stage reaches exactly one [`BuildState`]. The builder builds the
//! stages one `--target` at a time, so a failure is attributed to the state
//! that could not be reached.

use serde::{Deserialize, Serialize};
use std::fmt::Write as _;

use keel_core::{sha256_hex, PipelineError, Result};

use crate::state::BuildState;

/// Where a stage starts from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "value")]
pub enum StageBase {
    /// An external image, by reference.
    Image(String),
    /// An image named by a global build argument.
    Arg(String),
    /// An earlier stage of the same recipe.
    Stage(String),
}

/// A single Dockerfile instruction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Instruction {
    Run(String),
    Workdir(String),
    /// Copy from the build context.
    Copy { src: String, dest: String },
    /// Copy out of an earlier stage, optionally assigning ownership.
    CopyFrom {
        stage: String,
        src: String,
        dest: String,
        chown: Option<String>,
    },
    User(String),
    Expose { port: u16, protocol: String },
    Cmd(Vec<String>),
}

impl Instruction {
    fn render(&self) -> String {
        match self {
            Instruction::Run(cmd) => format!("RUN {cmd}"),
            Instruction::Workdir(dir) => format!("WORKDIR {dir}"),
            Instruction::Copy { src, dest } => format!("COPY {src} {dest}"),
            Instruction::CopyFrom {
                stage,
                src,
                dest,
                chown,
            } => match chown {
                Some(owner) => format!("COPY --from={stage} --chown={owner} {src} {dest}"),
                None => format!("COPY --from={stage} {src} {dest}"),
            },
            Instruction::User(user) => format!("USER {user}"),
            Instruction::Expose { port, protocol } => format!("EXPOSE {port}/{protocol}"),
            Instruction::Cmd(argv) => {
                let quoted: Vec<String> = argv.iter().map(|a| format!("{a:?}")).collect();
                format!("CMD [{}]", quoted.join(", "))
            }
        }
    }
}

/// One named stage of the recipe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stage {
    pub name: String,
    pub base: StageBase,
    pub instructions: Vec<Instruction>,
    /// State reached once this stage builds.
    pub reaches: BuildState,
}

/// Global build argument with its default value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildArg {
    pub name: String,
    pub default: String,
}

/// A complete multi-stage recipe.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipe {
    pub args: Vec<BuildArg>,
    pub stages: Vec<Stage>,
}

impl Recipe {
    /// Check the structural invariants of the recipe.
    ///
    /// - stages reach consecutive states, from the first state after `Start`
    ///   through `Ready`
    /// - stage bases and `COPY --from` sources only name earlier stages
    /// - argument bases name declared arguments
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| PipelineError::Configuration(format!("invalid recipe: {msg}"));

        let mut expected = BuildState::Start.next();
        for (idx, stage) in self.stages.iter().enumerate() {
            if Some(stage.reaches) != expected {
                return Err(invalid(format!(
                    "stage '{}' reaches {} but {} was expected",
                    stage.name,
                    stage.reaches,
                    expected.map_or("nothing".to_string(), |s| s.to_string())
                )));
            }
            expected = stage.reaches.next();

            let earlier = &self.stages[..idx];
            let known = |name: &str| earlier.iter().any(|s| s.name == name);
            match &stage.base {
                StageBase::Stage(parent) if !known(parent.as_str()) => {
                    return Err(invalid(format!(
                        "stage '{}' builds on unknown or later stage '{parent}'",
                        stage.name
                    )));
                }
                StageBase::Arg(arg) if !self.args.iter().any(|a| &a.name == arg) => {
                    return Err(invalid(format!(
                        "stage '{}' uses undeclared argument '{arg}'",
                        stage.name
                    )));
                }
                _ => {}
            }
            for instruction in &stage.instructions {
                if let Instruction::CopyFrom { stage: source, .. } = instruction {
                    if !known(source.as_str()) {
                        return Err(invalid(format!(
                            "stage '{}' copies from unknown or later stage '{source}'",
                            stage.name
                        )));
                    }
                }
            }
        }

        if expected.is_some() {
            return Err(invalid("recipe does not reach Ready".to_string()));
        }
        Ok(())
    }

    /// Render the recipe as a Dockerfile.
    pub fn render(&self) -> String {
        let mut out = String::from("# syntax=docker/dockerfile:1\n");
        for arg in &self.args {
            let _ = writeln!(out, "ARG {}={}", arg.name, arg.default);
        }
        for stage in &self.stages {
            let base = match &stage.base {
                StageBase::Image(image) => image.clone(),
                StageBase::Arg(arg) => format!("${{{arg}}}"),
                StageBase::Stage(parent) => parent.clone(),
            };
            let _ = writeln!(out, "\nFROM {base} AS {}", stage.name);
            for instruction in &stage.instructions {
                let _ = writeln!(out, "{}", instruction.render());
            }
        }
        out
    }

    /// SHA-256 of the rendered Dockerfile.
    pub fn digest(&self) -> String {
        sha256_hex(self.render().as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stage(name: &str, base: StageBase, reaches: BuildState) -> Stage {
        Stage {
            name: name.to_string(),
            base,
            instructions: Vec::new(),
            reaches,
        }
    }

    fn chain() -> Recipe {
        let mut stages = Vec::new();
        let mut parent: Option<String> = None;
        for (i, state) in BuildState::ALL[1..].iter().enumerate() {
            let name = format!("s{i}");
            let base = match parent.take() {
                Some(p) => StageBase::Stage(p),
                None => StageBase::Arg("BASE".to_string()),
            };
            stages.push(stage(&name, base, *state));
            parent = Some(name);
        }
        Recipe {
            args: vec![BuildArg {
                name: "BASE".to_string(),
                default: "rust:1.81".to_string(),
            }],
            stages,
        }
    }

    #[test]
    fn test_instruction_rendering() {
        let copy = Instruction::CopyFrom {
            stage: "artifact".to_string(),
            src: "/app/lemmy_server".to_string(),
            dest: "/app/lemmy".to_string(),
            chown: Some("1000:1000".to_string()),
        };
        assert_eq!(
            copy.render(),
            "COPY --from=artifact --chown=1000:1000 /app/lemmy_server /app/lemmy"
        );
        assert_eq!(
            Instruction::Cmd(vec!["/app/lemmy".to_string()]).render(),
            "CMD [\"/app/lemmy\"]"
        );
        assert_eq!(
            Instruction::Expose {
                port: 8536,
                protocol: "tcp".to_string()
            }
            .render(),
            "EXPOSE 8536/tcp"
        );
    }

    #[test]
    fn test_render_declares_args_before_stages() {
        let recipe = chain();
        let text = recipe.render();
        let arg_pos = text.find("ARG BASE=rust:1.81").unwrap();
        let from_pos = text.find("FROM ${BASE} AS s0").unwrap();
        assert!(arg_pos < from_pos);
        assert!(text.contains("FROM s0 AS s1"));
    }

    #[test]
    fn test_valid_chain() {
        chain().validate().unwrap();
    }

    #[test]
    fn test_out_of_order_states_rejected() {
        let mut recipe = chain();
        recipe.stages.swap(2, 3);
        assert!(recipe.validate().is_err());
    }

    #[test]
    fn test_incomplete_recipe_rejected() {
        let mut recipe = chain();
        recipe.stages.pop();
        assert!(recipe.validate().is_err());
    }

    #[test]
    fn test_copy_from_later_stage_rejected() {
        let mut recipe = chain();
        recipe.stages[1].instructions.push(Instruction::CopyFrom {
            stage: "s5".to_string(),
            src: "/x".to_string(),
            dest: "/y".to_string(),
            chown: None,
        });
        assert!(recipe.validate().is_err());
    }

    #[test]
    fn test_digest_tracks_content() {
        let a = chain();
        let mut b = chain();
        assert_eq!(a.digest(), b.digest());
        b.stages[0].instructions.push(Instruction::Run("true".to_string()));
        assert_ne!(a.digest(), b.digest());
    }
}
