//! Post-build verification of the produced image.

use serde::Deserialize;
use std::collections::BTreeMap;

use keel_core::{PipelineError, Result, ToolInvocation, WorkspaceRoot};

use crate::stages::RuntimeImage;

/// Subset of `docker image inspect --format '{{json .Config}}'`.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct ImageConfig {
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub exposed_ports: Option<BTreeMap<String, serde_json::Value>>,
    #[serde(default)]
    pub cmd: Option<Vec<String>>,
}

impl ImageConfig {
    pub fn from_json(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw.trim())?)
    }

    /// Compare the image configuration with what the plan promised.
    pub fn verify(&self, expected: &RuntimeImage) -> Result<()> {
        let user = expected.user.numeric();
        if self.user.is_empty() || self.user == "root" || self.user.starts_with("0:") || self.user == "0" {
            return Err(PipelineError::ImageVerification(format!(
                "image runs as root (user {:?})",
                self.user
            )));
        }
        if self.user != user {
            return Err(PipelineError::ImageVerification(format!(
                "image user is {:?}, expected {user:?}",
                self.user
            )));
        }

        let port = format!("{}/tcp", expected.port);
        let exposed = self
            .exposed_ports
            .as_ref()
            .is_some_and(|ports| ports.contains_key(&port));
        if !exposed {
            return Err(PipelineError::ImageVerification(format!(
                "image does not expose {port}"
            )));
        }

        if self.cmd.as_deref() != Some(expected.command.as_slice()) {
            return Err(PipelineError::ImageVerification(format!(
                "image command is {:?}, expected {:?}",
                self.cmd, expected.command
            )));
        }
        Ok(())
    }
}

/// `docker image inspect` for the configuration of `tag`.
pub fn inspect_invocation(root: &WorkspaceRoot, tag: &str) -> ToolInvocation {
    ToolInvocation::new("docker", root.path()).args([
        "image",
        "inspect",
        "--format",
        "{{json .Config}}",
        tag,
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::RuntimeUser;
    use crate::version::VersionTag;

    fn expected() -> RuntimeImage {
        RuntimeImage {
            tag: "lemmy:test".to_string(),
            version: VersionTag::parse("0.17.0").unwrap(),
            install_path: "/app/lemmy".to_string(),
            user: RuntimeUser::default(),
            port: 8536,
            command: vec!["/app/lemmy".to_string()],
        }
    }

    const GOOD: &str = r#"{"User":"1000:1000","ExposedPorts":{"8536/tcp":{}},"Cmd":["/app/lemmy"],"Env":["PATH=/usr/bin"]}"#;

    #[test]
    fn test_matching_config_passes() {
        ImageConfig::from_json(GOOD).unwrap().verify(&expected()).unwrap();
    }

    #[test]
    fn test_root_user_fails() {
        let config = ImageConfig::from_json(
            r#"{"User":"","ExposedPorts":{"8536/tcp":{}},"Cmd":["/app/lemmy"]}"#,
        )
        .unwrap();
        let err = config.verify(&expected()).unwrap_err();
        assert!(err.to_string().contains("root"));
    }

    #[test]
    fn test_missing_port_fails() {
        let config =
            ImageConfig::from_json(r#"{"User":"1000:1000","ExposedPorts":null,"Cmd":["/app/lemmy"]}"#)
                .unwrap();
        assert!(matches!(
            config.verify(&expected()),
            Err(PipelineError::ImageVerification(_))
        ));
    }

    #[test]
    fn test_wrong_command_fails() {
        let config = ImageConfig::from_json(
            r#"{"User":"1000:1000","ExposedPorts":{"8536/tcp":{}},"Cmd":["/bin/sh"]}"#,
        )
        .unwrap();
        assert!(config.verify(&expected()).is_err());
    }

    #[test]
    fn test_garbage_is_serialization_error() {
        assert!(matches!(
            ImageConfig::from_json("not json"),
            Err(PipelineError::Serialization(_))
        ));
    }
}
