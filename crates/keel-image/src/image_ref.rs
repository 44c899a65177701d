//! Container image references.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use keel_core::{PipelineError, Result};

/// A validated image reference: `[registry/]repository[:tag][@digest]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ImageRef {
    repository: String,
    tag: Option<String>,
    digest: Option<String>,
}

impl ImageRef {
    /// Build a tagged reference from parts known to be valid.
    pub(crate) fn from_parts(repository: &str, tag: &str) -> Self {
        Self {
            repository: repository.to_string(),
            tag: Some(tag.to_string()),
            digest: None,
        }
    }

    pub fn repository(&self) -> &str {
        &self.repository
    }

    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    pub fn digest(&self) -> Option<&str> {
        self.digest.as_deref()
    }
}

impl FromStr for ImageRef {
    type Err = PipelineError;

    fn from_str(raw: &str) -> Result<Self> {
        let invalid = |why: &str| PipelineError::Configuration(format!("invalid image reference '{raw}': {why}"));

        if raw.trim().is_empty() {
            return Err(PipelineError::Configuration(
                "image reference is missing".to_string(),
            ));
        }
        if raw.chars().any(char::is_whitespace) {
            return Err(invalid("contains whitespace"));
        }

        let (name, digest) = match raw.split_once('@') {
            Some((name, digest)) => {
                let valid = digest
                    .split_once(':')
                    .is_some_and(|(algo, hex)| !algo.is_empty() && !hex.is_empty());
                if !valid {
                    return Err(invalid("digest must look like 'sha256:<hex>'"));
                }
                (name, Some(digest.to_string()))
            }
            None => (raw, None),
        };

        // A ':' after the last '/' separates the tag; earlier ones are registry ports.
        let last_slash = name.rfind('/').map_or(0, |i| i + 1);
        let (repository, tag) = match name[last_slash..].rfind(':') {
            Some(i) => {
                let split = last_slash + i;
                (&name[..split], Some(&name[split + 1..]))
            }
            None => (name, None),
        };

        if let Some(tag) = tag {
            if !valid_tag(tag) {
                return Err(invalid("tag must be 1-128 chars of [A-Za-z0-9_.-] not starting with '.' or '-'"));
            }
        }
        validate_repository(repository).map_err(|why| invalid(&why))?;

        Ok(Self {
            repository: repository.to_string(),
            tag: tag.map(str::to_string),
            digest,
        })
    }
}

impl TryFrom<String> for ImageRef {
    type Error = PipelineError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<ImageRef> for String {
    fn from(value: ImageRef) -> Self {
        value.to_string()
    }
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.repository)?;
        if let Some(tag) = &self.tag {
            write!(f, ":{tag}")?;
        }
        if let Some(digest) = &self.digest {
            write!(f, "@{digest}")?;
        }
        Ok(())
    }
}

fn valid_tag(tag: &str) -> bool {
    !tag.is_empty()
        && tag.len() <= 128
        && !tag.starts_with(['.', '-'])
        && tag
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
}

fn validate_repository(repository: &str) -> std::result::Result<(), String> {
    if repository.is_empty() {
        return Err("repository is empty".to_string());
    }

    let mut components: Vec<&str> = repository.split('/').collect();
    let first = components[0];
    let has_registry = components.len() > 1
        && (first.contains('.') || first.contains(':') || first == "localhost");
    if has_registry {
        let host_ok = first
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | ':'));
        if !host_ok {
            return Err(format!("registry '{first}' is not a valid host"));
        }
        components.remove(0);
    }

    for component in components {
        let starts_ok = component
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_lowercase() || c.is_ascii_digit());
        let chars_ok = component
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '.' | '_' | '-'));
        if !starts_ok || !chars_ok {
            return Err(format!(
                "path component '{component}' must be lowercase alphanumerics with '.', '_' or '-'"
            ));
        }
    }
    Ok(())
}
