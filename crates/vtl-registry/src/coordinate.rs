//! Artifact coordinates (`scheme://group:artifact:version`)

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::RegistryError;

pub const DEFAULT_SCHEME: &str = "ivy";

/// Package identifier of the binary that implements a function.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ArtifactCoordinate {
    pub scheme: String,
    pub group: String,
    pub artifact: String,
    pub version: String,
}

impl ArtifactCoordinate {
    /// Parse a coordinate, filling in [`DEFAULT_SCHEME`] when none is given.
    pub fn parse(raw: &str) -> Result<Self, RegistryError> {
        Self::parse_with_scheme(raw, DEFAULT_SCHEME)
    }

    /// Parse a coordinate. Whitespace anywhere in `raw` is insignificant.
    pub fn parse_with_scheme(raw: &str, default_scheme: &str) -> Result<Self, RegistryError> {
        let normalized: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
        let invalid = || RegistryError::InvalidCoordinate(raw.to_string());

        let (scheme, rest) = match normalized.split_once("://") {
            Some((scheme, rest)) => (scheme.to_string(), rest),
            None => (default_scheme.to_string(), normalized.as_str()),
        };

        let parts: Vec<&str> = rest.split(':').collect();
        let [group, artifact, version] = parts.as_slice() else {
            return Err(invalid());
        };
        if scheme.is_empty() || [group, artifact, version].iter().any(|p| p.is_empty()) {
            return Err(invalid());
        }

        Ok(Self {
            scheme,
            group: group.to_string(),
            artifact: artifact.to_string(),
            version: version.to_string(),
        })
    }
}

impl fmt::Display for ArtifactCoordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}:{}:{}", self.scheme, self.group, self.artifact, self.version)
    }
}

impl TryFrom<String> for ArtifactCoordinate {
    type Error = RegistryError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ArtifactCoordinate> for String {
    fn from(value: ArtifactCoordinate) -> Self {
        value.to_string()
    }
}
