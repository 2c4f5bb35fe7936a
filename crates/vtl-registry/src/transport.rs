//! Transport map: vetted target-engine implementations of source functions

use std::collections::HashMap;

use crate::{ArtifactCoordinate, RegistryError, DEFAULT_SCHEME};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportEntry {
    pub qualified_name: String,
    /// Name the function is invoked by in generated SQL
    pub target_callable_name: String,
    pub target_implementation_class: String,
    pub target_artifact: ArtifactCoordinate,
}

#[derive(Debug)]
pub struct TransportMap {
    entries: HashMap<String, TransportEntry>,
    default_scheme: String,
}

impl TransportMap {
    pub fn new() -> Self {
        Self::with_default_scheme(DEFAULT_SCHEME)
    }

    /// Map whose target artifacts default to `scheme` when they are declared
    /// without one.
    pub fn with_default_scheme(scheme: impl Into<String>) -> Self {
        Self {
            entries: HashMap::new(),
            default_scheme: scheme.into(),
        }
    }

    pub fn add_transport(
        &mut self,
        qualified_name: impl Into<String>,
        target_callable_name: impl Into<String>,
        target_implementation_class: impl Into<String>,
        target_artifact: &str,
    ) -> Result<(), RegistryError> {
        let target_artifact = ArtifactCoordinate::parse_with_scheme(target_artifact, &self.default_scheme)?;
        let qualified_name = qualified_name.into();
        let entry = TransportEntry {
            qualified_name: qualified_name.clone(),
            target_callable_name: target_callable_name.into(),
            target_implementation_class: target_implementation_class.into(),
            target_artifact,
        };
        tracing::debug!(
            function = %qualified_name,
            callable = %entry.target_callable_name,
            artifact = %entry.target_artifact,
            "registered transport"
        );

        self.entries.insert(qualified_name, entry);
        Ok(())
    }

    pub fn get(&self, qualified_name: &str) -> Option<&TransportEntry> {
        self.entries.get(qualified_name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for TransportMap {
    fn default() -> Self {
        Self::new()
    }
}
