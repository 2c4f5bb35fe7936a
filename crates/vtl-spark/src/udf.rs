//! User-defined function resolution
//!
//! Every UDF call site is resolved against the transport map first, then the
//! source engine's function registry. The resolver accumulates the
//! deduplicated manifest of artifacts the target engine has to load.

use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use tracing::debug;
use vtl_registry::{ArtifactCoordinate, FunctionRegistry, TransportMap};

use crate::TranslateError;

/// A function implementation the generated SQL depends on.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct UdfInfo {
    pub callable_name: String,
    pub implementation_class: String,
    pub artifact: ArtifactCoordinate,
}

impl UdfInfo {
    pub fn artifact_url(&self) -> String {
        self.artifact.to_string()
    }
}

impl fmt::Display for UdfInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}) from {}", self.callable_name, self.implementation_class, self.artifact)
    }
}

pub(crate) struct UdfResolver<'a> {
    functions: &'a FunctionRegistry,
    transports: &'a TransportMap,
    manifest: Vec<UdfInfo>,
    seen: HashSet<UdfInfo>,
}

impl<'a> UdfResolver<'a> {
    pub fn new(functions: &'a FunctionRegistry, transports: &'a TransportMap) -> Self {
        Self {
            functions,
            transports,
            manifest: Vec::new(),
            seen: HashSet::new(),
        }
    }

    /// Resolve one call site, returning the name to invoke it by.
    pub fn resolve(&mut self, call_name: &str, qualified_name: &str) -> Result<String, TranslateError> {
        let (callable, info) = if let Some(entry) = self.transports.get(qualified_name) {
            debug!(function = %qualified_name, callable = %entry.target_callable_name, "resolved via transport map");
            let info = UdfInfo {
                callable_name: entry.target_callable_name.clone(),
                implementation_class: entry.target_implementation_class.clone(),
                artifact: entry.target_artifact.clone(),
            };
            (entry.target_callable_name.clone(), info)
        } else if let Some(desc) = self.functions.get(qualified_name) {
            debug!(function = %qualified_name, artifact = %desc.dependency, "falling back to registered implementation");
            let info = UdfInfo {
                callable_name: call_name.to_string(),
                implementation_class: desc.qualified_name.clone(),
                artifact: desc.dependency.clone(),
            };
            (call_name.to_string(), info)
        } else {
            return Err(TranslateError::UnregisteredFunction(qualified_name.to_string()));
        };

        if self.seen.insert(info.clone()) {
            self.manifest.push(info);
        }
        Ok(callable)
    }

    pub fn into_manifest(self) -> Vec<UdfInfo> {
        self.manifest
    }
}
