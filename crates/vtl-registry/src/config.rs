//! Registry configuration
//!
//! Setup code can declare functions and transports in a YAML file instead of
//! calling the registration API one entry at a time:
//!
//! ```yaml
//! default_scheme: ivy
//! functions:
//!   - name: com.example.udf.IsAdult
//!     return_type: { fixed: boolean }
//!     operand_types: { families: [integer] }
//!     dependency: "com.example:udf:1.0"
//! transports:
//!   - name: com.example.udf.IsAdult
//!     callable: isAdult
//!     class: com.example.spark.IsAdult
//!     artifact: "ivy://com.example:udf:1.0"
//! ```
//!
//! `VTL_DEFAULT_SCHEME` overrides `default_scheme`.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use crate::{FunctionRegistry, OperandTypeRule, RegistryError, ReturnTypeRule, TransportMap, DEFAULT_SCHEME};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid registry entry {name}: {source}")]
    Registry {
        name: String,
        #[source]
        source: RegistryError,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionConfig {
    pub name: String,
    pub return_type: ReturnTypeRule,
    #[serde(default = "default_operand_types")]
    pub operand_types: OperandTypeRule,
    pub dependency: String,
}

fn default_operand_types() -> OperandTypeRule {
    OperandTypeRule::Any
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    pub name: String,
    pub callable: String,
    pub class: String,
    pub artifact: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    #[serde(default = "default_scheme")]
    pub default_scheme: String,
    #[serde(default)]
    pub functions: Vec<FunctionConfig>,
    #[serde(default)]
    pub transports: Vec<TransportConfig>,
}

fn default_scheme() -> String {
    DEFAULT_SCHEME.to_string()
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            default_scheme: default_scheme(),
            functions: vec![],
            transports: vec![],
        }
    }
}

impl RegistryConfig {
    /// Load configuration from YAML file with environment variable overrides
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let mut config = Self::from_yaml_str(&contents)?;

        if let Ok(scheme) = std::env::var("VTL_DEFAULT_SCHEME") {
            config.default_scheme = scheme;
        }

        Ok(config)
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Populate fresh registries from this configuration.
    pub fn build(&self) -> Result<(FunctionRegistry, TransportMap), ConfigError> {
        let mut functions = FunctionRegistry::with_default_scheme(&self.default_scheme);
        for f in &self.functions {
            functions
                .add_function(&f.name, f.return_type.clone(), f.operand_types.clone(), &f.dependency)
                .map_err(|source| ConfigError::Registry {
                    name: f.name.clone(),
                    source,
                })?;
        }

        let mut transports = TransportMap::with_default_scheme(&self.default_scheme);
        for t in &self.transports {
            transports
                .add_transport(&t.name, &t.callable, &t.class, &t.artifact)
                .map_err(|source| ConfigError::Registry {
                    name: t.name.clone(),
                    source,
                })?;
        }

        tracing::info!(
            functions = functions.len(),
            transports = transports.len(),
            "registries loaded"
        );
        Ok((functions, transports))
    }
}
