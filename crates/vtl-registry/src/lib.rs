//! Function registry and transport map
//!
//! Two catalogs consulted when translating user-defined function calls:
//! - [`FunctionRegistry`]: functions known to the source engine, with their
//!   type rules and the artifact that implements them
//! - [`TransportMap`]: vetted re-implementations for the target engine
//!
//! Both are populated once by setup code and only read during translation.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;
use vtl_plan::{DataType, TypeFamily};

mod config;
mod coordinate;
mod transport;

pub use config::{ConfigError, FunctionConfig, RegistryConfig, TransportConfig};
pub use coordinate::{ArtifactCoordinate, DEFAULT_SCHEME};
pub use transport::{TransportEntry, TransportMap};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Invalid artifact coordinate: {0:?}")]
    InvalidCoordinate(String),

    #[error("Function not found: {0}")]
    FunctionNotFound(String),
}

/// How a function's result type is derived from its operands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReturnTypeRule {
    Fixed(DataType),
    SameAsOperand(usize),
}

impl ReturnTypeRule {
    pub fn infer(&self, operands: &[DataType]) -> Option<DataType> {
        match self {
            ReturnTypeRule::Fixed(data_type) => Some(data_type.clone()),
            ReturnTypeRule::SameAsOperand(index) => operands.get(*index).cloned(),
        }
    }
}

/// Which operand lists a function accepts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperandTypeRule {
    Any,
    /// Exactly one operand per listed family.
    Families(Vec<TypeFamily>),
    /// Any number of operands, all of one family.
    Variadic(TypeFamily),
}

impl OperandTypeRule {
    pub fn accepts(&self, operands: &[DataType]) -> bool {
        match self {
            OperandTypeRule::Any => true,
            OperandTypeRule::Families(families) => {
                families.len() == operands.len()
                    && families.iter().zip(operands).all(|(family, t)| t.is_in(*family))
            }
            OperandTypeRule::Variadic(family) => operands.iter().all(|t| t.is_in(*family)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionDescriptor {
    pub qualified_name: String,
    pub return_type: ReturnTypeRule,
    pub operand_types: OperandTypeRule,
    pub dependency: ArtifactCoordinate,
}

impl FunctionDescriptor {
    pub fn version(&self) -> &str {
        &self.dependency.version
    }
}

#[derive(Debug)]
pub struct FunctionRegistry {
    functions: HashMap<String, FunctionDescriptor>,
    default_scheme: String,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::with_default_scheme(DEFAULT_SCHEME)
    }

    /// Registry whose dependency coordinates default to `scheme` when they
    /// are declared without one.
    pub fn with_default_scheme(scheme: impl Into<String>) -> Self {
        Self {
            functions: HashMap::new(),
            default_scheme: scheme.into(),
        }
    }

    /// Register a user-defined function. A later registration under the same
    /// qualified name replaces the earlier one.
    pub fn add_function(
        &mut self,
        qualified_name: impl Into<String>,
        return_type: ReturnTypeRule,
        operand_types: OperandTypeRule,
        dependency: &str,
    ) -> Result<(), RegistryError> {
        let dependency = ArtifactCoordinate::parse_with_scheme(dependency, &self.default_scheme)?;
        let qualified_name = qualified_name.into();
        tracing::debug!(function = %qualified_name, %dependency, "registered function");

        self.functions.insert(
            qualified_name.clone(),
            FunctionDescriptor {
                qualified_name,
                return_type,
                operand_types,
                dependency,
            },
        );
        Ok(())
    }

    pub fn get(&self, qualified_name: &str) -> Option<&FunctionDescriptor> {
        self.functions.get(qualified_name)
    }

    pub fn lookup(&self, qualified_name: &str) -> Result<&FunctionDescriptor, RegistryError> {
        self.get(qualified_name)
            .ok_or_else(|| RegistryError::FunctionNotFound(qualified_name.to_string()))
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}

impl Default for FunctionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
