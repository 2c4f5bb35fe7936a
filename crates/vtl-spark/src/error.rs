use thiserror::Error;

/// Broad failure classes of a translation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// The plan is well formed but has no Spark rendering.
    UnsupportedConstruct,
    /// The plan breaks a structural invariant the caller guarantees.
    ContractViolation,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TranslateError {
    #[error("Lateral view with a wildcard projection is not supported")]
    LateralViewWildcard,

    #[error("Explode yielding {} columns ({}) is not supported; a lateral view may produce one column", .columns.len(), .columns.join(", "))]
    MultiColumnExplode { columns: Vec<String> },

    #[error("Lateral view column '{column}' cannot be used as a GROUP BY key")]
    LateralColumnInGroupBy { column: String },

    #[error("Function not registered: {0}")]
    UnregisteredFunction(String),

    #[error("Unsupported plan shape: {0}")]
    UnsupportedShape(String),

    #[error("{node} expects {expected} inputs, found {found}")]
    ChildArity {
        node: &'static str,
        expected: String,
        found: usize,
    },

    #[error("Column reference ${index} is out of range ({available} fields available)")]
    DanglingColumn { index: usize, available: usize },

    #[error("Correlated reference ${0} outside of a lateral view")]
    UnboundCorrelation(usize),

    #[error("{node} declares {declared} output fields but produces {produced}")]
    FieldCount {
        node: &'static str,
        declared: usize,
        produced: usize,
    },
}

impl TranslateError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            TranslateError::LateralViewWildcard
            | TranslateError::MultiColumnExplode { .. }
            | TranslateError::LateralColumnInGroupBy { .. }
            | TranslateError::UnregisteredFunction(_)
            | TranslateError::UnsupportedShape(_) => ErrorCategory::UnsupportedConstruct,
            TranslateError::ChildArity { .. }
            | TranslateError::DanglingColumn { .. }
            | TranslateError::UnboundCorrelation(_)
            | TranslateError::FieldCount { .. } => ErrorCategory::ContractViolation,
        }
    }
}
