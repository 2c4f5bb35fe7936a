//! Spark SQL translation of view plans
//!
//! Turns a fully resolved view plan into:
//! - Spark SQL text equivalent to the view's defining query
//! - the base tables the view reads
//! - the user-defined function artifacts Spark must load to run it
//!
//! ```ignore
//! let translation = SparkTranslator::new(&functions, &transports).translate(&plan)?;
//! println!("{}", translation.sql());
//! ```

use serde::Serialize;
use tracing::{info, warn};
use vtl_plan::PlanNode;
use vtl_registry::{FunctionRegistry, TransportMap};

mod alias;
mod base_tables;
mod error;
mod expr;
mod lateral;
mod udf;
mod unparse;

pub use alias::{AliasContext, NodeId};
pub use base_tables::collect_base_tables;
pub use error::{ErrorCategory, TranslateError};
pub use udf::UdfInfo;

use unparse::Unparser;

/// Translator for view plans → Spark SQL
pub struct SparkTranslator<'a> {
    functions: &'a FunctionRegistry,
    transports: &'a TransportMap,
}

impl<'a> SparkTranslator<'a> {
    pub fn new(functions: &'a FunctionRegistry, transports: &'a TransportMap) -> Self {
        Self { functions, transports }
    }

    /// Translate a view plan. Nothing is returned unless every part of the
    /// translation succeeds.
    pub fn translate(&self, plan: &PlanNode) -> Result<Translation, TranslateError> {
        let fingerprint = plan.fingerprint();
        let mut unparser = Unparser::new(self.functions, self.transports);

        let sql = match unparser.unparse(plan) {
            Ok(sql) => sql,
            Err(e) => {
                warn!(plan = %fingerprint, category = ?e.category(), "Translation failed: {}", e);
                return Err(e);
            }
        };
        let udfs = unparser.into_manifest();
        let base_tables = collect_base_tables(plan);

        info!(
            plan = %fingerprint,
            base_tables = base_tables.len(),
            udfs = udfs.len(),
            "Translated view plan"
        );
        Ok(Translation {
            sql,
            base_tables,
            udfs,
        })
    }
}

/// Result of translating one view plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Translation {
    sql: String,
    base_tables: Vec<String>,
    udfs: Vec<UdfInfo>,
}

impl Translation {
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// `schema.table` names, each once, in plan order
    pub fn base_tables(&self) -> &[String] {
        &self.base_tables
    }

    pub fn udf_manifest(&self) -> &[UdfInfo] {
        &self.udfs
    }
}
