//! VTL logical plan
//!
//! Fully resolved relational operator tree handed over by the upstream
//! view resolver. Every table reference is already qualified and every
//! nested view already inlined. All types are deterministically
//! serializable so plans can travel as JSON and be fingerprinted.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

mod types;
pub use types::*;

/// One operator of the plan with its output row type and owned inputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanNode {
    pub kind: NodeKind,
    pub fields: Vec<Field>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inputs: Vec<PlanNode>,
}

impl PlanNode {
    /// Calculate fingerprint (SHA-256) of the canonical JSON form
    pub fn fingerprint(&self) -> String {
        let json = serde_json::to_string(self).expect("plan should always serialize");
        let mut hasher = Sha256::new();
        hasher.update(json.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    pub fn scan(schema: impl Into<String>, table: impl Into<String>, fields: Vec<Field>) -> Self {
        Self {
            kind: NodeKind::TableScan {
                table: TableRef::new(schema, table),
            },
            fields,
            inputs: vec![],
        }
    }

    pub fn project(input: PlanNode, items: Vec<(Expr, Field)>) -> Self {
        let (exprs, fields) = items.into_iter().unzip();
        Self {
            kind: NodeKind::Project { exprs },
            fields,
            inputs: vec![input],
        }
    }

    pub fn filter(input: PlanNode, condition: Expr) -> Self {
        Self {
            kind: NodeKind::Filter { condition },
            fields: input.fields.clone(),
            inputs: vec![input],
        }
    }

    pub fn join(left: PlanNode, right: PlanNode, join_type: JoinType, condition: Option<Expr>) -> Self {
        let mut fields = left.fields.clone();
        if join_type.projects_right() {
            fields.extend(right.fields.iter().cloned());
        }
        Self {
            kind: NodeKind::Join {
                join_type,
                condition,
            },
            fields,
            inputs: vec![left, right],
        }
    }

    pub fn aggregate(input: PlanNode, group_keys: Vec<usize>, calls: Vec<(AggCall, Field)>) -> Self {
        let mut fields: Vec<Field> = group_keys
            .iter()
            .filter_map(|&key| input.fields.get(key).cloned())
            .collect();
        let (calls, call_fields): (Vec<_>, Vec<_>) = calls.into_iter().unzip();
        fields.extend(call_fields);
        Self {
            kind: NodeKind::Aggregate { group_keys, calls },
            fields,
            inputs: vec![input],
        }
    }

    pub fn sort(input: PlanNode, keys: Vec<SortKey>, fetch: Option<u64>) -> Self {
        Self {
            kind: NodeKind::Sort { keys, fetch },
            fields: input.fields.clone(),
            inputs: vec![input],
        }
    }

    /// Lateral view: `left` joined with the rows produced by `right`.
    pub fn correlate(left: PlanNode, right: PlanNode, join_type: CorrelateJoin) -> Self {
        let fields = left.fields.iter().chain(&right.fields).cloned().collect();
        Self {
            kind: NodeKind::Correlate { join_type },
            fields,
            inputs: vec![left, right],
        }
    }

    pub fn uncollect(input: PlanNode, columns: Vec<Field>, projection: LateralProjection) -> Self {
        Self {
            kind: NodeKind::Uncollect { projection },
            fields: columns,
            inputs: vec![input],
        }
    }

    /// Exploding side of a lateral view as the upstream planner shapes it:
    /// `Uncollect <- Project(source) <- Values(single dummy row)`.
    pub fn explode(source: Expr, source_field: Field, columns: Vec<Field>) -> Self {
        let dummy = PlanNode::values(
            vec![vec![Literal::Integer(0)]],
            vec![Field::new("ZERO", DataType::Int)],
        );
        let project = PlanNode::project(dummy, vec![(source, source_field)]);
        PlanNode::uncollect(project, columns, LateralProjection::Columns)
    }

    pub fn union(inputs: Vec<PlanNode>, all: bool) -> Self {
        let fields = inputs.first().map(|i| i.fields.clone()).unwrap_or_default();
        Self {
            kind: NodeKind::Union { all },
            fields,
            inputs,
        }
    }

    pub fn values(rows: Vec<Vec<Literal>>, fields: Vec<Field>) -> Self {
        Self {
            kind: NodeKind::Values { rows },
            fields,
            inputs: vec![],
        }
    }
}

/// Fully qualified table name
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TableRef {
    pub schema: String,
    pub table: String,
}

impl TableRef {
    pub fn new(schema: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            table: table.into(),
        }
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.schema, self.table)
    }
}

/// Operator kinds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum NodeKind {
    TableScan {
        table: TableRef,
    },
    Project {
        exprs: Vec<Expr>,
    },
    Filter {
        condition: Expr,
    },
    Join {
        join_type: JoinType,
        #[serde(skip_serializing_if = "Option::is_none")]
        condition: Option<Expr>,
    },
    Aggregate {
        group_keys: Vec<usize>,
        calls: Vec<AggCall>,
    },
    Sort {
        keys: Vec<SortKey>,
        #[serde(skip_serializing_if = "Option::is_none")]
        fetch: Option<u64>,
    },
    Correlate {
        join_type: CorrelateJoin,
    },
    Uncollect {
        projection: LateralProjection,
    },
    Union {
        #[serde(default)]
        all: bool,
    },
    Values {
        rows: Vec<Vec<Literal>>,
    },
}

impl NodeKind {
    pub fn name(&self) -> &'static str {
        match self {
            NodeKind::TableScan { .. } => "TableScan",
            NodeKind::Project { .. } => "Project",
            NodeKind::Filter { .. } => "Filter",
            NodeKind::Join { .. } => "Join",
            NodeKind::Aggregate { .. } => "Aggregate",
            NodeKind::Sort { .. } => "Sort",
            NodeKind::Correlate { .. } => "Correlate",
            NodeKind::Uncollect { .. } => "Uncollect",
            NodeKind::Union { .. } => "Union",
            NodeKind::Values { .. } => "Values",
        }
    }

    /// Minimum and maximum number of inputs (`None` = unbounded).
    pub fn input_arity(&self) -> (usize, Option<usize>) {
        match self {
            NodeKind::TableScan { .. } | NodeKind::Values { .. } => (0, Some(0)),
            NodeKind::Project { .. }
            | NodeKind::Filter { .. }
            | NodeKind::Aggregate { .. }
            | NodeKind::Sort { .. }
            | NodeKind::Uncollect { .. } => (1, Some(1)),
            NodeKind::Join { .. } | NodeKind::Correlate { .. } => (2, Some(2)),
            NodeKind::Union { .. } => (2, None),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JoinType {
    Inner,
    Left,
    Right,
    Full,
    Cross,
    Semi,
    Anti,
}

impl JoinType {
    /// Semi and anti joins only emit the left row.
    pub fn projects_right(self) -> bool {
        !matches!(self, JoinType::Semi | JoinType::Anti)
    }
}

/// `Left` keeps rows whose exploded collection is empty (OUTER).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CorrelateJoin {
    Inner,
    Left,
}

/// How the lateral view's output was requested: named columns or `t.*`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LateralProjection {
    Columns,
    Wildcard,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggCall {
    pub function: String,
    /// Set when the aggregate is a user-defined function.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub qualified_name: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<usize>,
    #[serde(default)]
    pub distinct: bool,
}

impl AggCall {
    pub fn new(function: impl Into<String>, args: Vec<usize>) -> Self {
        Self {
            function: function.into(),
            qualified_name: None,
            args,
            distinct: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortKey {
    pub field: usize,
    #[serde(default)]
    pub descending: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nulls: Option<NullOrder>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NullOrder {
    First,
    Last,
}

/// Expression types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Expr {
    /// Field of the node's input row (inputs concatenated left to right).
    InputRef { index: usize },
    /// Field of the row source of the enclosing lateral view.
    Correl { index: usize },
    Literal { value: Literal },
    Cast { expr: Box<Expr>, type_name: String },
    Binary { op: BinOp, left: Box<Expr>, right: Box<Expr> },
    Unary { op: UnOp, expr: Box<Expr> },
    /// Function built into the target engine.
    Function { name: String, args: Vec<Expr> },
    /// User-defined function, keyed by its qualified name in the registries.
    Udf { name: String, qualified_name: String, args: Vec<Expr> },
    Array { elements: Vec<Expr> },
    Map { entries: Vec<(Expr, Expr)> },
    Struct { function: String, fields: Vec<(String, Expr)> },
    Item { expr: Box<Expr>, index: Box<Expr> },
    FieldAccess { expr: Box<Expr>, field: String },
    Case { whens: Vec<(Expr, Expr)>, otherwise: Option<Box<Expr>> },
}

impl Expr {
    pub fn input(index: usize) -> Self {
        Expr::InputRef { index }
    }

    pub fn correl(index: usize) -> Self {
        Expr::Correl { index }
    }

    pub fn literal(value: Literal) -> Self {
        Expr::Literal { value }
    }

    pub fn int(value: i64) -> Self {
        Expr::literal(Literal::Integer(value))
    }

    pub fn string(value: impl Into<String>) -> Self {
        Expr::literal(Literal::String(value.into()))
    }

    pub fn null() -> Self {
        Expr::literal(Literal::Null)
    }

    pub fn binary(op: BinOp, left: Expr, right: Expr) -> Self {
        Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn unary(op: UnOp, expr: Expr) -> Self {
        Expr::Unary {
            op,
            expr: Box::new(expr),
        }
    }

    pub fn function(name: impl Into<String>, args: Vec<Expr>) -> Self {
        Expr::Function {
            name: name.into(),
            args,
        }
    }

    pub fn udf(name: impl Into<String>, qualified_name: impl Into<String>, args: Vec<Expr>) -> Self {
        Expr::Udf {
            name: name.into(),
            qualified_name: qualified_name.into(),
            args,
        }
    }

    pub fn cast(expr: Expr, type_name: impl Into<String>) -> Self {
        Expr::Cast {
            expr: Box::new(expr),
            type_name: type_name.into(),
        }
    }

    pub fn item(expr: Expr, index: Expr) -> Self {
        Expr::Item {
            expr: Box::new(expr),
            index: Box::new(index),
        }
    }

    pub fn field_access(expr: Expr, field: impl Into<String>) -> Self {
        Expr::FieldAccess {
            expr: Box::new(expr),
            field: field.into(),
        }
    }

    /// Input fields this expression reads, in visiting order.
    pub fn input_refs(&self) -> Vec<usize> {
        let mut refs = Vec::new();
        self.collect_input_refs(&mut refs);
        refs
    }

    fn collect_input_refs(&self, refs: &mut Vec<usize>) {
        match self {
            Expr::InputRef { index } => refs.push(*index),
            Expr::Correl { .. } | Expr::Literal { .. } => {}
            Expr::Cast { expr, .. } | Expr::Unary { expr, .. } | Expr::FieldAccess { expr, .. } => {
                expr.collect_input_refs(refs)
            }
            Expr::Binary { left, right, .. } => {
                left.collect_input_refs(refs);
                right.collect_input_refs(refs);
            }
            Expr::Function { args, .. } | Expr::Udf { args, .. } | Expr::Array { elements: args } => {
                args.iter().for_each(|a| a.collect_input_refs(refs))
            }
            Expr::Map { entries } => entries.iter().for_each(|(k, v)| {
                k.collect_input_refs(refs);
                v.collect_input_refs(refs);
            }),
            Expr::Struct { fields, .. } => fields.iter().for_each(|(_, v)| v.collect_input_refs(refs)),
            Expr::Item { expr, index } => {
                expr.collect_input_refs(refs);
                index.collect_input_refs(refs);
            }
            Expr::Case { whens, otherwise } => {
                whens.iter().for_each(|(w, t)| {
                    w.collect_input_refs(refs);
                    t.collect_input_refs(refs);
                });
                if let Some(e) = otherwise {
                    e.collect_input_refs(refs);
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinOp {
    // Arithmetic
    Add, Sub, Mul, Div, Mod,
    // Comparison
    Eq, Ne, Lt, Le, Gt, Ge,
    // Logical
    And, Or,
    // String
    Like,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnOp {
    Neg,
    Not,
    IsNull,
    IsNotNull,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum Literal {
    Null,
    Boolean(bool),
    Integer(i64),
    /// Exact or approximate numeric, kept as written.
    Decimal(String),
    String(String),
}
