//! Lateral view rendering
//!
//! The upstream planner expresses `LATERAL VIEW EXPLODE(c)` as
//!
//! ```text
//! Correlate
//! ├── <row source>
//! └── Uncollect
//!     └── Project(<exploded expression over $cor>)
//!         └── Values(single dummy row)
//! ```
//!
//! and only that shape is accepted on the exploding side.

use tracing::debug;
use vtl_plan::{BinOp, CorrelateJoin, Expr, LateralProjection, NodeKind, PlanNode, UnOp};

use crate::alias::NodeId;
use crate::expr::{ExprRenderer, Scope};
use crate::unparse::{check_arity, quote_identifier, renamed, Column, ColumnExpr, Fragment, Unparser};
use crate::TranslateError;

struct LateralView {
    alias: String,
    column: String,
    sql: String,
}

impl<'a> Unparser<'a> {
    pub(crate) fn correlate(
        &mut self,
        id: NodeId,
        node: &PlanNode,
        join_type: CorrelateJoin,
    ) -> Result<Fragment, TranslateError> {
        let mut left = self.visit(&node.inputs[0])?;
        if !left.is_pure() {
            left = self.wrap(left);
        }

        let view = self.lateral_view(&node.inputs[1], join_type, &left.columns)?;
        // Bound for numbering only; the lateral view itself is named by the
        // Uncollect's alias.
        self.aliases.allocate(id);
        debug!(node = id.0, alias = %view.alias, column = %view.column, outer = join_type == CorrelateJoin::Left, "lateral view");

        let mut columns = left.columns;
        columns.push(Column {
            name: view.column.clone(),
            expr: ColumnExpr::Source {
                qualifier: view.alias,
                column: view.column,
            },
            lateral: true,
        });

        Ok(Fragment {
            sources: left.sources + 1,
            has_lateral: true,
            ..Fragment::from_source(id, format!("{} {}", left.from, view.sql), renamed(node, columns)?)
        })
    }

    fn lateral_view(
        &mut self,
        node: &PlanNode,
        join_type: CorrelateJoin,
        correl: &[Column],
    ) -> Result<LateralView, TranslateError> {
        let uncollect_id = self.next_id();
        let projection = match &node.kind {
            NodeKind::Uncollect { projection } => *projection,
            other => {
                return Err(TranslateError::UnsupportedShape(format!(
                    "{} on the exploding side of a lateral view",
                    other.name()
                )))
            }
        };
        check_arity(node)?;

        if projection == LateralProjection::Wildcard {
            return Err(TranslateError::LateralViewWildcard);
        }
        let column = match node.fields.as_slice() {
            [field] => field.name.clone(),
            [] => {
                return Err(TranslateError::FieldCount {
                    node: node.kind.name(),
                    declared: 0,
                    produced: 1,
                })
            }
            fields => {
                return Err(TranslateError::MultiColumnExplode {
                    columns: fields.iter().map(|f| f.name.clone()).collect(),
                })
            }
        };

        let project = &node.inputs[0];
        self.next_id();
        check_arity(project)?;
        let source = match &project.kind {
            NodeKind::Project { exprs } if exprs.len() == 1 && exprs[0].input_refs().is_empty() => &exprs[0],
            _ => {
                return Err(TranslateError::UnsupportedShape(
                    "explode source must be a single correlated expression".to_string(),
                ))
            }
        };

        let dummy = &project.inputs[0];
        match &dummy.kind {
            NodeKind::Values { rows } if rows.len() == 1 => {}
            _ => {
                return Err(TranslateError::UnsupportedShape(
                    "explode source must be evaluated over a single-row VALUES".to_string(),
                ))
            }
        }
        self.visit(dummy)?;

        let (source, outer) = match join_type {
            CorrelateJoin::Inner => (source.clone(), ""),
            CorrelateJoin::Left => (null_safe(source.clone()), "OUTER "),
        };
        let source = ExprRenderer::new(&mut self.udfs, Some(correl)).render(&source, &Scope::new(&[], false))?;

        let alias = self.aliases.allocate(uncollect_id);
        let sql = format!(
            "LATERAL VIEW {}EXPLODE({}) {} AS {}",
            outer,
            source,
            alias,
            quote_identifier(&column)
        );
        Ok(LateralView { alias, column, sql })
    }
}

/// `IF(c IS NOT NULL AND size(c) > 0, c, ARRAY (NULL))`, so that an OUTER
/// lateral view still yields one row for a null or empty collection.
fn null_safe(collection: Expr) -> Expr {
    let present = Expr::binary(
        BinOp::And,
        Expr::unary(UnOp::IsNotNull, collection.clone()),
        Expr::binary(
            BinOp::Gt,
            Expr::function("size", vec![collection.clone()]),
            Expr::int(0),
        ),
    );
    Expr::function(
        "IF",
        vec![
            present,
            collection,
            Expr::Array {
                elements: vec![Expr::null()],
            },
        ],
    )
}
