//! Expression rendering
//!
//! Operands are parenthesized only where operator precedence requires it.

use vtl_plan::{BinOp, Expr, Literal, UnOp};

use crate::udf::UdfResolver;
use crate::unparse::Column;
use crate::TranslateError;

pub(crate) const ATOM: u8 = 10;
const NEGATE: u8 = 7;
const COMPARE: u8 = 4;
const NOT: u8 = 3;
pub(crate) const AND: u8 = 2;

/// Columns an expression's input references resolve against.
pub(crate) struct Scope<'s> {
    pub columns: &'s [Column],
    /// Whether column references need their row-source qualifier.
    pub qualified: bool,
}

impl<'s> Scope<'s> {
    pub fn new(columns: &'s [Column], qualified: bool) -> Self {
        Self { columns, qualified }
    }

    pub fn column(&self, index: usize) -> Result<&'s Column, TranslateError> {
        self.columns.get(index).ok_or(TranslateError::DanglingColumn {
            index,
            available: self.columns.len(),
        })
    }
}

pub(crate) struct ExprRenderer<'r, 'a> {
    udfs: &'r mut UdfResolver<'a>,
    /// Row source of the innermost enclosing lateral view.
    correl: Option<&'r [Column]>,
}

impl<'r, 'a> ExprRenderer<'r, 'a> {
    pub fn new(udfs: &'r mut UdfResolver<'a>, correl: Option<&'r [Column]>) -> Self {
        Self { udfs, correl }
    }

    pub fn render(&mut self, expr: &Expr, scope: &Scope) -> Result<String, TranslateError> {
        self.render_prec(expr, scope).map(|(sql, _)| sql)
    }

    /// Rendered SQL together with the binding strength of its outermost operator.
    pub fn render_prec(&mut self, expr: &Expr, scope: &Scope) -> Result<(String, u8), TranslateError> {
        let rendered = match expr {
            Expr::InputRef { index } => {
                let column = scope.column(*index)?;
                (column.sql(scope.qualified), column.precedence())
            }
            Expr::Correl { index } => {
                let columns = self.correl.ok_or(TranslateError::UnboundCorrelation(*index))?;
                let column = Scope::new(columns, true).column(*index)?;
                (column.sql(true), ATOM)
            }
            Expr::Literal { value } => (render_literal(value), ATOM),
            Expr::Cast { expr, type_name } => {
                (format!("CAST({} AS {})", self.render(expr, scope)?, type_name), ATOM)
            }
            Expr::Binary { op, left, right } => {
                let prec = binary_precedence(*op);
                let (l, lp) = self.render_prec(left, scope)?;
                let (r, rp) = self.render_prec(right, scope)?;
                let l = parenthesize(l, lp < prec || (lp == prec && prec == COMPARE));
                let r = parenthesize(r, rp < prec || (rp == prec && !is_associative(*op)));
                (format!("{} {} {}", l, binary_symbol(*op), r), prec)
            }
            Expr::Unary { op, expr } => {
                let (inner, ip) = self.render_prec(expr, scope)?;
                match op {
                    UnOp::Not => (format!("NOT {}", parenthesize(inner, ip < NOT)), NOT),
                    UnOp::Neg => {
                        let needed = ip < NEGATE || inner.starts_with('-');
                        (format!("-{}", parenthesize(inner, needed)), NEGATE)
                    }
                    UnOp::IsNull => (format!("{} IS NULL", parenthesize(inner, ip <= COMPARE)), COMPARE),
                    UnOp::IsNotNull => (format!("{} IS NOT NULL", parenthesize(inner, ip <= COMPARE)), COMPARE),
                }
            }
            Expr::Function { name, args } => (format!("{}({})", name, self.render_list(args, scope)?), ATOM),
            Expr::Udf {
                name,
                qualified_name,
                args,
            } => {
                let callable = self.udfs.resolve(name, qualified_name)?;
                (format!("{}({})", callable, self.render_list(args, scope)?), ATOM)
            }
            Expr::Array { elements } => (format!("ARRAY ({})", self.render_list(elements, scope)?), ATOM),
            Expr::Map { entries } => {
                let mut parts = Vec::with_capacity(entries.len() * 2);
                for (key, value) in entries {
                    parts.push(self.render(key, scope)?);
                    parts.push(self.render(value, scope)?);
                }
                (format!("MAP ({})", parts.join(", ")), ATOM)
            }
            Expr::Struct { function, fields } => {
                let mut parts = Vec::with_capacity(fields.len() * 2);
                for (name, value) in fields {
                    parts.push(quote_string(name));
                    parts.push(self.render(value, scope)?);
                }
                (format!("{}({})", function, parts.join(", ")), ATOM)
            }
            Expr::Item { expr, index } => {
                let (base, bp) = self.render_prec(expr, scope)?;
                let index = self.render(index, scope)?;
                (format!("{}[{}]", parenthesize(base, bp < ATOM), index), ATOM)
            }
            Expr::FieldAccess { expr, field } => {
                let (base, bp) = self.render_prec(expr, scope)?;
                (format!("{}.{}", parenthesize(base, bp < ATOM), field), ATOM)
            }
            Expr::Case { whens, otherwise } => {
                let mut sql = String::from("CASE");
                for (when, then) in whens {
                    sql.push_str(&format!(" WHEN {} THEN {}", self.render(when, scope)?, self.render(then, scope)?));
                }
                if let Some(otherwise) = otherwise {
                    sql.push_str(&format!(" ELSE {}", self.render(otherwise, scope)?));
                }
                sql.push_str(" END");
                (sql, ATOM)
            }
        };
        Ok(rendered)
    }

    fn render_list(&mut self, exprs: &[Expr], scope: &Scope) -> Result<String, TranslateError> {
        let parts = exprs
            .iter()
            .map(|e| self.render(e, scope))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(parts.join(", "))
    }
}

pub(crate) fn render_literal(value: &Literal) -> String {
    match value {
        Literal::Null => "NULL".to_string(),
        Literal::Boolean(true) => "TRUE".to_string(),
        Literal::Boolean(false) => "FALSE".to_string(),
        Literal::Integer(i) => i.to_string(),
        Literal::Decimal(d) => d.clone(),
        Literal::String(s) => quote_string(s),
    }
}

fn quote_string(s: &str) -> String {
    let escaped = s.replace('\\', "\\\\").replace('\'', "\\'");
    format!("'{}'", escaped)
}

fn parenthesize(sql: String, needed: bool) -> String {
    if needed {
        format!("({})", sql)
    } else {
        sql
    }
}

fn binary_precedence(op: BinOp) -> u8 {
    match op {
        BinOp::Or => 1,
        BinOp::And => AND,
        BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge | BinOp::Like => COMPARE,
        BinOp::Add | BinOp::Sub => 5,
        BinOp::Mul | BinOp::Div | BinOp::Mod => 6,
    }
}

fn is_associative(op: BinOp) -> bool {
    matches!(op, BinOp::Add | BinOp::Mul | BinOp::And | BinOp::Or)
}

fn binary_symbol(op: BinOp) -> &'static str {
    match op {
        BinOp::Add => "+",
        BinOp::Sub => "-",
        BinOp::Mul => "*",
        BinOp::Div => "/",
        BinOp::Mod => "%",
        BinOp::Eq => "=",
        BinOp::Ne => "<>",
        BinOp::Lt => "<",
        BinOp::Le => "<=",
        BinOp::Gt => ">",
        BinOp::Ge => ">=",
        BinOp::And => "AND",
        BinOp::Or => "OR",
        BinOp::Like => "LIKE",
    }
}
