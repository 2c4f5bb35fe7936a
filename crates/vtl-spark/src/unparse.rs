//! Plan to Spark SQL unparser
//!
//! Each visited node yields a [`Fragment`]: a SELECT statement under
//! construction. A parent adds its clause to the child's fragment when the
//! clause comes later in the ladder FROM < WHERE < GROUP BY < HAVING <
//! SELECT < ORDER BY < LIMIT, and wraps the child as a derived table
//! otherwise.

use std::collections::HashSet;
use tracing::debug;
use vtl_plan::{is_generated_name, AggCall, Expr, JoinType, NodeKind, NullOrder, PlanNode, SortKey, TableRef};
use vtl_registry::{FunctionRegistry, TransportMap};

use crate::alias::{AliasContext, NodeId};
use crate::expr::{render_literal, ExprRenderer, Scope, AND, ATOM};
use crate::udf::{UdfInfo, UdfResolver};
use crate::TranslateError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) enum Clause {
    From,
    Where,
    GroupBy,
    Having,
    Select,
    OrderBy,
    Fetch,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum ColumnExpr {
    /// Plain reference to a column of a row source in the FROM clause.
    Source { qualifier: String, column: String },
    /// Computed expression, already rendered against the fragment's FROM.
    Rendered { sql: String, precedence: u8 },
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Column {
    pub name: String,
    pub expr: ColumnExpr,
    /// Produced by a lateral view, directly or through any number of operators.
    pub lateral: bool,
}

impl Column {
    fn source(qualifier: &str, column: &str) -> Self {
        Self {
            name: column.to_string(),
            expr: ColumnExpr::Source {
                qualifier: qualifier.to_string(),
                column: column.to_string(),
            },
            lateral: false,
        }
    }

    pub fn sql(&self, qualified: bool) -> String {
        match &self.expr {
            ColumnExpr::Source { qualifier, column } if qualified => {
                format!("{}.{}", quote_identifier(qualifier), quote_identifier(column))
            }
            ColumnExpr::Source { column, .. } => quote_identifier(column),
            ColumnExpr::Rendered { sql, .. } => sql.clone(),
        }
    }

    pub fn precedence(&self) -> u8 {
        match &self.expr {
            ColumnExpr::Source { .. } => ATOM,
            ColumnExpr::Rendered { precedence, .. } => *precedence,
        }
    }

    /// Name the target engine gives this column when it is selected without
    /// an alias, if it has one.
    fn natural_name(&self) -> Option<&str> {
        match &self.expr {
            ColumnExpr::Source { column, .. } => Some(column),
            ColumnExpr::Rendered { sql, .. } => {
                if sql.split('.').all(is_simple_identifier) {
                    sql.rsplit('.').next()
                } else {
                    None
                }
            }
        }
    }

    fn qualifier(&self) -> Option<&str> {
        match &self.expr {
            ColumnExpr::Source { qualifier, .. } => Some(qualifier),
            ColumnExpr::Rendered { .. } => None,
        }
    }

    /// Spark reads a bare integer in GROUP BY or ORDER BY as a select-list
    /// position, so such a column cannot be used as a key in place.
    fn is_integer_literal(&self) -> bool {
        match &self.expr {
            ColumnExpr::Source { .. } => false,
            ColumnExpr::Rendered { sql, .. } => {
                let digits = sql.strip_prefix('-').unwrap_or(sql);
                !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
            }
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct Predicate {
    sql: String,
    precedence: u8,
}

/// SELECT statement under construction.
#[derive(Debug, Clone)]
pub(crate) struct Fragment {
    pub node: NodeId,
    pub from: String,
    /// Number of row sources (tables, derived tables, lateral views) in FROM.
    pub sources: usize,
    pub has_lateral: bool,
    /// The fragment's own alias already appears inside `from`.
    pub alias_in_from: bool,
    pub columns: Vec<Column>,
    pub projected: bool,
    pub aggregate: bool,
    pub filter: Vec<Predicate>,
    pub group_by: Option<Vec<String>>,
    pub having: Vec<Predicate>,
    pub order_by: Vec<String>,
    pub fetch: Option<u64>,
    /// Complete set-operation query; such fragments are always wrapped.
    pub set_query: Option<String>,
}

impl Fragment {
    pub fn from_source(node: NodeId, from: String, columns: Vec<Column>) -> Self {
        Self {
            node,
            from,
            sources: 1,
            has_lateral: false,
            alias_in_from: false,
            columns,
            projected: false,
            aggregate: false,
            filter: vec![],
            group_by: None,
            having: vec![],
            order_by: vec![],
            fetch: None,
            set_query: None,
        }
    }

    /// Last clause this fragment has filled in.
    pub fn level(&self) -> Clause {
        if self.set_query.is_some() || self.fetch.is_some() {
            Clause::Fetch
        } else if !self.order_by.is_empty() {
            Clause::OrderBy
        } else if self.projected || self.aggregate {
            Clause::Select
        } else if !self.having.is_empty() {
            Clause::Having
        } else if self.group_by.is_some() {
            Clause::GroupBy
        } else if !self.filter.is_empty() {
            Clause::Where
        } else {
            Clause::From
        }
    }

    /// Nothing beyond the FROM clause.
    pub fn is_pure(&self) -> bool {
        self.level() == Clause::From
    }

    fn has_integer_literal(&self, mut keys: impl Iterator<Item = usize>) -> bool {
        keys.any(|k| self.columns.get(k).is_some_and(Column::is_integer_literal))
    }

    pub fn qualified(&self) -> bool {
        self.sources > 1
    }

    pub fn scope(&self) -> Scope<'_> {
        Scope::new(&self.columns, self.qualified())
    }

    fn qualifiers(&self) -> HashSet<&str> {
        self.columns.iter().filter_map(Column::qualifier).collect()
    }
}

pub(crate) struct Unparser<'a> {
    pub(crate) aliases: AliasContext,
    pub(crate) udfs: UdfResolver<'a>,
    next_node: usize,
}

impl<'a> Unparser<'a> {
    pub fn new(functions: &'a FunctionRegistry, transports: &'a TransportMap) -> Self {
        Self {
            aliases: AliasContext::new(),
            udfs: UdfResolver::new(functions, transports),
            next_node: 0,
        }
    }

    /// Render the whole plan as one query.
    pub fn unparse(&mut self, plan: &PlanNode) -> Result<String, TranslateError> {
        let fragment = self.visit(plan)?;
        Ok(render_query(&fragment, true))
    }

    pub fn into_manifest(self) -> Vec<UdfInfo> {
        self.udfs.into_manifest()
    }

    pub(crate) fn next_id(&mut self) -> NodeId {
        let id = NodeId(self.next_node);
        self.next_node += 1;
        id
    }

    pub(crate) fn visit(&mut self, node: &PlanNode) -> Result<Fragment, TranslateError> {
        let id = self.next_id();
        check_arity(node)?;

        match &node.kind {
            NodeKind::TableScan { table } => self.table_scan(id, node, table),
            NodeKind::Project { exprs } => self.project(id, node, exprs),
            NodeKind::Filter { condition } => self.filter(id, node, condition),
            NodeKind::Join { join_type, condition } => self.join(id, node, *join_type, condition.as_ref()),
            NodeKind::Aggregate { group_keys, calls } => self.aggregate(id, node, group_keys, calls),
            NodeKind::Sort { keys, fetch } => self.sort(id, node, keys, *fetch),
            NodeKind::Correlate { join_type } => self.correlate(id, node, *join_type),
            NodeKind::Uncollect { .. } => Err(TranslateError::UnsupportedShape(
                "Uncollect outside of a lateral view".to_string(),
            )),
            NodeKind::Union { all } => self.union(id, node, *all),
            NodeKind::Values { rows } => self.values(id, node, rows),
        }
    }

    /// Turn `fragment` into a derived table that later clauses can build on.
    pub(crate) fn wrap(&mut self, fragment: Fragment) -> Fragment {
        let id = if fragment.alias_in_from {
            self.next_id()
        } else {
            fragment.node
        };
        let alias = self.aliases.allocate(id);
        debug!(node = fragment.node.0, %alias, level = ?fragment.level(), "wrapping derived table");

        let query = render_query(&fragment, false);
        let columns = fragment
            .columns
            .iter()
            .map(|c| Column {
                lateral: c.lateral,
                ..Column::source(&alias, &c.name)
            })
            .collect();

        Fragment {
            alias_in_from: true,
            ..Fragment::from_source(id, format!("({}) {}", query, alias), columns)
        }
    }

    fn table_scan(&mut self, id: NodeId, node: &PlanNode, table: &TableRef) -> Result<Fragment, TranslateError> {
        let columns = node
            .fields
            .iter()
            .map(|f| Column::source(&table.table, &f.name))
            .collect();
        Ok(Fragment::from_source(id, table.to_string(), columns))
    }

    fn project(&mut self, id: NodeId, node: &PlanNode, exprs: &[Expr]) -> Result<Fragment, TranslateError> {
        check_field_count(node, exprs.len())?;

        let mut fragment = self.visit(&node.inputs[0])?;
        let level = fragment.level();
        let merges = level <= Clause::Having || (fragment.aggregate && level == Clause::Select);
        if !merges {
            fragment = self.wrap(fragment);
        }

        let mut columns = Vec::with_capacity(exprs.len());
        for (expr, field) in exprs.iter().zip(&node.fields) {
            let column = match expr {
                Expr::InputRef { index } => {
                    let source = fragment.scope().column(*index)?;
                    Column {
                        name: field.name.clone(),
                        ..source.clone()
                    }
                }
                _ => {
                    let scope = fragment.scope();
                    let (sql, precedence) = ExprRenderer::new(&mut self.udfs, None).render_prec(expr, &scope)?;
                    let lateral = expr.input_refs().iter().any(|&i| scope.columns[i].lateral);
                    Column {
                        name: field.name.clone(),
                        expr: ColumnExpr::Rendered { sql, precedence },
                        lateral,
                    }
                }
            };
            columns.push(column);
        }

        fragment.node = id;
        fragment.columns = columns;
        fragment.projected = true;
        Ok(fragment)
    }

    fn filter(&mut self, id: NodeId, node: &PlanNode, condition: &Expr) -> Result<Fragment, TranslateError> {
        let mut fragment = self.visit(&node.inputs[0])?;
        let level = fragment.level();
        let having = fragment.aggregate && level == Clause::Select;
        if level > Clause::Where && !having {
            fragment = self.wrap(fragment);
        }

        let (sql, precedence) = ExprRenderer::new(&mut self.udfs, None).render_prec(condition, &fragment.scope())?;
        let predicate = Predicate { sql, precedence };
        if having {
            fragment.having.push(predicate);
        } else {
            fragment.filter.push(predicate);
        }

        fragment.node = id;
        fragment.columns = renamed(node, fragment.columns)?;
        Ok(fragment)
    }

    fn aggregate(
        &mut self,
        id: NodeId,
        node: &PlanNode,
        group_keys: &[usize],
        calls: &[AggCall],
    ) -> Result<Fragment, TranslateError> {
        check_field_count(node, group_keys.len() + calls.len())?;

        let mut fragment = self.visit(&node.inputs[0])?;
        let level = fragment.level();
        let merges = level <= Clause::Where || (level == Clause::Select && fragment.projected && !fragment.aggregate);
        if !merges || fragment.has_integer_literal(group_keys.iter().copied()) {
            fragment = self.wrap(fragment);
        }

        let mut keys = Vec::with_capacity(group_keys.len());
        let mut columns = Vec::with_capacity(node.fields.len());
        for (&key, field) in group_keys.iter().zip(&node.fields) {
            let column = fragment.scope().column(key)?.clone();
            if column.lateral {
                return Err(TranslateError::LateralColumnInGroupBy { column: column.name });
            }
            keys.push(column.sql(fragment.qualified()));
            columns.push(Column {
                name: field.name.clone(),
                ..column
            });
        }

        for (call, field) in calls.iter().zip(&node.fields[group_keys.len()..]) {
            let sql = self.render_agg_call(call, &fragment)?;
            let lateral = call.args.iter().any(|&a| fragment.columns[a].lateral);
            columns.push(Column {
                name: field.name.clone(),
                expr: ColumnExpr::Rendered { sql, precedence: ATOM },
                lateral,
            });
        }

        fragment.node = id;
        fragment.columns = columns;
        fragment.group_by = Some(keys);
        fragment.aggregate = true;
        fragment.projected = false;
        Ok(fragment)
    }

    fn render_agg_call(&mut self, call: &AggCall, fragment: &Fragment) -> Result<String, TranslateError> {
        let function = match &call.qualified_name {
            Some(qualified_name) => self.udfs.resolve(&call.function, qualified_name)?,
            None => call.function.clone(),
        };

        if call.args.is_empty() {
            return Ok(format!("{}(*)", function));
        }

        let scope = fragment.scope();
        let args = call
            .args
            .iter()
            .map(|&a| scope.column(a).map(|c| c.sql(scope.qualified)))
            .collect::<Result<Vec<_>, _>>()?;
        let distinct = if call.distinct { "DISTINCT " } else { "" };
        Ok(format!("{}({}{})", function, distinct, args.join(", ")))
    }

    fn sort(&mut self, id: NodeId, node: &PlanNode, keys: &[SortKey], fetch: Option<u64>) -> Result<Fragment, TranslateError> {
        let mut fragment = self.visit(&node.inputs[0])?;
        if fragment.level() > Clause::Select || fragment.has_integer_literal(keys.iter().map(|k| k.field)) {
            fragment = self.wrap(fragment);
        }

        let scope = fragment.scope();
        let mut order_by = Vec::with_capacity(keys.len());
        for key in keys {
            let mut item = scope.column(key.field)?.sql(scope.qualified);
            if key.descending {
                item.push_str(" DESC");
            }
            match key.nulls {
                Some(NullOrder::First) => item.push_str(" NULLS FIRST"),
                Some(NullOrder::Last) => item.push_str(" NULLS LAST"),
                None => {}
            }
            order_by.push(item);
        }

        fragment.node = id;
        fragment.order_by = order_by;
        fragment.fetch = fetch;
        fragment.columns = renamed(node, fragment.columns)?;
        Ok(fragment)
    }

    fn join(
        &mut self,
        id: NodeId,
        node: &PlanNode,
        join_type: JoinType,
        condition: Option<&Expr>,
    ) -> Result<Fragment, TranslateError> {
        let mut left = self.visit(&node.inputs[0])?;
        if !left.is_pure() || left.has_lateral {
            left = self.wrap(left);
        }
        let mut right = self.visit(&node.inputs[1])?;
        let clashes = !right.qualifiers().is_disjoint(&left.qualifiers());
        if !right.is_pure() || right.sources > 1 || clashes {
            right = self.wrap(right);
        }

        let scope_columns: Vec<Column> = left.columns.iter().chain(&right.columns).cloned().collect();
        let on = match condition {
            Some(condition) => {
                let sql = ExprRenderer::new(&mut self.udfs, None).render(condition, &Scope::new(&scope_columns, true))?;
                format!(" ON {}", sql)
            }
            None if join_type == JoinType::Cross => String::new(),
            None => " ON TRUE".to_string(),
        };

        let keyword = match join_type {
            JoinType::Inner => "INNER JOIN",
            JoinType::Left => "LEFT JOIN",
            JoinType::Right => "RIGHT JOIN",
            JoinType::Full => "FULL JOIN",
            JoinType::Cross => "CROSS JOIN",
            JoinType::Semi => "LEFT SEMI JOIN",
            JoinType::Anti => "LEFT ANTI JOIN",
        };

        let columns = if join_type.projects_right() {
            scope_columns
        } else {
            left.columns
        };

        Ok(Fragment {
            sources: left.sources + right.sources,
            ..Fragment::from_source(
                id,
                format!("{}\n{} {}{}", left.from, keyword, right.from, on),
                renamed(node, columns)?,
            )
        })
    }

    fn union(&mut self, id: NodeId, node: &PlanNode, all: bool) -> Result<Fragment, TranslateError> {
        let mut queries = Vec::with_capacity(node.inputs.len());
        let mut lateral = vec![false; node.fields.len()];
        for input in &node.inputs {
            let mut fragment = self.visit(input)?;
            if fragment.level() > Clause::Select {
                fragment = self.wrap(fragment);
            }
            if fragment.columns.len() != node.fields.len() {
                return Err(TranslateError::FieldCount {
                    node: node.kind.name(),
                    declared: node.fields.len(),
                    produced: fragment.columns.len(),
                });
            }
            for (flag, column) in lateral.iter_mut().zip(&fragment.columns) {
                *flag |= column.lateral;
            }
            queries.push(render_query(&fragment, false));
        }

        let separator = if all { "\nUNION ALL\n" } else { "\nUNION\n" };
        let columns = node
            .fields
            .iter()
            .zip(lateral)
            .map(|(f, lateral)| Column {
                name: f.name.clone(),
                expr: ColumnExpr::Rendered {
                    sql: quote_identifier(&f.name),
                    precedence: ATOM,
                },
                lateral,
            })
            .collect();

        Ok(Fragment {
            set_query: Some(queries.join(separator)),
            ..Fragment::from_source(id, String::new(), columns)
        })
    }

    fn values(
        &mut self,
        id: NodeId,
        node: &PlanNode,
        rows: &[Vec<vtl_plan::Literal>],
    ) -> Result<Fragment, TranslateError> {
        if rows.is_empty() {
            return Err(TranslateError::UnsupportedShape("VALUES without rows".to_string()));
        }
        let mut rendered = Vec::with_capacity(rows.len());
        for row in rows {
            check_field_count(node, row.len())?;
            let literals: Vec<_> = row.iter().map(render_literal).collect();
            rendered.push(format!("({})", literals.join(", ")));
        }

        let alias = self.aliases.allocate(id);
        let names: Vec<_> = node.fields.iter().map(|f| quote_identifier(&f.name)).collect();
        let columns = node.fields.iter().map(|f| Column::source(&alias, &f.name)).collect();
        let from = format!("VALUES {} {}({})", rendered.join(", "), alias, names.join(", "));

        Ok(Fragment {
            alias_in_from: true,
            ..Fragment::from_source(id, from, columns)
        })
    }
}

/// Render a fragment as a complete SELECT statement.
///
/// At the top level, generated output names are left for the target engine
/// to choose.
pub(crate) fn render_query(fragment: &Fragment, top_level: bool) -> String {
    if let Some(query) = &fragment.set_query {
        return query.clone();
    }

    let qualified = fragment.qualified();
    let natural = fragment
        .columns
        .iter()
        .all(|c| c.natural_name() == Some(c.name.as_str()));
    let select = if !fragment.projected && !fragment.aggregate && natural {
        "*".to_string()
    } else {
        let items: Vec<_> = fragment
            .columns
            .iter()
            .map(|c| {
                let sql = c.sql(qualified);
                if c.natural_name() == Some(c.name.as_str()) || (top_level && is_generated_name(&c.name)) {
                    sql
                } else {
                    format!("{} {}", sql, quote_identifier(&c.name))
                }
            })
            .collect();
        items.join(", ")
    };

    let mut sql = format!("SELECT {}\nFROM {}", select, fragment.from);
    if !fragment.filter.is_empty() {
        sql.push_str("\nWHERE ");
        sql.push_str(&conjunction(&fragment.filter));
    }
    if let Some(keys) = fragment.group_by.as_ref().filter(|k| !k.is_empty()) {
        sql.push_str("\nGROUP BY ");
        sql.push_str(&keys.join(", "));
    }
    if !fragment.having.is_empty() {
        sql.push_str("\nHAVING ");
        sql.push_str(&conjunction(&fragment.having));
    }
    if !fragment.order_by.is_empty() {
        sql.push_str("\nORDER BY ");
        sql.push_str(&fragment.order_by.join(", "));
    }
    if let Some(fetch) = fragment.fetch {
        sql.push_str(&format!("\nLIMIT {}", fetch));
    }
    sql
}

fn conjunction(predicates: &[Predicate]) -> String {
    if predicates.len() == 1 {
        return predicates[0].sql.clone();
    }
    predicates
        .iter()
        .map(|p| {
            if p.precedence < AND {
                format!("({})", p.sql)
            } else {
                p.sql.clone()
            }
        })
        .collect::<Vec<_>>()
        .join(" AND ")
}

pub(crate) fn check_arity(node: &PlanNode) -> Result<(), TranslateError> {
    let (min, max) = node.kind.input_arity();
    let found = node.inputs.len();
    if found >= min && max.map_or(true, |max| found <= max) {
        return Ok(());
    }

    let expected = match max {
        Some(max) if max == min => min.to_string(),
        Some(max) => format!("{} to {}", min, max),
        None => format!("at least {}", min),
    };
    Err(TranslateError::ChildArity {
        node: node.kind.name(),
        expected,
        found,
    })
}

pub(crate) fn check_field_count(node: &PlanNode, produced: usize) -> Result<(), TranslateError> {
    if node.fields.len() == produced {
        Ok(())
    } else {
        Err(TranslateError::FieldCount {
            node: node.kind.name(),
            declared: node.fields.len(),
            produced,
        })
    }
}

/// Give `columns` the node's declared output names.
pub(crate) fn renamed(node: &PlanNode, columns: Vec<Column>) -> Result<Vec<Column>, TranslateError> {
    check_field_count(node, columns.len())?;
    Ok(columns
        .into_iter()
        .zip(&node.fields)
        .map(|(column, field)| Column {
            name: field.name.clone(),
            ..column
        })
        .collect())
}

fn is_simple_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Backtick-quote names Spark would not parse as a bare identifier.
pub(crate) fn quote_identifier(name: &str) -> String {
    if is_simple_identifier(name) {
        name.to_string()
    } else {
        format!("`{}`", name.replace('`', "``"))
    }
}
