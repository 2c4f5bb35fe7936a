//! Base table collection

use std::collections::HashSet;
use vtl_plan::{NodeKind, PlanNode};

/// Every table the plan scans, as `schema.table`, each listed once in
/// depth-first order of first appearance.
pub fn collect_base_tables(plan: &PlanNode) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut tables = Vec::new();
    collect(plan, &mut seen, &mut tables);
    tables
}

fn collect(node: &PlanNode, seen: &mut HashSet<String>, tables: &mut Vec<String>) {
    if let NodeKind::TableScan { table } = &node.kind {
        let name = table.to_string();
        if seen.insert(name.clone()) {
            tables.push(name);
        }
    }
    for input in &node.inputs {
        collect(input, seen, tables);
    }
}
