//! Derived-table alias allocation
//!
//! One counter per translation. Every allocation consumes a number whether or
//! not the alias ends up in the emitted SQL, so rendered aliases can skip
//! numbers (`t1`, then `t4`).

use std::collections::HashMap;

/// Position of a node in the walk's visiting order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub usize);

#[derive(Debug, Default)]
pub struct AliasContext {
    next: usize,
    bound: HashMap<NodeId, String>,
}

impl AliasContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Alias bound to `node`, allocating the next `t<N>` on first request.
    pub fn allocate(&mut self, node: NodeId) -> String {
        if let Some(alias) = self.bound.get(&node) {
            return alias.clone();
        }

        let alias = format!("t{}", self.next);
        self.next += 1;
        tracing::trace!(node = node.0, %alias, "allocated alias");
        self.bound.insert(node, alias.clone());
        alias
    }

    pub fn alias_of(&self, node: NodeId) -> Option<&str> {
        self.bound.get(&node).map(String::as_str)
    }

    /// Number of aliases handed out so far.
    pub fn allocated(&self) -> usize {
        self.next
    }
}
