// src/graph/node.rs

use std::collections::HashMap;

/// Index of a node within its [`Graph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    pub fn index(&self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// A file artifact (rule-bound) or a source file leaf (no rule).
    File,
    /// A named phony action; always stale.
    Task,
    /// Matched by a check; staleness comes from the probe, not the
    /// filesystem.
    Virtual,
}

/// One resolved target.
#[derive(Debug)]
pub struct Node {
    pub id: NodeId,
    /// Canonical target name; the memoization key.
    pub name: String,
    /// Registration ordinal of the bound rule; `None` for leaves.
    pub rule: Option<usize>,
    /// The stem the rule's wildcard bound to.
    pub stem: Option<String>,
    pub depends: Vec<NodeId>,
    pub uses: Vec<NodeId>,
    /// Parents reached through either edge kind; used for failure
    /// propagation and readiness rechecks.
    pub dependents: Vec<NodeId>,
    /// Bound dependency names in declaration order; the handler's argument
    /// vector after the target itself.
    pub bound_depends: Vec<String>,
    pub kind: NodeKind,
}

impl Node {
    pub fn has_rule(&self) -> bool {
        self.rule.is_some()
    }

    /// Children across both edge kinds, `depends` first.
    pub fn children(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.depends.iter().chain(self.uses.iter()).copied()
    }
}

/// The resolved dependency graph. Owned by the builder; read-only while a
/// wave is being scheduled.
#[derive(Debug, Default)]
pub struct Graph {
    nodes: Vec<Node>,
    by_name: HashMap<String, NodeId>,
}

impl Graph {
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter()
    }

    pub fn lookup(&self, canonical_name: &str) -> Option<NodeId> {
        self.by_name.get(canonical_name).copied()
    }

    pub(crate) fn insert(&mut self, mut node: Node) -> NodeId {
        let id = NodeId(self.nodes.len());
        node.id = id;
        for child in node.children().collect::<Vec<_>>() {
            self.nodes[child.0].dependents.push(id);
        }
        self.by_name.insert(node.name.clone(), id);
        self.nodes.push(node);
        id
    }
}
