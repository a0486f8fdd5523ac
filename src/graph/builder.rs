// src/graph/builder.rs

//! Recursive resolution from requested targets to a dependency graph.
//!
//! Resolution is depth-first: select a rule for the target, recurse on its
//! bound `depends` and `uses`, then construct the node. Nodes are memoized
//! by canonical name, so children are always inserted before their parents
//! and node creation order is a valid topological order.

use std::path::Path;

use tracing::debug;

use crate::canon::canon_path;
use crate::errors::{Error, Result};
use crate::graph::node::{Graph, Node, NodeId, NodeKind};
use crate::rules::{Registry, RuleKind};

pub struct GraphBuilder<'r> {
    registry: &'r Registry,
    graph: Graph,
}

impl<'r> GraphBuilder<'r> {
    pub fn new(registry: &'r Registry) -> Self {
        Self {
            registry,
            graph: Graph::default(),
        }
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    /// Resolve each requested target, reusing already-memoized nodes.
    ///
    /// The graph may be extended by later calls (deferred build requests run
    /// as fresh waves); it is never mutated while a wave is executing.
    pub fn resolve_all<S: AsRef<str>>(&mut self, targets: &[S]) -> Result<Vec<NodeId>> {
        targets
            .iter()
            .map(|t| self.resolve(t.as_ref()))
            .collect()
    }

    pub fn resolve(&mut self, target: &str) -> Result<NodeId> {
        let mut path = Vec::new();
        self.resolve_inner(target, &mut path)
    }

    fn resolve_inner(&mut self, target: &str, path: &mut Vec<String>) -> Result<NodeId> {
        let name = canon_path(target);

        if let Some(id) = self.graph.lookup(&name) {
            return Ok(id);
        }

        if let Some(pos) = path.iter().position(|p| p == &name) {
            let mut cycle: Vec<String> = path[pos..].to_vec();
            cycle.push(name);
            return Err(Error::CycleDetected(cycle));
        }

        let selection = self.registry.select(&name)?;
        let (rule, stem, dep_names, use_names, kind) = match selection {
            Some(sel) => {
                let kind = match self.registry.rule(sel.rule).kind() {
                    RuleKind::Task { .. } => NodeKind::Task,
                    RuleKind::File => {
                        if self.registry.matching_check(&name).is_some() {
                            NodeKind::Virtual
                        } else {
                            NodeKind::File
                        }
                    }
                };
                (Some(sel.rule), sel.stem, sel.depends, sel.uses, kind)
            }
            None => {
                if self.registry.matching_check(&name).is_some() {
                    (None, None, Vec::new(), Vec::new(), NodeKind::Virtual)
                } else if Path::new(&name).exists() {
                    (None, None, Vec::new(), Vec::new(), NodeKind::File)
                } else {
                    return Err(Error::NoRuleForTarget {
                        target: name,
                        required_by: path.last().cloned(),
                    });
                }
            }
        };

        path.push(name.clone());
        let children = self.resolve_children(&dep_names, &use_names, path);
        path.pop();
        let (depends, uses) = children?;

        debug!(target = %name, ?kind, rule = ?rule, "resolved node");
        let id = self.graph.insert(Node {
            id: NodeId(0),
            name,
            rule,
            stem,
            depends,
            uses,
            dependents: Vec::new(),
            bound_depends: dep_names,
            kind,
        });
        Ok(id)
    }

    fn resolve_children(
        &mut self,
        dep_names: &[String],
        use_names: &[String],
        path: &mut Vec<String>,
    ) -> Result<(Vec<NodeId>, Vec<NodeId>)> {
        let mut resolve_list = |builder: &mut Self, names: &[String]| -> Result<Vec<NodeId>> {
            let mut ids = Vec::with_capacity(names.len());
            for child in names {
                let id = builder.resolve_inner(child, path)?;
                if !ids.contains(&id) {
                    ids.push(id);
                }
            }
            Ok(ids)
        };
        let depends = resolve_list(self, dep_names)?;
        let uses = resolve_list(self, use_names)?;
        Ok((depends, uses))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::rules::{BoxFuture, Depends, Handler, Invocation};

    fn noop() -> Arc<dyn Handler> {
        Arc::new(|_inv: Invocation| -> BoxFuture<Result<()>> {
            Box::pin(async { Ok(()) })
        })
    }

    fn registry_abc() -> Registry {
        let mut reg = Registry::new();
        reg.add_task("a", false, Depends::from(["b", "c"]), &[], noop(), None)
            .unwrap();
        reg.add_task("b", false, Depends::from(["c"]), &[], noop(), None)
            .unwrap();
        reg.add_task("c", false, Depends::none(), &[], noop(), None)
            .unwrap();
        reg
    }

    #[test]
    fn shared_dependency_is_memoized() {
        let reg = registry_abc();
        let mut builder = GraphBuilder::new(&reg);
        let a = builder.resolve("a").unwrap();

        let graph = builder.graph();
        assert_eq!(graph.len(), 3);
        let node_a = graph.node(a);
        assert_eq!(node_a.depends.len(), 2);
        // "c" reached both directly and through "b" resolves to one node.
        let c = graph.lookup("c").unwrap();
        assert!(node_a.depends.contains(&c));
        assert!(graph.node(graph.lookup("b").unwrap()).depends.contains(&c));
    }

    #[test]
    fn names_memoize_by_canonical_form() {
        let mut reg = Registry::new();
        reg.add_task("t", false, Depends::from(["./x", "x"]), &[], noop(), None)
            .unwrap();
        reg.add_task("x", false, Depends::none(), &[], noop(), None)
            .unwrap();

        let mut builder = GraphBuilder::new(&reg);
        builder.resolve("t").unwrap();
        assert_eq!(builder.graph().len(), 2);
    }

    #[test]
    fn cycle_reports_the_full_path() {
        let mut reg = Registry::new();
        reg.add_task("a", false, Depends::from(["b"]), &[], noop(), None)
            .unwrap();
        reg.add_task("b", false, Depends::from(["c"]), &[], noop(), None)
            .unwrap();
        reg.add_task("c", false, Depends::from(["a"]), &[], noop(), None)
            .unwrap();

        let mut builder = GraphBuilder::new(&reg);
        let err = builder.resolve("a").unwrap_err();
        match err {
            Error::CycleDetected(cycle) => {
                assert_eq!(cycle, vec!["a", "b", "c", "a"]);
            }
            other => panic!("expected CycleDetected, got {other}"),
        }
    }

    #[test]
    fn cycle_through_uses_is_detected() {
        let mut reg = Registry::new();
        reg.add_task("a", false, Depends::none(), &["b"], noop(), None)
            .unwrap();
        reg.add_task("b", false, Depends::from(["a"]), &[], noop(), None)
            .unwrap();

        let mut builder = GraphBuilder::new(&reg);
        assert!(matches!(
            builder.resolve("a").unwrap_err(),
            Error::CycleDetected(_)
        ));
    }

    #[test]
    fn missing_target_without_rule_errors() {
        let mut reg = Registry::new();
        reg.add_task(
            "app",
            false,
            Depends::from(["definitely/not/here.c"]),
            &[],
            noop(),
            None,
        )
        .unwrap();

        let mut builder = GraphBuilder::new(&reg);
        match builder.resolve("app").unwrap_err() {
            Error::NoRuleForTarget {
                target,
                required_by,
            } => {
                assert_eq!(target, "definitely/not/here.c");
                assert_eq!(required_by.as_deref(), Some("app"));
            }
            other => panic!("expected NoRuleForTarget, got {other}"),
        }
    }

    #[test]
    fn check_matched_dependency_becomes_virtual_leaf() {
        let mut reg = Registry::new();
        reg.add_check(
            &["https://*"],
            Arc::new(|_r: &str| -> BoxFuture<Result<String>> {
                Box::pin(async { Ok("v1".to_string()) })
            }),
        )
        .unwrap();
        reg.add_task(
            "fetch",
            false,
            Depends::from(["https://x/y"]),
            &[],
            noop(),
            None,
        )
        .unwrap();

        let mut builder = GraphBuilder::new(&reg);
        builder.resolve("fetch").unwrap();
        let graph = builder.graph();
        let virt = graph.node(graph.lookup("https://x/y").unwrap());
        assert_eq!(virt.kind, NodeKind::Virtual);
        assert!(!virt.has_rule());
    }
}
