// src/sched/state.rs

//! Per-run execution state for every node in a wave.
//!
//! Node state is mutated only by the supervisory scheduler loop; handlers
//! never observe it. The table also enforces the one-concurrent-build-per-
//! target invariant through an in-flight set of canonical names.

use std::collections::{HashSet, VecDeque};

use tracing::debug;

use crate::graph::{Graph, Node, NodeId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecState {
    Pending,
    Ready,
    Running,
    Built,
    Skipped,
    Failed,
}

impl ExecState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ExecState::Built | ExecState::Skipped | ExecState::Failed)
    }
}

/// Nodes newly promoted by a [`StateTable::promote`] pass.
#[derive(Debug, Default)]
pub struct Promotions {
    /// Pending nodes whose children all terminated successfully.
    pub ready: Vec<NodeId>,
    /// Nodes failed because a child failed.
    pub failed: usize,
}

pub struct StateTable {
    /// Indexed by node id; `None` marks nodes outside this wave.
    states: Vec<Option<ExecState>>,
    /// Canonical names currently dispatched.
    in_flight: HashSet<String>,
    /// Nodes built during this run; drives rebuild propagation.
    built: HashSet<NodeId>,
}

impl StateTable {
    /// Mark every node reachable from `roots` as a pending participant.
    pub fn for_roots(graph: &Graph, roots: &[NodeId]) -> Self {
        let mut states = vec![None; graph.len()];
        let mut stack: Vec<NodeId> = roots.to_vec();
        while let Some(id) = stack.pop() {
            if states[id.index()].is_some() {
                continue;
            }
            states[id.index()] = Some(ExecState::Pending);
            stack.extend(graph.node(id).children());
        }
        Self {
            states,
            in_flight: HashSet::new(),
            built: HashSet::new(),
        }
    }

    pub fn state(&self, id: NodeId) -> Option<ExecState> {
        self.states.get(id.index()).copied().flatten()
    }

    pub fn built(&self) -> &HashSet<NodeId> {
        &self.built
    }

    pub fn all_terminal(&self) -> bool {
        self.states
            .iter()
            .flatten()
            .all(|state| state.is_terminal())
    }

    /// Promote pending participants whose children are all terminal:
    /// to `Ready` when no child failed, to `Failed` otherwise.
    ///
    /// Ready nodes come back in node-id order, which the builder guarantees
    /// is topological.
    pub fn promote(&mut self, graph: &Graph) -> Promotions {
        let mut promotions = Promotions::default();
        for index in 0..self.states.len() {
            if self.states[index] != Some(ExecState::Pending) {
                continue;
            }
            let id = NodeId(index);
            let node = graph.node(id);
            let mut all_terminal = true;
            let mut any_failed = false;
            for child in node.children() {
                match self.state(child) {
                    Some(state) if state.is_terminal() => {
                        any_failed |= state == ExecState::Failed;
                    }
                    _ => {
                        all_terminal = false;
                        break;
                    }
                }
            }
            if !all_terminal {
                continue;
            }
            if any_failed {
                promotions.failed += self.fail(graph, id);
            } else {
                self.states[index] = Some(ExecState::Ready);
                promotions.ready.push(id);
            }
        }
        promotions
    }

    /// Transition a ready node to running, refusing when its canonical name
    /// is already in flight.
    pub fn start_running(&mut self, node: &Node) -> bool {
        if !self.in_flight.insert(node.name.clone()) {
            debug!(target = %node.name, "target already in flight; holding back");
            return false;
        }
        self.states[node.id.index()] = Some(ExecState::Running);
        true
    }

    /// Returns false when the node is no longer `Running` (a worker aborted
    /// after cancellation may still report in).
    pub fn finish_built(&mut self, node: &Node) -> bool {
        if self.state(node.id) != Some(ExecState::Running) {
            return false;
        }
        self.in_flight.remove(&node.name);
        self.states[node.id.index()] = Some(ExecState::Built);
        self.built.insert(node.id);
        true
    }

    pub fn skip(&mut self, id: NodeId) {
        self.states[id.index()] = Some(ExecState::Skipped);
    }

    /// Fail a node and transitively fail its non-terminal ancestors through
    /// both `depends` and `uses` edges. Returns how many nodes were failed.
    pub fn fail(&mut self, graph: &Graph, id: NodeId) -> usize {
        let mut failed = 0;
        let mut queue: VecDeque<NodeId> = VecDeque::new();
        queue.push_back(id);
        while let Some(current) = queue.pop_front() {
            match self.state(current) {
                Some(state) if !state.is_terminal() => {
                    self.in_flight.remove(&graph.node(current).name);
                    self.states[current.index()] = Some(ExecState::Failed);
                    failed += 1;
                    queue.extend(graph.node(current).dependents.iter().copied());
                }
                _ => {}
            }
        }
        failed
    }
}
